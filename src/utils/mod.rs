pub mod normalize;

/// Redact a secret for log output, keeping only the last four characters.
pub fn redact_token(token: &str) -> String {
    if token.len() <= 4 {
        "****".to_string()
    } else {
        format!("****{}", &token[token.len() - 4..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_all_but_last_four() {
        assert_eq!(redact_token("abcdef123456"), "****3456");
    }

    #[test]
    fn short_tokens_fully_masked() {
        assert_eq!(redact_token("abc"), "****");
        assert_eq!(redact_token(""), "****");
    }
}
