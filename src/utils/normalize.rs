//! Deterministic text folding shared by search, import matching, and the
//! reconciler.
//!
//! The pipeline is: Unicode NFKD, strip combining marks, case-fold,
//! punctuation to space, collapse whitespace runs. Two strings that fold to
//! the same output are considered equal everywhere the engine compares text.

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Fold a string to its canonical comparison form.
pub fn fold(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_space = true;
    for ch in input.nfkd() {
        if is_combining_mark(ch) {
            continue;
        }
        if ch.is_alphanumeric() {
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
            last_was_space = false;
        } else if !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Split folded text into keywords. Empty input folds to an empty set.
pub fn keywords(input: &str) -> Vec<String> {
    fold(input)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Case-insensitive substring test over folded forms.
pub fn folded_contains(haystack: &str, folded_needle: &str) -> bool {
    fold(haystack).contains(folded_needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_diacritics() {
        assert_eq!(fold("Amélie"), "amelie");
        assert_eq!(fold("Ça plane pour moi"), "ca plane pour moi");
    }

    #[test]
    fn punctuation_becomes_space() {
        assert_eq!(fold("Mission: Impossible - Fallout"), "mission impossible fallout");
    }

    #[test]
    fn collapses_whitespace_runs() {
        assert_eq!(fold("  The   Dark \t Knight "), "the dark knight");
    }

    #[test]
    fn nfkd_compatibility_forms() {
        // Ligature and fullwidth forms decompose under NFKD.
        assert_eq!(fold("ﬁlm"), "film");
        assert_eq!(fold("ＨＥＬＬＯ"), "hello");
    }

    #[test]
    fn keyword_splitting() {
        assert_eq!(keywords("Dark, Knight!"), vec!["dark", "knight"]);
        assert!(keywords("  ...  ").is_empty());
        assert!(keywords("").is_empty());
    }

    #[test]
    fn substring_after_fold() {
        assert!(folded_contains("The Dark Knight", "dark"));
        assert!(folded_contains("Léon: The Professional", "leon"));
        assert!(!folded_contains("Heat", "dark"));
    }
}
