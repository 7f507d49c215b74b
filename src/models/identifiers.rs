use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical IMDb identifier, normalized to lowercase `tt` followed by digits.
///
/// Invalid candidates are rejected at construction so that everything past the
/// domain boundary can assume well-formed ids.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ImdbId(String);

impl ImdbId {
    /// Parse and normalize a candidate id. Accepts any case, requires the
    /// `tt<digits>` shape.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.len() < 3 {
            return None;
        }
        let lower = trimmed.to_ascii_lowercase();
        let rest = lower.strip_prefix("tt")?;
        if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(Self(lower))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ImdbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ImdbId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for ImdbId {
    type Err = InvalidImdbId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| InvalidImdbId(s.to_string()))
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("not a valid IMDb id: {0:?}")]
pub struct InvalidImdbId(pub String);

/// Partition a batch of raw candidates into normalized ids and rejects.
pub fn normalize_imdb_ids<'a, I>(raw: I) -> (Vec<ImdbId>, usize)
where
    I: IntoIterator<Item = &'a str>,
{
    let mut valid = Vec::new();
    let mut invalid = 0usize;
    for candidate in raw {
        match ImdbId::parse(candidate) {
            Some(id) => valid.push(id),
            None => invalid += 1,
        }
    }
    (valid, invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_lowercases() {
        let id = ImdbId::parse("TT0111161").unwrap();
        assert_eq!(id.as_str(), "tt0111161");
    }

    #[test]
    fn trims_whitespace() {
        assert_eq!(ImdbId::parse("  tt42  ").unwrap().as_str(), "tt42");
    }

    #[test]
    fn rejects_malformed() {
        assert!(ImdbId::parse("").is_none());
        assert!(ImdbId::parse("tt").is_none());
        assert!(ImdbId::parse("nm0000001").is_none());
        assert!(ImdbId::parse("tt12a4").is_none());
        assert!(ImdbId::parse("0111161").is_none());
    }

    #[test]
    fn batch_normalization_counts_rejects() {
        let (valid, invalid) = normalize_imdb_ids(["tt1", "bogus", "TT2", ""]);
        assert_eq!(valid.len(), 2);
        assert_eq!(invalid, 2);
    }
}
