//! Paper identifier normalization
//!
//! Identifiers reach us in several shapes (`corpus:123`, `paper-abc`,
//! `root-abc`, bare ids). Everything that compares or stores identifiers
//! goes through [`PaperId`], which can only be built by normalizing.

use crate::errors::{AppError, Result};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Prefixes stripped from identifiers before comparison
pub const ID_PREFIXES: &[&str] = &["corpus:", "paper-", "root-"];

fn prefix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:corpus:|paper-|root-)+").expect("static identifier prefix pattern")
    })
}

/// Identifier exactly as received from an external payload
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawPaperId(pub String);

impl RawPaperId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Normalize into a comparable identifier
    pub fn normalize(&self) -> Result<PaperId> {
        PaperId::normalize(&self.0)
    }
}

impl From<&str> for RawPaperId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Normalized paper identifier, safe to use as a store or lookup key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PaperId(String);

impl PaperId {
    /// Trim and strip every known prefix (repeatedly, so `root-paper-1` becomes `1`)
    pub fn normalize(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let stripped = prefix_pattern().replace(trimmed, "");
        let stripped = stripped.trim();

        if stripped.is_empty() {
            return Err(AppError::Validation {
                message: format!("Paper identifier '{}' is empty after normalization", raw),
                field: Some("paperId".to_string()),
            });
        }

        Ok(Self(stripped.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PaperId {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        PaperId::normalize(&value)
    }
}

impl From<PaperId> for String {
    fn from(id: PaperId) -> Self {
        id.0
    }
}

impl fmt::Display for PaperId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PaperId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_known_prefixes() {
        assert_eq!(PaperId::normalize("corpus:12345").unwrap().as_str(), "12345");
        assert_eq!(PaperId::normalize("paper-abc").unwrap().as_str(), "abc");
        assert_eq!(PaperId::normalize("root-abc").unwrap().as_str(), "abc");
        assert_eq!(PaperId::normalize("  abc ").unwrap().as_str(), "abc");
    }

    #[test]
    fn test_stacked_prefixes() {
        assert_eq!(PaperId::normalize("root-paper-42").unwrap().as_str(), "42");
        assert_eq!(
            PaperId::normalize("root-abc").unwrap(),
            PaperId::normalize("corpus:abc").unwrap()
        );
    }

    #[test]
    fn test_prefix_only_in_middle_is_kept() {
        assert_eq!(PaperId::normalize("abc-paper-1").unwrap().as_str(), "abc-paper-1");
    }

    #[test]
    fn test_empty_rejected() {
        assert!(PaperId::normalize("").is_err());
        assert!(PaperId::normalize("corpus:").is_err());
    }

    #[test]
    fn test_deserialize_normalizes() {
        let id: PaperId = serde_json::from_str("\"paper-77\"").unwrap();
        assert_eq!(id.as_str(), "77");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"77\"");
    }
}
