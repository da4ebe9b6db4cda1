//! State names
//!
//! A state name is the key a client uses to address its state document. Names
//! are restricted to lowercase ASCII letters, digits, `-` and `_`, between 4 and
//! 100 characters long. Every store operation takes a [`StateName`], so a name
//! that fails these rules never reaches the storage layer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Minimum length of a state name
pub const MIN_NAME_LEN: usize = 4;

/// Maximum length of a state name
pub const MAX_NAME_LEN: usize = 100;

/// Reasons a state name can be rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("state name must be between 4 and 100 characters, got {0}")]
    Length(usize),

    #[error(
        "state name may only contain lowercase letters, digits, '-' and '_', found {found:?} at position {position}"
    )]
    InvalidCharacter { found: char, position: usize },
}

/// A validated state name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct StateName(String);

impl StateName {
    /// Validate and wrap a state name
    pub fn parse(name: impl Into<String>) -> Result<Self, NameError> {
        let name = name.into();

        // All accepted characters are ASCII, so the char count equals the byte
        // length for any name that passes the character check below.
        let len = name.chars().count();
        if !(MIN_NAME_LEN..=MAX_NAME_LEN).contains(&len) {
            return Err(NameError::Length(len));
        }

        if let Some((position, found)) = name
            .chars()
            .enumerate()
            .find(|(_, c)| !is_name_char(*c))
        {
            return Err(NameError::InvalidCharacter { found, position });
        }

        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_'
}

impl fmt::Display for StateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StateName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for StateName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for StateName {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl<'de> Deserialize<'de> for StateName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_valid_names() {
        for name in ["prod", "network-prod_01", "a1b2", "terraform-state_0"] {
            let parsed = StateName::parse(name).unwrap();
            assert_eq!(parsed.as_str(), name);
        }

        let longest = "x".repeat(MAX_NAME_LEN);
        assert!(StateName::parse(longest).is_ok());
    }

    #[test]
    fn test_rejects_length() {
        assert_eq!(StateName::parse("abc"), Err(NameError::Length(3)));
        assert_eq!(StateName::parse(""), Err(NameError::Length(0)));
        assert_eq!(
            StateName::parse("x".repeat(101)),
            Err(NameError::Length(101))
        );
    }

    #[test]
    fn test_rejects_invalid_characters() {
        assert_eq!(
            StateName::parse("Prod"),
            Err(NameError::InvalidCharacter {
                found: 'P',
                position: 0
            })
        );
        assert_eq!(
            StateName::parse("my.state"),
            Err(NameError::InvalidCharacter {
                found: '.',
                position: 2
            })
        );
        assert!(StateName::parse("../etc/passwd").is_err());
        assert!(StateName::parse("stäte").is_err());
    }

    #[test]
    fn test_error_display() {
        let error = StateName::parse("abc").unwrap_err();
        assert_eq!(
            error.to_string(),
            "state name must be between 4 and 100 characters, got 3"
        );
    }

    #[test]
    fn test_from_str_and_display() {
        let name: StateName = "infra-prod".parse().unwrap();
        assert_eq!(name.to_string(), "infra-prod");
    }

    #[test]
    fn test_serde_validates() {
        let name: StateName = serde_json::from_str("\"infra-prod\"").unwrap();
        assert_eq!(serde_json::to_string(&name).unwrap(), "\"infra-prod\"");

        let result: Result<StateName, _> = serde_json::from_str("\"UPPER\"");
        assert!(result.is_err());
    }
}
