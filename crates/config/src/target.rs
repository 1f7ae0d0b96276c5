//! The set of names a certificate must cover

use std::fmt;

use crate::error::ConfigError;

/// Primary domain plus alternate names a certificate must be valid for.
///
/// Alternate names keep their insertion order and are not deduplicated;
/// what the operator configured is exactly what gets requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenewalTarget {
    primary: String,
    alternates: Vec<String>,
}

impl RenewalTarget {
    /// Build a target, rejecting an empty primary domain.
    pub fn new(
        primary: impl Into<String>,
        alternates: impl IntoIterator<Item = String>,
    ) -> Result<Self, ConfigError> {
        let primary = primary.into().trim().to_string();
        if primary.is_empty() {
            return Err(ConfigError::MissingDomain);
        }

        let alternates: Vec<String> = alternates.into_iter().collect();
        for name in std::iter::once(&primary).chain(alternates.iter()) {
            check_name(name)?;
        }

        Ok(Self {
            primary,
            alternates,
        })
    }

    /// Split a comma-separated `SAN` value.
    ///
    /// Entries are trimmed and empty entries dropped; order and duplicates
    /// are preserved.
    pub fn parse_alternates(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn primary(&self) -> &str {
        &self.primary
    }

    pub fn alternates(&self) -> &[String] {
        &self.alternates
    }

    /// All required names, primary first.
    pub fn domains(&self) -> Vec<String> {
        std::iter::once(self.primary.clone())
            .chain(self.alternates.iter().cloned())
            .collect()
    }
}

impl fmt::Display for RenewalTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.primary)?;
        if !self.alternates.is_empty() {
            write!(f, " (+{})", self.alternates.join(","))?;
        }
        Ok(())
    }
}

fn check_name(name: &str) -> Result<(), ConfigError> {
    let bad = name.is_empty()
        || name
            .chars()
            .any(|c| c.is_whitespace() || c == ',' || c == '/' || c.is_control());
    if bad {
        return Err(ConfigError::InvalidDomain(name.to_string()));
    }
    Ok(())
}
