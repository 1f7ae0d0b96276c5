//! Configuration error types

use thiserror::Error;

/// Errors raised while resolving the agent configuration.
///
/// All of these are fatal: the agent refuses to start rather than guess.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `DOMAIN` is unset or empty
    #[error("DOMAIN environment variable is not set")]
    MissingDomain,

    /// A domain name contains characters that can never form a hostname
    #[error("invalid domain name '{0}'")]
    InvalidDomain(String),

    /// An environment variable could not be deserialized
    #[error("failed to read environment: {0}")]
    Environment(#[from] envy::Error),

    /// The ACME directory URL is not a usable URL
    #[error("invalid ACME directory URL '{url}': {reason}")]
    InvalidDirectoryUrl { url: String, reason: String },

    /// Field-level validation failed
    #[error("configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}
