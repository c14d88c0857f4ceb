//! Error types for configuration loading.

use thiserror::Error;

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Primary error type for configuration loading.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required environment variable was not set.
    #[error("missing required environment variable")]
    MissingEnv {
        /// Variable name.
        name: &'static str,
    },
    /// A variable contained an invalid value.
    #[error("invalid configuration field")]
    InvalidField {
        /// Variable name.
        field: &'static str,
        /// Offending value (redacted for secrets).
        value: String,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, value: &str, reason: &'static str) -> Self {
        Self::InvalidField {
            field,
            value: value.to_string(),
            reason,
        }
    }
}
