//! Error types for configuration loading.
//!
//! # Design
//! - Constant messages; the offending field, reason and value travel as context.
//! - Values that may carry credentials are redacted before they are stored.

use thiserror::Error;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable was not provided.
    #[error("missing environment configuration")]
    MissingEnv {
        /// Name of the missing environment variable.
        name: &'static str,
    },
    /// An environment variable held a value that failed validation.
    #[error("invalid configuration field")]
    InvalidField {
        /// Environment variable that failed validation.
        field: &'static str,
        /// Machine-readable reason for the failure.
        reason: &'static str,
        /// Offending value when it is safe to record.
        value: Option<String>,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: &'static str, value: &str) -> Self {
        Self::InvalidField {
            field,
            reason,
            value: Some(value.to_string()),
        }
    }
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_messages_are_constant() {
        let missing = ConfigError::MissingEnv {
            name: "DATABASE_URL",
        };
        assert_eq!(missing.to_string(), "missing environment configuration");

        let invalid = ConfigError::invalid("DWH_WORKERS", "zero", "0");
        assert_eq!(invalid.to_string(), "invalid configuration field");
        assert!(matches!(
            invalid,
            ConfigError::InvalidField {
                field: "DWH_WORKERS",
                reason: "zero",
                value: Some(ref value),
            } if value == "0"
        ));
    }
}
