//! # Design
//!
//! - Every variant is a fatal startup failure; per-delivery errors never reach this type.
//! - Constant messages with the failing operation as a field; sources are preserved.

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration could not be loaded or validated.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: dwh_config::ConfigError,
    },
    /// Telemetry could not be initialised.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: dwh_telemetry::TelemetryError,
    },
    /// The warehouse database could not be reached.
    #[error("database operation failed")]
    Data {
        /// Operation identifier.
        operation: &'static str,
        /// Source data error.
        source: dwh_data::DataError,
    },
    /// The storage backend could not be constructed.
    #[error("storage operation failed")]
    Storage {
        /// Operation identifier.
        operation: &'static str,
        /// Source storage error.
        source: dwh_storage::StorageError,
    },
}

impl AppError {
    pub(crate) const fn config(operation: &'static str, source: dwh_config::ConfigError) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: dwh_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn data(operation: &'static str, source: dwh_data::DataError) -> Self {
        Self::Data { operation, source }
    }

    pub(crate) const fn storage(operation: &'static str, source: dwh_storage::StorageError) -> Self {
        Self::Storage { operation, source }
    }
}
