//! Error types for the data access layer.

use thiserror::Error;

/// Result alias for data layer operations.
pub type DataResult<T> = Result<T, DataError>;

/// Errors raised by the remote operation client.
#[derive(Debug, Error)]
pub enum DataError {
    /// The connection pool could not be established.
    #[error("database connection failed")]
    Connect {
        /// Underlying SQL error.
        source: sqlx::Error,
    },
    /// A database operation failed.
    #[error("database operation failed")]
    QueryFailed {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying SQL error.
        source: sqlx::Error,
    },
    /// A returned row could not be interpreted as a record.
    #[error("unexpected row shape")]
    UnexpectedRow {
        /// Operation identifier.
        operation: &'static str,
    },
    /// A procedure returned a record missing a required column.
    #[error("procedure result missing column")]
    MissingColumn {
        /// Procedure name.
        procedure: &'static str,
        /// Column that was expected.
        column: &'static str,
    },
    /// An argument could not be represented as a database value.
    #[error("argument out of range")]
    ArgumentOutOfRange {
        /// Argument name.
        field: &'static str,
    },
}

impl DataError {
    /// Whether the failure is a dropped connection worth retrying locally.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::QueryFailed { source, .. } => is_connection_reset(source),
            _ => false,
        }
    }
}

fn is_connection_reset(source: &sqlx::Error) -> bool {
    if let sqlx::Error::Io(io) = source
        && io.kind() == std::io::ErrorKind::ConnectionReset
    {
        return true;
    }
    source.to_string().ends_with("connection reset by peer")
}

pub(crate) fn map_query_err(operation: &'static str) -> impl Fn(sqlx::Error) -> DataError {
    move |source| DataError::QueryFailed { operation, source }
}
