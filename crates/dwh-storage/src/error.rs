//! # Design
//!
//! - Structured, constant-message errors for storage providers.
//! - Context travels as fields (operation, path, redacted URL) rather than in the message.
//! - URLs are recorded without their query string so SAS signatures never reach logs.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors produced by storage providers.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem failures in the local backend.
    #[error("storage io failure")]
    Io {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Transport failures talking to the cloud store.
    #[error("storage request failed")]
    Http {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Target URL without its query string.
        url: String,
        /// Underlying HTTP client error.
        source: reqwest::Error,
    },
    /// The cloud store answered with a non-success status.
    #[error("storage request rejected")]
    Status {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Target URL without its query string.
        url: String,
        /// HTTP status code returned.
        status: u16,
    },
    /// A listing response could not be parsed.
    #[error("storage listing malformed")]
    Listing {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Underlying XML error.
        source: quick_xml::DeError,
    },
    /// A response header required by the protocol was missing or unreadable.
    #[error("storage response header missing")]
    MissingHeader {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Header name.
        header: &'static str,
    },
    /// A configured URL cannot address child resources.
    #[error("storage url invalid")]
    InvalidUrl {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// URL without its query string.
        url: String,
    },
    /// An asynchronous copy ended in a failed or aborted state.
    #[error("storage copy failed")]
    CopyFailed {
        /// Operation that started the copy.
        operation: &'static str,
        /// File being copied.
        name: String,
        /// Status reported by the store.
        reason: String,
    },
    /// An asynchronous copy did not finish within the configured bound.
    #[error("storage copy timed out")]
    CopyTimedOut {
        /// Operation that started the copy.
        operation: &'static str,
        /// File being copied.
        name: String,
        /// Time spent waiting.
        waited: Duration,
    },
    /// Building the HTTP client failed.
    #[error("storage client construction failed")]
    Client {
        /// Underlying HTTP client error.
        source: reqwest::Error,
    },
}

impl StorageError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn storage_error_messages_are_constant() {
        let io_err = StorageError::io("list_inbox", "/data/in", io::Error::other("boom"));
        assert_eq!(io_err.to_string(), "storage io failure");
        assert!(io_err.source().is_some());

        let status = StorageError::Status {
            operation: "read_file",
            url: "https://acct.file.core.windows.net/share/in/a.csv".to_string(),
            status: 404,
        };
        assert_eq!(status.to_string(), "storage request rejected");
        assert!(status.source().is_none());

        let timed_out = StorageError::CopyTimedOut {
            operation: "stage_for_load",
            name: "a.csv".to_string(),
            waited: Duration::from_secs(600),
        };
        assert_eq!(timed_out.to_string(), "storage copy timed out");
    }
}
