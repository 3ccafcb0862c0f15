//! # Design
//!
//! - Constant messages; the delivery, stage and operation travel as fields.
//! - Sources are preserved so the audit log shows the full chain.

use std::error::Error as StdError;

use dwh_data::DataError;
use dwh_storage::StorageError;
use thiserror::Error;

/// Result type for audit sink operations.
pub type AuditResult<T> = Result<T, AuditError>;

/// Result type for pipeline stages.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors raised by the audit sink.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The sink was used before being bound to a delivery.
    #[error("audit sink not bound")]
    NotBound {
        /// Operation attempted on the unbound sink.
        operation: &'static str,
    },
    /// The sink is still bound to another delivery.
    #[error("audit sink already bound")]
    AlreadyBound {
        /// Delivery the sink is bound to.
        current: String,
        /// Delivery that asked for the sink.
        requested: String,
    },
    /// The buffered log could not be written to the outbox.
    #[error("audit log could not be persisted")]
    Persist {
        /// Delivery the log belongs to.
        name: String,
        /// Underlying storage failure.
        source: StorageError,
    },
}

/// Errors that stop a delivery's stage sequence.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No agreement owns the delivery.
    #[error("no agreement matched the delivery")]
    AgreementNotFound {
        /// Delivery name used for the lookup.
        file: String,
    },
    /// A remote operation failed.
    #[error("remote operation failed")]
    Remote {
        /// Stage that issued the call.
        stage: &'static str,
        /// Underlying data error.
        source: DataError,
    },
    /// A storage operation failed.
    #[error("storage operation failed")]
    Storage {
        /// Stage that issued the call.
        stage: &'static str,
        /// Underlying storage error.
        source: StorageError,
    },
    /// A script delivery is not valid UTF-8.
    #[error("script is not valid utf-8")]
    ScriptEncoding {
        /// Delivery name.
        file: String,
        /// Underlying decode error.
        source: std::string::FromUtf8Error,
    },
}

/// Render an error and its sources as `outer: inner: root`.
#[must_use]
pub fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
