//! Typed configuration consumed by the daemon bootstrap.
//!
//! # Design
//! - Backend selection is a tagged enum so the two storage shapes cannot be mixed.
//! - Credentials are wrapped so `Debug` output never prints them.

use std::fmt::{self, Debug, Formatter};
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

/// Fully validated daemon configuration.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Storage backend and its inbox/outbox locations.
    pub backend: StorageBackend,
    /// Connection string for the remote data engine.
    pub database_url: ConnectionString,
    /// Sleep between poll cycles.
    pub poll_interval: Duration,
    /// Bounds applied to asynchronous tier-to-tier copies.
    pub copy: CopyPolicy,
    /// Per-request timeout for storage calls and pool acquisition.
    pub request_timeout: Duration,
    /// Number of concurrent file workers.
    pub workers: usize,
    /// Owner identity passed to the load procedure.
    pub load_owner: String,
    /// Console logging preferences.
    pub logging: LogSettings,
}

/// Where deliveries are read from and finalised to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// Plain filesystem directories; the load tier is the inbox itself.
    Local {
        /// Directory watched for incoming deliveries.
        inbox: PathBuf,
        /// Directory receiving finalised deliveries and their logs.
        outbox: PathBuf,
    },
    /// Hierarchical file share for durable files plus a flat blob container
    /// that the bulk loader reads from.
    TwoTier {
        /// File-share directory SAS URL for the inbox.
        inbox: Url,
        /// File-share directory SAS URL for the outbox.
        outbox: Url,
        /// Blob container SAS URL for the load tier.
        blob: Url,
    },
}

impl StorageBackend {
    /// Short label used in logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Local { .. } => "local",
            Self::TwoTier { .. } => "two_tier",
        }
    }
}

/// Polling bounds for copy tasks between storage tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyPolicy {
    /// Sleep between status checks.
    pub poll_interval: Duration,
    /// Give up once a copy has been pending this long.
    pub timeout: Duration,
}

/// Console log output preferences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// Filter directive (for example `info` or `dwh_ingest=debug`).
    pub level: String,
    /// Explicit output format; `None` lets the build profile decide.
    pub format: Option<LogOutput>,
}

/// Console log encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    /// One JSON object per line.
    Json,
    /// Human-readable multi-line output.
    Pretty,
}

/// Database connection string that is never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionString(String);

impl ConnectionString {
    /// Wrap a raw connection string.
    #[must_use]
    pub const fn new(raw: String) -> Self {
        Self(raw)
    }

    /// Raw value for handing to the database driver.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Debug for ConnectionString {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str("ConnectionString(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_string_debug_is_redacted() {
        let value = ConnectionString::new("postgres://user:secret@db/dwh".to_string());
        let rendered = format!("{value:?}");
        assert!(!rendered.contains("secret"));
        assert_eq!(value.expose(), "postgres://user:secret@db/dwh");
    }

    #[test]
    fn backend_labels_are_stable() {
        let local = StorageBackend::Local {
            inbox: PathBuf::from("in"),
            outbox: PathBuf::from("out"),
        };
        assert_eq!(local.label(), "local");
    }
}
