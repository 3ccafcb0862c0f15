//! Environment-backed configuration loading.
//!
//! # Design
//! - Reads go through [`EnvSource`] so tests can supply a map instead of the process environment.
//! - Empty or whitespace-only values count as unset and fall back to defaults.
//! - `DWH_BLOB_SAS` selects the backend: present means two-tier cloud, absent means local.

use std::collections::HashMap;
use std::hash::BuildHasher;
use std::path::PathBuf;

use tracing::debug;

use crate::defaults::{
    DEFAULT_COPY_POLL_INTERVAL_MS, DEFAULT_COPY_TIMEOUT_SECS, DEFAULT_INBOX, DEFAULT_LOAD_OWNER,
    DEFAULT_LOG_LEVEL, DEFAULT_OUTBOX, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_WORKERS,
};
use crate::error::{ConfigError, ConfigResult};
use crate::model::{
    ConnectionString, CopyPolicy, DaemonConfig, LogSettings, StorageBackend,
};
use crate::validate::{
    parse_log_output, parse_millis, parse_sas_url, parse_seconds, parse_workers,
};

/// Inbox directory path or file-share SAS URL.
pub const ENV_INBOX: &str = "DWH_INBOX";
/// Outbox directory path or file-share SAS URL.
pub const ENV_OUTBOX: &str = "DWH_OUTBOX";
/// Seconds between poll cycles.
pub const ENV_POLL_INTERVAL: &str = "DWH_POLL_INTERVAL_SECS";
/// Blob container SAS URL; enables the two-tier backend.
pub const ENV_BLOB_SAS: &str = "DWH_BLOB_SAS";
/// Remote data engine connection string.
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
/// Milliseconds between copy status checks.
pub const ENV_COPY_POLL_INTERVAL: &str = "DWH_COPY_POLL_INTERVAL_MS";
/// Seconds before a pending copy is abandoned.
pub const ENV_COPY_TIMEOUT: &str = "DWH_COPY_TIMEOUT_SECS";
/// Seconds allowed per storage request.
pub const ENV_REQUEST_TIMEOUT: &str = "DWH_REQUEST_TIMEOUT_SECS";
/// Number of concurrent file workers.
pub const ENV_WORKERS: &str = "DWH_WORKERS";
/// Owner identity passed to the load procedure.
pub const ENV_LOAD_OWNER: &str = "DWH_LOAD_OWNER";
/// Log filter directive.
pub const ENV_LOG_LEVEL: &str = "DWH_LOG_LEVEL";
/// Fallback log filter directive.
pub const ENV_RUST_LOG: &str = "RUST_LOG";
/// Console log format (`json` or `pretty`).
pub const ENV_LOG_FORMAT: &str = "DWH_LOG_FORMAT";

/// Source of raw configuration values.
pub trait EnvSource {
    /// Look up a variable by name.
    fn var(&self, name: &str) -> Option<String>;
}

/// Reads from the current process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl<S: BuildHasher> EnvSource for HashMap<String, String, S> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl DaemonConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required variable is missing or a value
    /// fails validation.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_source(&ProcessEnv)
    }

    /// Load configuration from an arbitrary source.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required variable is missing or a value
    /// fails validation.
    pub fn from_source(source: &dyn EnvSource) -> ConfigResult<Self> {
        let database_url = lookup(source, ENV_DATABASE_URL).ok_or(ConfigError::MissingEnv {
            name: ENV_DATABASE_URL,
        })?;

        let backend = resolve_backend(source)?;

        let poll_interval = lookup(source, ENV_POLL_INTERVAL).map_or_else(
            || Ok(std::time::Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS)),
            |raw| parse_seconds(ENV_POLL_INTERVAL, &raw),
        )?;
        let copy = CopyPolicy {
            poll_interval: lookup(source, ENV_COPY_POLL_INTERVAL).map_or_else(
                || Ok(std::time::Duration::from_millis(DEFAULT_COPY_POLL_INTERVAL_MS)),
                |raw| parse_millis(ENV_COPY_POLL_INTERVAL, &raw),
            )?,
            timeout: lookup(source, ENV_COPY_TIMEOUT).map_or_else(
                || Ok(std::time::Duration::from_secs(DEFAULT_COPY_TIMEOUT_SECS)),
                |raw| parse_seconds(ENV_COPY_TIMEOUT, &raw),
            )?,
        };
        let request_timeout = lookup(source, ENV_REQUEST_TIMEOUT).map_or_else(
            || Ok(std::time::Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)),
            |raw| parse_seconds(ENV_REQUEST_TIMEOUT, &raw),
        )?;
        let workers = lookup(source, ENV_WORKERS).map_or(Ok(DEFAULT_WORKERS), |raw| {
            parse_workers(ENV_WORKERS, &raw)
        })?;
        let load_owner =
            lookup(source, ENV_LOAD_OWNER).unwrap_or_else(|| DEFAULT_LOAD_OWNER.to_string());

        let level = lookup(source, ENV_LOG_LEVEL)
            .or_else(|| lookup(source, ENV_RUST_LOG))
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());
        let format = lookup(source, ENV_LOG_FORMAT)
            .map(|raw| parse_log_output(ENV_LOG_FORMAT, &raw))
            .transpose()?;

        debug!(
            backend = backend.label(),
            workers,
            poll_interval_secs = poll_interval.as_secs(),
            "configuration loaded"
        );

        Ok(Self {
            backend,
            database_url: ConnectionString::new(database_url),
            poll_interval,
            copy,
            request_timeout,
            workers,
            load_owner,
            logging: LogSettings { level, format },
        })
    }
}

fn resolve_backend(source: &dyn EnvSource) -> ConfigResult<StorageBackend> {
    let inbox = lookup(source, ENV_INBOX);
    let outbox = lookup(source, ENV_OUTBOX);

    match lookup(source, ENV_BLOB_SAS) {
        Some(blob) => {
            let inbox = inbox.ok_or(ConfigError::MissingEnv { name: ENV_INBOX })?;
            let outbox = outbox.ok_or(ConfigError::MissingEnv { name: ENV_OUTBOX })?;
            Ok(StorageBackend::TwoTier {
                inbox: parse_sas_url(ENV_INBOX, &inbox)?,
                outbox: parse_sas_url(ENV_OUTBOX, &outbox)?,
                blob: parse_sas_url(ENV_BLOB_SAS, &blob)?,
            })
        }
        None => Ok(StorageBackend::Local {
            inbox: PathBuf::from(inbox.unwrap_or_else(|| DEFAULT_INBOX.to_string())),
            outbox: PathBuf::from(outbox.unwrap_or_else(|| DEFAULT_OUTBOX.to_string())),
        }),
    }
}

fn lookup(source: &dyn EnvSource, name: &str) -> Option<String> {
    source
        .var(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect()
    }

    #[test]
    fn lookup_treats_blank_values_as_unset() {
        let source = env(&[(ENV_INBOX, "   ")]);
        assert_eq!(lookup(&source, ENV_INBOX), None);
    }

    #[test]
    fn local_backend_uses_default_directories() -> ConfigResult<()> {
        let config = DaemonConfig::from_source(&env(&[(ENV_DATABASE_URL, "postgres://db")]))?;
        assert_eq!(
            config.backend,
            StorageBackend::Local {
                inbox: PathBuf::from("./in"),
                outbox: PathBuf::from("./out"),
            }
        );
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.copy.poll_interval, Duration::from_millis(1_000));
        assert_eq!(config.workers, 1);
        assert_eq!(config.load_owner, "system");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, None);
        Ok(())
    }

    #[test]
    fn blob_sas_requires_cloud_inbox_and_outbox() {
        let source = env(&[
            (ENV_DATABASE_URL, "postgres://db"),
            (ENV_BLOB_SAS, "https://acct.blob.core.windows.net/load?sig=x"),
        ]);
        assert!(matches!(
            DaemonConfig::from_source(&source),
            Err(ConfigError::MissingEnv { name: ENV_INBOX })
        ));
    }
}
