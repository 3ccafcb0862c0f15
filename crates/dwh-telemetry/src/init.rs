//! Console logging setup for the daemon.
//!
//! # Design
//! - One entry point installs the global subscriber: an `EnvFilter`-ed console layer
//!   (JSON or pretty) plus the audit layer, which carries its own level filter.
//! - A malformed filter directive is a startup error rather than a silent fallback.
//! - The build SHA is recorded once and attached to the startup event.

use once_cell::sync::OnceCell;
use tracing::info;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::audit::audit_layer;
use crate::error::{Result, TelemetryError};

/// Filter used when neither `DWH_LOG_LEVEL` nor `RUST_LOG` is set.
pub const DEFAULT_LOG_LEVEL: &str = "info";

static BUILD_SHA: OnceCell<String> = OnceCell::new();

type ConsoleLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global tracing subscriber described by `config`.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidFilter`] when `config.level` is not a valid filter
/// directive and [`TelemetryError::SubscriberInstall`] when a global subscriber is
/// already in place.
pub fn init_logging(config: &LoggingConfig<'_>) -> Result<()> {
    let filter =
        EnvFilter::try_new(config.level).map_err(|source| TelemetryError::InvalidFilter {
            directive: config.level.to_string(),
            source,
        })?;

    tracing_subscriber::registry()
        .with(console_layer(config.format, filter))
        .with(audit_layer())
        .try_init()
        .map_err(|source| TelemetryError::SubscriberInstall { source })?;

    let sha = BUILD_SHA.get_or_init(|| config.build_sha.to_string());
    info!(build_sha = %sha, format = ?config.format, "logging initialised");
    Ok(())
}

fn console_layer(format: LogFormat, filter: EnvFilter) -> ConsoleLayer {
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(false)
            .with_thread_ids(false)
            .with_filter(filter)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_filter(filter)
            .boxed(),
    }
}

/// Build SHA recorded by [`init_logging`], or `dev` before initialisation.
#[must_use]
pub fn build_sha() -> &'static str {
    BUILD_SHA
        .get()
        .map_or(option_env!("DWH_BUILD_SHA").unwrap_or("dev"), String::as_str)
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig<'a> {
    /// Filter directive (e.g., `info`, `dwh_ingest=debug`).
    pub level: &'a str,
    /// Output format selection for the console subscriber.
    pub format: LogFormat,
    /// Build identifier recorded at startup.
    pub build_sha: &'a str,
}

impl Default for LoggingConfig<'_> {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL,
            format: LogFormat::infer(),
            build_sha: build_sha(),
        }
    }
}

/// Console encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event.
    Json,
    /// Human-readable lines.
    Pretty,
}

impl LogFormat {
    /// Pretty in debug builds, JSON in release builds.
    #[must_use]
    pub const fn infer() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_info_level() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.format, LogFormat::infer());
    }

    #[test]
    fn malformed_directive_is_rejected_before_install() {
        let config = LoggingConfig {
            level: "dwh_ingest=notalevel",
            format: LogFormat::Pretty,
            build_sha: "test",
        };
        assert!(matches!(
            init_logging(&config),
            Err(TelemetryError::InvalidFilter { .. })
        ));
    }

    #[test]
    fn second_install_reports_subscriber_error() {
        let config = LoggingConfig {
            level: "warn",
            format: LogFormat::Json,
            build_sha: "test",
        };
        let _first = init_logging(&config);
        assert!(matches!(
            init_logging(&config),
            Err(TelemetryError::SubscriberInstall { .. })
        ));
        assert!(!build_sha().is_empty());
    }
}
