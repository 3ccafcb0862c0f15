//! Default values applied when an environment variable is absent.
//!
//! # Design
//! - Keep every fallback in one place so operators can audit them.
//! - Time-based defaults are expressed in the unit of their environment variable.

/// Inbox used by the local backend when none is configured.
pub const DEFAULT_INBOX: &str = "./in";
/// Outbox used by the local backend when none is configured.
pub const DEFAULT_OUTBOX: &str = "./out";
/// Seconds slept between poll cycles.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
/// Milliseconds slept between copy-status checks.
pub const DEFAULT_COPY_POLL_INTERVAL_MS: u64 = 1_000;
/// Wall-clock bound on a single tier-to-tier copy.
pub const DEFAULT_COPY_TIMEOUT_SECS: u64 = 600;
/// Per-request timeout for storage calls and database acquisition.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
/// Number of concurrent file workers; one keeps processing sequential.
pub const DEFAULT_WORKERS: usize = 1;
/// Upper bound on the worker pool.
pub const MAX_WORKERS: usize = 64;
/// Owner identity recorded against loaded deliveries.
pub const DEFAULT_LOAD_OWNER: &str = "system";
/// Console log filter when neither `DWH_LOG_LEVEL` nor `RUST_LOG` is set.
pub const DEFAULT_LOG_LEVEL: &str = "info";
