#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Telemetry primitives shared across the ingestion workspace.
//!
//! Console logging, per-delivery audit capture and Prometheus counters live here so
//! the pipeline, storage and data crates report through one consistent surface.

pub mod audit;
pub mod error;
pub mod init;
pub mod metrics;

pub use audit::{AuditLineWriter, AuditMakeWriter, AuditTarget, audit_layer, with_audit_target};
pub use error::{Result, TelemetryError};
pub use init::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, build_sha, init_logging};
pub use metrics::{Metrics, MetricsSnapshot};
