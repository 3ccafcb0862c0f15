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

//! Environment-driven configuration for the delivery ingestion daemon.
//!
//! Layout: `model.rs` (typed configuration), `loader.rs` (environment sources),
//! `validate.rs` (parsing helpers), `defaults.rs` (fallback values).

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{EnvSource, ProcessEnv};
pub use model::{
    ConnectionString, CopyPolicy, DaemonConfig, LogOutput, LogSettings, StorageBackend,
};
