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

//! Delivery ingestion daemon bootstrap wiring.
//!
//! Layout: `bootstrap.rs` (startup sequence and shutdown), `error.rs` (fatal startup errors).

/// Startup sequence, daemon wiring and shutdown handling.
pub mod bootstrap;
/// Fatal application errors.
pub mod error;

pub use bootstrap::run_app;
pub use error::{AppError, AppResult};
