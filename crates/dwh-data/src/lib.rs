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

//! Remote operation client for the warehouse database: loosely typed records,
//! transactional execution with transient retry, and named procedure wrappers.

pub mod client;
pub mod error;
pub mod procedures;
pub mod record;

pub use client::{MAX_TRANSIENT_RETRIES, PgOperations, RemoteOperations};
pub use error::{DataError, DataResult};
pub use procedures::{Agreement, INITIAL_STAGE, Procedures};
pub use record::{Param, Record};
