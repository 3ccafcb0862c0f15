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

//! Storage providers for delivery files.
//!
//! Layout: `provider.rs` (capability trait), `local.rs` (filesystem backend),
//! `cloud/` (file share plus blob container backend), `copy.rs` (bounded copy
//! polling), `factory.rs` (backend selection).

pub mod cloud;
pub mod copy;
pub mod error;
pub mod factory;
pub mod local;
pub mod model;
pub mod provider;

pub use cloud::rest::RestClient;
pub use cloud::two_tier::{TwoTierLocations, TwoTierStorage};
pub use copy::{CopyOutcome, CopyPoller, CopyStatus};
pub use error::{StorageError, StorageResult};
pub use factory::build_storage;
pub use local::LocalStorage;
pub use model::{DeliveryFile, LOG_SUFFIX, log_name};
pub use provider::StorageProvider;
