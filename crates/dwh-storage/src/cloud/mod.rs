//! Two-tier cloud storage over SAS-addressed REST endpoints.
//!
//! Layout: `rest.rs` (HTTP verbs and URL derivation), `listing.rs` (XML enumeration
//! parsing), `two_tier.rs` (the provider).

pub mod listing;
pub mod rest;
pub mod two_tier;
