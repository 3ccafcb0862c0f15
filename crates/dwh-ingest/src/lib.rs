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

//! Delivery ingestion: per-file audit capture, classification, the stage pipeline with
//! guaranteed finalization, and the poll scheduler that feeds it.

pub mod audit;
pub mod classify;
pub mod error;
pub mod pipeline;
pub mod scheduler;

pub use audit::{AuditSink, AuditWriter, SharedAuditSink};
pub use classify::DeliveryKind;
pub use error::{AuditError, AuditResult, PipelineError, PipelineResult, error_chain};
pub use pipeline::{
    Finalization, Outcome, Pipeline, PipelineReport, PipelineRun, Stage, StageRecord,
};
pub use scheduler::{CycleSummary, PollScheduler};
