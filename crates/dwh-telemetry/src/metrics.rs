//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Label values are short static identifiers (`csv`, `load`, `failed`) to keep cardinality bounded.

use std::sync::Arc;

use prometheus::core::Collector;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Prometheus-backed metrics registry shared across the daemon.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("Metrics").finish_non_exhaustive()
    }
}

struct MetricsInner {
    registry: Registry,
    delivery_files_total: IntCounterVec,
    delivery_stages_total: IntCounterVec,
    storage_copy_tasks_total: IntCounterVec,
    delivery_finalize_failures_total: IntCounter,
    inbox_files: IntGauge,
}

/// Snapshot of selected gauges and counters for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Files observed in the inbox on the most recent listing.
    pub inbox_files: i64,
    /// Deliveries whose finalize move failed and remain in the inbox.
    pub delivery_finalize_failures_total: u64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be built or
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let delivery_files_total = counter_vec(
            "delivery_files_total",
            "Deliveries processed by kind and outcome",
            &["kind", "outcome"],
        )?;
        let delivery_stages_total = counter_vec(
            "delivery_stages_total",
            "Pipeline stages executed by status",
            &["stage", "status"],
        )?;
        let storage_copy_tasks_total = counter_vec(
            "storage_copy_tasks_total",
            "Tier-to-tier copy tasks by terminal outcome",
            &["outcome"],
        )?;
        let delivery_finalize_failures_total = IntCounter::with_opts(Opts::new(
            "delivery_finalize_failures_total",
            "Deliveries that could not be moved to the outbox",
        ))
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "delivery_finalize_failures_total",
            source,
        })?;
        let inbox_files = IntGauge::with_opts(Opts::new(
            "inbox_files",
            "Files observed in the inbox on the last poll",
        ))
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "inbox_files",
            source,
        })?;

        register(&registry, "delivery_files_total", &delivery_files_total)?;
        register(&registry, "delivery_stages_total", &delivery_stages_total)?;
        register(
            &registry,
            "storage_copy_tasks_total",
            &storage_copy_tasks_total,
        )?;
        register(
            &registry,
            "delivery_finalize_failures_total",
            &delivery_finalize_failures_total,
        )?;
        register(&registry, "inbox_files", &inbox_files)?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                delivery_files_total,
                delivery_stages_total,
                storage_copy_tasks_total,
                delivery_finalize_failures_total,
                inbox_files,
            }),
        })
    }

    /// Increment the processed-delivery counter.
    pub fn inc_delivery(&self, kind: &str, outcome: &str) {
        self.inner
            .delivery_files_total
            .with_label_values(&[kind, outcome])
            .inc();
    }

    /// Increment the pipeline stage counter.
    pub fn inc_stage(&self, stage: &str, status: &str) {
        self.inner
            .delivery_stages_total
            .with_label_values(&[stage, status])
            .inc();
    }

    /// Increment the copy task counter for a terminal outcome.
    pub fn inc_copy_task(&self, outcome: &str) {
        self.inner
            .storage_copy_tasks_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Increment the finalize failure counter.
    pub fn inc_finalize_failure(&self) {
        self.inner.delivery_finalize_failures_total.inc();
    }

    /// Set the inbox size gauge.
    pub fn set_inbox_files(&self, count: usize) {
        self.inner
            .inbox_files
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Read a single stage counter; used by health reporting and tests.
    #[must_use]
    pub fn stage_count(&self, stage: &str, status: &str) -> u64 {
        self.inner
            .delivery_stages_total
            .with_label_values(&[stage, status])
            .get()
    }

    /// Read a single delivery counter.
    #[must_use]
    pub fn delivery_count(&self, kind: &str, outcome: &str) -> u64 {
        self.inner
            .delivery_files_total
            .with_label_values(&[kind, outcome])
            .get()
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }

    /// Take a point-in-time snapshot of the most relevant gauges and counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            inbox_files: self.inner.inbox_files.get(),
            delivery_finalize_failures_total: self.inner.delivery_finalize_failures_total.get(),
        }
    }
}

fn counter_vec(name: &'static str, help: &str, labels: &[&str]) -> Result<IntCounterVec> {
    IntCounterVec::new(Opts::new(name, help), labels)
        .map_err(|source| TelemetryError::MetricsCollector { name, source })
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> Result<()>
where
    C: Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_snapshot_reflects_updates() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.inc_delivery("csv", "succeeded");
        metrics.inc_stage("load", "completed");
        metrics.inc_stage("load", "completed");
        metrics.inc_copy_task("success");
        metrics.inc_finalize_failure();
        metrics.set_inbox_files(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.inbox_files, 3);
        assert_eq!(snapshot.delivery_finalize_failures_total, 1);
        assert_eq!(metrics.stage_count("load", "completed"), 2);
        assert_eq!(metrics.delivery_count("csv", "succeeded"), 1);
        assert_eq!(metrics.delivery_count("sql", "succeeded"), 0);
        Ok(())
    }

    #[test]
    fn render_includes_registered_collectors() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.inc_stage("validate", "failed");
        let rendered = metrics.render()?;
        assert!(rendered.contains("delivery_stages_total"));
        assert!(rendered.contains("stage=\"validate\""));
        assert!(rendered.contains("inbox_files"));
        Ok(())
    }
}
