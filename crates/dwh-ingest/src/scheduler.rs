//! Poll scheduler: discover deliveries, fan them out to a bounded worker pool, sleep.
//!
//! # Design
//! - One listing per cycle; files are queued on a channel drained by `workers` tasks.
//! - Each worker owns its own audit sink, so concurrent runs never share a log buffer.
//! - Per-file failures stay inside [`PipelineReport`]s; a cycle itself never fails.

use std::sync::Arc;
use std::time::Duration;

use dwh_storage::{DeliveryFile, StorageProvider};
use dwh_telemetry::Metrics;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::audit::SharedAuditSink;
use crate::pipeline::{Finalization, Outcome, Pipeline, PipelineReport};

/// Tally of one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Deliveries handed to the pipeline.
    pub processed: usize,
    /// Deliveries whose stages all succeeded.
    pub succeeded: usize,
    /// Deliveries with a failed stage.
    pub failed: usize,
    /// Deliveries with no applicable pipeline.
    pub ignored: usize,
    /// Deliveries left in the inbox because finalize failed.
    pub stuck: usize,
}

impl CycleSummary {
    fn record(&mut self, report: &PipelineReport) {
        self.processed += 1;
        match report.outcome() {
            Outcome::Succeeded => self.succeeded += 1,
            Outcome::Failed => self.failed += 1,
            Outcome::Ignored => self.ignored += 1,
        }
        if matches!(report.finalization, Finalization::StuckInInbox(_)) {
            self.stuck += 1;
        }
    }

    const fn merge(&mut self, other: Self) {
        self.processed += other.processed;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.ignored += other.ignored;
        self.stuck += other.stuck;
    }
}

/// Drives the daemon's main loop.
pub struct PollScheduler {
    storage: Arc<dyn StorageProvider>,
    pipeline: Pipeline,
    metrics: Metrics,
    workers: usize,
    interval: Duration,
}

impl PollScheduler {
    /// Scheduler polling `storage` every `interval` with up to `workers` concurrent runs.
    #[must_use]
    pub fn new(
        storage: Arc<dyn StorageProvider>,
        pipeline: Pipeline,
        metrics: Metrics,
        workers: usize,
        interval: Duration,
    ) -> Self {
        Self {
            storage,
            pipeline,
            metrics,
            workers: workers.max(1),
            interval,
        }
    }

    /// List the inbox once and process every delivery found.
    pub async fn run_cycle(&self) -> CycleSummary {
        let files = self.storage.list_inbox().await;
        self.metrics.set_inbox_files(files.len());
        if files.is_empty() {
            debug!("inbox empty");
            return CycleSummary::default();
        }

        let workers = self.workers.min(files.len());
        info!(files = files.len(), workers, "dispatching deliveries");

        let (sender, receiver) = mpsc::channel::<DeliveryFile>(files.len());
        for file in files {
            if sender.send(file).await.is_err() {
                break;
            }
        }
        drop(sender);

        let queue = Arc::new(Mutex::new(receiver));
        let mut tasks = JoinSet::new();
        for worker in 0..workers {
            let queue = Arc::clone(&queue);
            let pipeline = self.pipeline.clone();
            let sink = SharedAuditSink::new(Arc::clone(&self.storage));
            tasks.spawn(async move { drain(worker, &queue, &pipeline, &sink).await });
        }

        let mut summary = CycleSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(partial) => summary.merge(partial),
                Err(err) => error!(error = %err, "delivery worker aborted"),
            }
        }
        summary
    }

    /// Poll forever. Returns only if the surrounding task is cancelled.
    pub async fn run(&self) {
        info!(
            backend = self.storage.backend_name(),
            workers = self.workers,
            interval_secs = self.interval.as_secs(),
            "poll scheduler started"
        );
        loop {
            let summary = self.run_cycle().await;
            if summary.processed > 0 {
                info!(
                    processed = summary.processed,
                    succeeded = summary.succeeded,
                    failed = summary.failed,
                    ignored = summary.ignored,
                    stuck = summary.stuck,
                    "poll cycle complete"
                );
            }
            if summary.stuck > 0 {
                warn!(
                    stuck = summary.stuck,
                    "deliveries remain in the inbox after finalize failures"
                );
            }
            info!(secs = self.interval.as_secs(), "waiting for next poll");
            tokio::time::sleep(self.interval).await;
        }
    }
}

async fn drain(
    worker: usize,
    queue: &Mutex<mpsc::Receiver<DeliveryFile>>,
    pipeline: &Pipeline,
    sink: &SharedAuditSink,
) -> CycleSummary {
    let mut summary = CycleSummary::default();
    loop {
        let next = queue.lock().await.recv().await;
        let Some(file) = next else {
            break;
        };
        debug!(worker, file = %file.name, "worker picked delivery");
        let report = pipeline.process(file, sink).await;
        summary.record(&report);
    }
    summary
}
