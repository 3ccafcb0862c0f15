//! Pipeline engine: stage sequencing per delivery kind with guaranteed finalization.
//!
//! # Design
//! - Stages run strictly in order and the first failure stops the sequence.
//! - Every stage goes through [`Pipeline::stage`], which logs `stage started` and
//!   `stage completed` / `stage failed` and records the outcome on the run.
//! - The load tier is reclaimed exactly once per load attempt, whatever the load result,
//!   including when the load call panics.
//! - Finalization (move to outbox, then audit flush) runs for every delivery, including
//!   ignored ones and runs whose stages panicked.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, resume_unwind};
use std::sync::Arc;

use dwh_data::{INITIAL_STAGE, Procedures, Record};
use dwh_storage::{DeliveryFile, StorageProvider};
use dwh_telemetry::{Metrics, with_audit_target};
use futures_util::FutureExt;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::audit::SharedAuditSink;
use crate::classify::DeliveryKind;
use crate::error::{PipelineError, PipelineResult, error_chain};

/// One step of a delivery pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Look up the owning agreement.
    Resolve,
    /// Stage into the load tier, bulk load, reclaim the load tier.
    Load,
    /// Validate the loaded rows.
    Validate,
    /// Publish the validated delivery.
    Publish,
    /// Fire downstream triggers.
    Trigger,
    /// Submit an agreement script.
    Script,
}

impl Stage {
    /// Stage sequence of a `.csv` delivery.
    pub const CSV: [Self; 5] = [
        Self::Resolve,
        Self::Load,
        Self::Validate,
        Self::Publish,
        Self::Trigger,
    ];

    /// Stable stage name used in logs and metrics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Resolve => "resolve",
            Self::Load => "load",
            Self::Validate => "validate",
            Self::Publish => "publish",
            Self::Trigger => "trigger",
            Self::Script => "script",
        }
    }

    /// Stages run for `kind`, in order.
    #[must_use]
    pub const fn sequence(kind: &DeliveryKind) -> &'static [Self] {
        match kind {
            DeliveryKind::Csv => &Self::CSV,
            DeliveryKind::Sql => &[Self::Script],
            DeliveryKind::Ignored { .. } => &[],
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one stage within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageRecord {
    /// The stage was never reached.
    NotAttempted,
    /// The stage succeeded; carries a short summary.
    Succeeded(String),
    /// The stage failed; carries the rendered error chain.
    Failed(String),
}

/// State of one delivery passing through the pipeline in the current poll cycle.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    id: Uuid,
    file: DeliveryFile,
    kind: DeliveryKind,
    stages: Vec<(Stage, StageRecord)>,
    current: Option<Stage>,
}

impl PipelineRun {
    /// Fresh run with every stage of `kind` not attempted.
    #[must_use]
    pub fn new(file: DeliveryFile, kind: DeliveryKind) -> Self {
        let stages = Stage::sequence(&kind)
            .iter()
            .map(|stage| (*stage, StageRecord::NotAttempted))
            .collect();
        Self {
            id: Uuid::new_v4(),
            file,
            kind,
            stages,
            current: None,
        }
    }

    /// Run identifier carried on every log line of this run.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Delivery being processed.
    #[must_use]
    pub const fn file(&self) -> &DeliveryFile {
        &self.file
    }

    /// Classification of the delivery.
    #[must_use]
    pub const fn kind(&self) -> &DeliveryKind {
        &self.kind
    }

    /// Every stage of the sequence with its outcome, in order.
    #[must_use]
    pub fn stages(&self) -> &[(Stage, StageRecord)] {
        &self.stages
    }

    /// Outcome of `stage`, if it belongs to this run's sequence.
    #[must_use]
    pub fn stage(&self, stage: Stage) -> Option<&StageRecord> {
        self.stages
            .iter()
            .find(|(candidate, _)| *candidate == stage)
            .map(|(_, record)| record)
    }

    /// First failed stage and its reason.
    #[must_use]
    pub fn failure(&self) -> Option<(Stage, &str)> {
        self.stages.iter().find_map(|(stage, record)| match record {
            StageRecord::Failed(reason) => Some((*stage, reason.as_str())),
            _ => None,
        })
    }

    const fn begin(&mut self, stage: Stage) {
        self.current = Some(stage);
    }

    fn record(&mut self, stage: Stage, record: StageRecord) {
        if let Some(slot) = self
            .stages
            .iter_mut()
            .find(|(candidate, _)| *candidate == stage)
        {
            slot.1 = record;
        }
        self.current = None;
    }

    fn abort_current(&mut self, reason: String) -> Option<Stage> {
        let stage = self.current?;
        self.record(stage, StageRecord::Failed(reason));
        Some(stage)
    }
}

/// Overall result of a run's stage sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every stage succeeded.
    Succeeded,
    /// A stage failed.
    Failed,
    /// No pipeline applies to the delivery.
    Ignored,
}

impl Outcome {
    /// Metrics label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Ignored => "ignored",
        }
    }
}

/// Terminal placement of a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finalization {
    /// The delivery left the inbox for the outbox.
    MovedToOutbox,
    /// The move failed; the delivery will be reprocessed next cycle.
    StuckInInbox(String),
}

/// What happened to one delivery.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Completed run.
    pub run: PipelineRun,
    /// Where the delivery ended up.
    pub finalization: Finalization,
    /// Whether `<name>.log` reached the outbox.
    pub log_persisted: bool,
}

impl PipelineReport {
    /// Overall outcome of the stage sequence.
    #[must_use]
    pub fn outcome(&self) -> Outcome {
        if matches!(self.run.kind, DeliveryKind::Ignored { .. }) {
            Outcome::Ignored
        } else if self.run.failure().is_some() {
            Outcome::Failed
        } else {
            Outcome::Succeeded
        }
    }
}

/// Drives deliveries through their stage sequence.
#[derive(Clone)]
pub struct Pipeline {
    storage: Arc<dyn StorageProvider>,
    procedures: Procedures,
    metrics: Metrics,
    load_owner: Arc<str>,
}

impl Pipeline {
    /// Build an engine over `storage` and the warehouse `procedures`.
    #[must_use]
    pub fn new(
        storage: Arc<dyn StorageProvider>,
        procedures: Procedures,
        metrics: Metrics,
        load_owner: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            procedures,
            metrics,
            load_owner: Arc::from(load_owner.into()),
        }
    }

    /// Process one delivery end to end, capturing its diagnostics in `sink`.
    ///
    /// Never fails: stage errors are recorded on the returned report and the delivery
    /// is always offered to the outbox.
    pub async fn process(&self, file: DeliveryFile, sink: &SharedAuditSink) -> PipelineReport {
        let kind = DeliveryKind::classify(&file.name);
        let mut run = PipelineRun::new(file, kind);
        let span = info_span!("delivery", file = %run.file.name, run_id = %run.id);

        let log_bound = match sink.bind(&run.file) {
            Ok(()) => true,
            Err(err) => {
                error!(
                    parent: &span,
                    error = ?err,
                    "audit sink unavailable; processing without a persisted log"
                );
                false
            }
        };

        let finalization = if log_bound {
            with_audit_target(
                sink.writer(),
                self.run_and_finalize(&mut run).instrument(span.clone()),
            )
            .await
        } else {
            self.run_and_finalize(&mut run)
                .instrument(span.clone())
                .await
        };

        let log_persisted = log_bound && persist_log(sink).instrument(span).await;
        let report = PipelineReport {
            run,
            finalization,
            log_persisted,
        };
        self.metrics
            .inc_delivery(report.run.kind.label(), report.outcome().label());
        report
    }

    async fn run_and_finalize(&self, run: &mut PipelineRun) -> Finalization {
        info!(size = run.file.size, kind = %run.kind, "processing delivery");
        if let Err(payload) = AssertUnwindSafe(self.execute(run)).catch_unwind().await {
            let reason = panic_reason(payload.as_ref());
            let stage = run.abort_current(format!("panicked: {reason}"));
            if let Some(stage) = stage {
                self.metrics.inc_stage(stage.name(), "failed");
            }
            error!(
                stage = stage.map_or("none", Stage::name),
                panic = %reason,
                "pipeline panicked"
            );
        }
        self.finalize(&run.file).await
    }

    async fn execute(&self, run: &mut PipelineRun) {
        let file = run.file.clone();
        match run.kind.clone() {
            DeliveryKind::Csv => self.run_csv(run, &file).await,
            DeliveryKind::Sql => {
                self.stage(run, Stage::Script, self.apply_script(&file))
                    .await;
            }
            DeliveryKind::Ignored { extension } => {
                info!(extension = %extension, "ignored: no pipeline for this extension");
            }
        }
    }

    async fn run_csv(&self, run: &mut PipelineRun, file: &DeliveryFile) {
        if !self.stage(run, Stage::Resolve, self.resolve(file)).await {
            return;
        }
        if !self.stage(run, Stage::Load, self.load(file)).await {
            return;
        }
        for stage in [Stage::Validate, Stage::Publish, Stage::Trigger] {
            if !self.stage(run, stage, self.post_load(stage, file)).await {
                return;
            }
        }
    }

    async fn stage<F>(&self, run: &mut PipelineRun, stage: Stage, work: F) -> bool
    where
        F: Future<Output = PipelineResult<String>>,
    {
        run.begin(stage);
        info!(%stage, "stage started");
        match work.await {
            Ok(detail) => {
                info!(%stage, detail = %detail, "stage completed");
                self.metrics.inc_stage(stage.name(), "completed");
                run.record(stage, StageRecord::Succeeded(detail));
                true
            }
            Err(err) => {
                let reason = error_chain(&err);
                error!(%stage, error = %reason, "stage failed");
                self.metrics.inc_stage(stage.name(), "failed");
                run.record(stage, StageRecord::Failed(reason));
                false
            }
        }
    }

    async fn resolve(&self, file: &DeliveryFile) -> PipelineResult<String> {
        let agreement = self
            .procedures
            .agreement_find(&file.name, INITIAL_STAGE)
            .await
            .map_err(|source| PipelineError::Remote {
                stage: Stage::Resolve.name(),
                source,
            })?
            .ok_or_else(|| PipelineError::AgreementNotFound {
                file: file.name.clone(),
            })?;
        Ok(match agreement.procedure {
            Some(procedure) => format!("agreement {} procedure {procedure}", agreement.id),
            None => format!("agreement {}", agreement.id),
        })
    }

    async fn load(&self, file: &DeliveryFile) -> PipelineResult<String> {
        self.storage
            .stage_for_load(file)
            .await
            .map_err(|source| PipelineError::Storage {
                stage: Stage::Load.name(),
                source,
            })?;
        info!(backend = self.storage.backend_name(), "staged for load");

        let attempt = AssertUnwindSafe(self.procedures.delivery_load(
            &file.path,
            &file.name,
            &self.load_owner,
            file.size,
        ))
        .catch_unwind()
        .await;
        self.reclaim(file).await;

        let rows = match attempt {
            Ok(result) => result.map_err(|source| PipelineError::Remote {
                stage: Stage::Load.name(),
                source,
            })?,
            Err(payload) => resume_unwind(payload),
        };
        Ok(summarise_rows(Stage::Load, &rows))
    }

    async fn reclaim(&self, file: &DeliveryFile) {
        match self.storage.reclaim_after_load(file).await {
            Ok(()) => {
                info!("load tier reclaimed");
                self.metrics.inc_stage("reclaim", "completed");
            }
            Err(err) => {
                warn!(error = %error_chain(&err), "load tier reclaim incomplete");
                self.metrics.inc_stage("reclaim", "failed");
            }
        }
    }

    async fn post_load(&self, stage: Stage, file: &DeliveryFile) -> PipelineResult<String> {
        let name = file.name.as_str();
        let rows = match stage {
            Stage::Validate => self.procedures.delivery_validate(name).await,
            Stage::Publish => self.procedures.delivery_publish(name).await,
            Stage::Trigger => self.procedures.delivery_trigger(name).await,
            Stage::Resolve | Stage::Load | Stage::Script => Ok(Vec::new()),
        }
        .map_err(|source| PipelineError::Remote {
            stage: stage.name(),
            source,
        })?;
        Ok(summarise_rows(stage, &rows))
    }

    async fn apply_script(&self, file: &DeliveryFile) -> PipelineResult<String> {
        let bytes = self
            .storage
            .read_file(file)
            .await
            .map_err(|source| PipelineError::Storage {
                stage: Stage::Script.name(),
                source,
            })?;
        let script = String::from_utf8(bytes).map_err(|source| PipelineError::ScriptEncoding {
            file: file.name.clone(),
            source,
        })?;
        info!(bytes = script.len(), "submitting agreement script");
        self.procedures
            .run_script(&script)
            .await
            .map_err(|source| PipelineError::Remote {
                stage: Stage::Script.name(),
                source,
            })?;
        Ok(format!("script applied ({} bytes)", script.len()))
    }

    async fn finalize(&self, file: &DeliveryFile) -> Finalization {
        let attempt = AssertUnwindSafe(self.storage.move_to_outbox(file))
            .catch_unwind()
            .await;
        let reason = match attempt {
            Ok(Ok(())) => {
                info!("moved to outbox");
                return Finalization::MovedToOutbox;
            }
            Ok(Err(err)) => error_chain(&err),
            Err(payload) => format!("panicked: {}", panic_reason(payload.as_ref())),
        };
        self.metrics.inc_finalize_failure();
        error!(
            error = %reason,
            "finalize failed; delivery stays in the inbox and will be reprocessed"
        );
        Finalization::StuckInInbox(reason)
    }
}

async fn persist_log(sink: &SharedAuditSink) -> bool {
    match sink.flush().await {
        Ok(bytes) => {
            debug!(bytes, "audit log persisted");
            true
        }
        Err(err) => {
            error!(error = ?err, "audit log could not be persisted");
            false
        }
    }
}

fn summarise_rows(stage: Stage, rows: &[Record]) -> String {
    for row in rows.iter().filter(|row| !row.is_empty()) {
        info!(%stage, row = %row, "remote result");
    }
    match rows.len() {
        0 => "no rows".to_string(),
        1 => "1 row".to_string(),
        count => format!("{count} rows"),
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(name: &str) -> PipelineRun {
        PipelineRun::new(
            DeliveryFile::new(name, name, 1),
            DeliveryKind::classify(name),
        )
    }

    #[test]
    fn runs_start_with_every_stage_pending() {
        let csv = run("a.csv");
        assert_eq!(csv.stages().len(), 5);
        assert!(csv
            .stages()
            .iter()
            .all(|(_, record)| *record == StageRecord::NotAttempted));
        assert_eq!(run("a.sql").stages(), &[(Stage::Script, StageRecord::NotAttempted)]);
        assert!(run("a.txt").stages().is_empty());
    }

    #[test]
    fn abort_marks_the_running_stage_failed() {
        let mut csv = run("a.csv");
        csv.begin(Stage::Resolve);
        csv.record(Stage::Resolve, StageRecord::Succeeded("agreement 42".into()));
        csv.begin(Stage::Load);
        assert_eq!(csv.abort_current("panicked: boom".into()), Some(Stage::Load));
        assert_eq!(csv.failure(), Some((Stage::Load, "panicked: boom")));
        assert_eq!(csv.stage(Stage::Validate), Some(&StageRecord::NotAttempted));
        assert_eq!(csv.abort_current("again".into()), None);
    }

    #[test]
    fn panic_payloads_are_rendered() {
        let literal: Box<dyn Any + Send> = Box::new("boom");
        let owned: Box<dyn Any + Send> = Box::new(String::from("bang"));
        let other: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_reason(literal.as_ref()), "boom");
        assert_eq!(panic_reason(owned.as_ref()), "bang");
        assert_eq!(panic_reason(other.as_ref()), "non-string panic payload");
    }

    #[test]
    fn row_summaries_count_rows() {
        assert_eq!(summarise_rows(Stage::Validate, &[]), "no rows");
        assert_eq!(
            summarise_rows(Stage::Validate, &[Record::default(), Record::default()]),
            "2 rows"
        );
    }
}
