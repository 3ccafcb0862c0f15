use std::sync::{Arc, Once};

use anyhow::Result;
use dwh_data::{Param, Procedures, Record};
use dwh_ingest::{
    Finalization, Outcome, Pipeline, PipelineReport, SharedAuditSink, Stage, StageRecord,
};
use dwh_storage::{DeliveryFile, StorageProvider};
use dwh_telemetry::{Metrics, audit_layer};
use dwh_test_support::fixtures::{LocalFixture, csv_payload};
use dwh_test_support::mocks::{MemoryStorage, RecordingOperations, SCRIPT};
use serde_json::json;
use tracing_subscriber::layer::SubscriberExt;

const ACME: &str = "acme_20240101.csv";

fn init_audit_capture() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let subscriber = tracing_subscriber::registry().with(audit_layer());
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

struct Harness {
    storage: Arc<MemoryStorage>,
    ops: Arc<RecordingOperations>,
    metrics: Metrics,
    pipeline: Pipeline,
    sink: SharedAuditSink,
}

impl Harness {
    fn new(storage: MemoryStorage, ops: RecordingOperations) -> Result<Self> {
        init_audit_capture();
        let storage = Arc::new(storage);
        let ops = Arc::new(ops);
        let metrics = Metrics::new()?;
        let pipeline = Pipeline::new(
            storage.clone(),
            Procedures::new(ops.clone()),
            metrics.clone(),
            "system",
        );
        let sink = SharedAuditSink::new(storage.clone());
        Ok(Self {
            storage,
            ops,
            metrics,
            pipeline,
            sink,
        })
    }

    async fn process(&self, name: &str) -> Result<PipelineReport> {
        let file = self
            .storage
            .list_inbox()
            .await
            .into_iter()
            .find(|file| file.name == name)
            .ok_or_else(|| anyhow::anyhow!("{name} not listed"))?;
        Ok(self.pipeline.process(file, &self.sink).await)
    }

    fn log(&self, name: &str) -> String {
        self.storage.log_text(name).unwrap_or_default()
    }
}

#[tokio::test]
async fn csv_delivery_runs_every_stage_and_reaches_outbox() -> Result<()> {
    let payload = csv_payload(50_000);
    let harness = Harness::new(
        MemoryStorage::new().with_file(ACME, &payload),
        RecordingOperations::new().with_agreement(42),
    )?;

    let report = harness.process(ACME).await?;

    assert_eq!(report.finalization, Finalization::MovedToOutbox);
    assert_eq!(report.outcome(), Outcome::Succeeded);
    assert!(report.log_persisted);
    assert_eq!(harness.storage.outbox_file(ACME), Some(payload));
    assert!(harness.storage.inbox_names().is_empty());
    assert!(harness.storage.load_tier_names().is_empty());
    assert_eq!(
        harness.ops.procedures(),
        vec![
            "agreement_find",
            "delivery_load",
            "delivery_validate",
            "delivery_publish",
            "delivery_trigger",
        ]
    );

    let load = &harness.ops.calls()[1];
    assert_eq!(
        load.params,
        vec![
            Param::from(ACME),
            Param::from(ACME),
            Param::from("system"),
            Param::from(50_000_i64),
        ]
    );

    let log = harness.log(ACME);
    assert_eq!(log.matches("stage completed").count(), 5);
    for stage in Stage::CSV {
        assert!(
            log.contains(&format!("stage completed stage={stage}")),
            "missing marker for {stage} in:\n{log}"
        );
    }
    assert!(log.contains("agreement 42"));
    assert!(log.contains("moved to outbox"));
    assert_eq!(
        report.run.stage(Stage::Resolve),
        Some(&StageRecord::Succeeded(
            "agreement 42 procedure load_delivery".to_string()
        ))
    );
    assert_eq!(harness.metrics.delivery_count("csv", "succeeded"), 1);
    assert_eq!(harness.metrics.stage_count("trigger", "completed"), 1);
    Ok(())
}

#[tokio::test]
async fn non_empty_stage_results_are_written_to_the_log() -> Result<()> {
    let harness = Harness::new(
        MemoryStorage::new().with_file(ACME, b"1,2\n"),
        RecordingOperations::new().with_agreement(42).responding(
            "delivery_validate",
            vec![Record::from_pairs([
                ("rejected_rows", json!(3)),
                ("status", json!("warning")),
            ])],
        ),
    )?;

    let report = harness.process(ACME).await?;

    assert_eq!(report.outcome(), Outcome::Succeeded);
    assert_eq!(
        report.run.stage(Stage::Validate),
        Some(&StageRecord::Succeeded("1 row".to_string()))
    );
    let log = harness.log(ACME);
    assert!(log.contains("remote result"), "no result line in:\n{log}");
    assert!(log.contains("rejected_rows=3, status=warning"));
    assert_eq!(log.matches("remote result").count(), 1);
    Ok(())
}

#[tokio::test]
async fn unknown_agreement_stops_after_resolution() -> Result<()> {
    let harness = Harness::new(
        MemoryStorage::new().with_file(ACME, b"1,2\n"),
        RecordingOperations::new(),
    )?;

    let report = harness.process(ACME).await?;

    assert_eq!(report.finalization, Finalization::MovedToOutbox);
    assert_eq!(report.outcome(), Outcome::Failed);
    assert_eq!(harness.ops.procedures(), vec!["agreement_find"]);
    assert_eq!(harness.storage.count("stage_for_load", ACME), 0);
    assert_eq!(harness.storage.count("reclaim_after_load", ACME), 0);
    assert!(harness.storage.outbox_file(ACME).is_some());
    assert_eq!(report.run.stage(Stage::Load), Some(&StageRecord::NotAttempted));

    let log = harness.log(ACME);
    assert!(log.contains("stage failed stage=resolve"));
    assert!(log.contains("no agreement matched"));
    assert!(!log.contains("stage=load"));
    assert!(!log.contains("stage completed"));
    Ok(())
}

#[tokio::test]
async fn a_failed_stage_skips_every_later_stage() -> Result<()> {
    let sequence = [
        "agreement_find",
        "delivery_load",
        "delivery_validate",
        "delivery_publish",
        "delivery_trigger",
    ];
    for failing in 1..sequence.len() {
        let harness = Harness::new(
            MemoryStorage::new().with_file(ACME, b"1,2\n"),
            RecordingOperations::new()
                .with_agreement(42)
                .failing_on(sequence[failing]),
        )?;

        let report = harness.process(ACME).await?;

        assert_eq!(harness.ops.procedures(), sequence[..=failing].to_vec());
        for later in &sequence[failing + 1..] {
            assert_eq!(harness.ops.count(later), 0, "{later} ran after {}", sequence[failing]);
        }
        let (stage, _) = report
            .run
            .failure()
            .ok_or_else(|| anyhow::anyhow!("no failure recorded"))?;
        assert_eq!(stage, Stage::CSV[failing]);
        assert_eq!(report.finalization, Finalization::MovedToOutbox);
        assert_eq!(harness.storage.count("reclaim_after_load", ACME), 1);
    }
    Ok(())
}

#[tokio::test]
async fn reclaim_runs_once_when_load_fails() -> Result<()> {
    let harness = Harness::new(
        MemoryStorage::new().with_file(ACME, b"1,2\n"),
        RecordingOperations::new()
            .with_agreement(42)
            .failing_on("delivery_load"),
    )?;

    let report = harness.process(ACME).await?;

    assert_eq!(harness.storage.count("reclaim_after_load", ACME), 1);
    assert!(harness.storage.load_tier_names().is_empty());
    assert!(matches!(
        report.run.stage(Stage::Load),
        Some(StageRecord::Failed(reason)) if reason.contains("remote operation failed")
    ));
    assert!(harness.log(ACME).contains("load tier reclaimed"));
    assert_eq!(harness.metrics.stage_count("load", "failed"), 1);
    Ok(())
}

#[tokio::test]
async fn staging_failure_skips_load_and_reclaim() -> Result<()> {
    let harness = Harness::new(
        MemoryStorage::new()
            .with_file(ACME, b"1,2\n")
            .failing_on("stage_for_load"),
        RecordingOperations::new().with_agreement(42),
    )?;

    let report = harness.process(ACME).await?;

    assert_eq!(harness.ops.procedures(), vec!["agreement_find"]);
    assert_eq!(harness.storage.count("reclaim_after_load", ACME), 0);
    assert_eq!(report.finalization, Finalization::MovedToOutbox);
    assert!(harness.storage.outbox_file(ACME).is_some());
    Ok(())
}

#[tokio::test]
async fn reclaim_failure_does_not_fail_the_delivery() -> Result<()> {
    let harness = Harness::new(
        MemoryStorage::new()
            .with_file(ACME, b"1,2\n")
            .failing_on("reclaim_after_load"),
        RecordingOperations::new().with_agreement(42),
    )?;

    let report = harness.process(ACME).await?;

    assert_eq!(report.outcome(), Outcome::Succeeded);
    assert_eq!(harness.metrics.stage_count("reclaim", "failed"), 1);
    assert!(harness.log(ACME).contains("load tier reclaim incomplete"));
    Ok(())
}

#[tokio::test]
async fn sql_delivery_submits_the_whole_script_once() -> Result<()> {
    let script = "CREATE TABLE stage.acme (id int);\nINSERT INTO meta.agreement VALUES (42);\n";
    let harness = Harness::new(
        MemoryStorage::new().with_file("addagreement.sql", script.as_bytes()),
        RecordingOperations::new(),
    )?;

    let report = harness.process("addagreement.sql").await?;

    let calls = harness.ops.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].procedure, SCRIPT);
    assert_eq!(calls[0].text, script);
    assert!(calls[0].params.is_empty());
    assert_eq!(report.outcome(), Outcome::Succeeded);
    assert_eq!(report.finalization, Finalization::MovedToOutbox);
    assert!(harness.log("addagreement.sql").contains("stage completed stage=script"));
    Ok(())
}

#[tokio::test]
async fn failing_sql_delivery_is_still_finalized() -> Result<()> {
    let harness = Harness::new(
        MemoryStorage::new().with_file("addagreement.sql", b"CREATE TABLE broken (;"),
        RecordingOperations::new().failing_on(SCRIPT),
    )?;

    let report = harness.process("addagreement.sql").await?;

    assert_eq!(harness.ops.count(SCRIPT), 1);
    assert_eq!(report.outcome(), Outcome::Failed);
    assert_eq!(report.finalization, Finalization::MovedToOutbox);
    assert!(harness.storage.inbox_names().is_empty());
    assert!(harness.log("addagreement.sql").contains("stage failed stage=script"));
    Ok(())
}

#[tokio::test]
async fn unknown_extensions_are_ignored_and_finalized() -> Result<()> {
    let harness = Harness::new(
        MemoryStorage::new().with_file("notes.txt", b"hello"),
        RecordingOperations::new(),
    )?;

    let report = harness.process("notes.txt").await?;

    assert_eq!(report.outcome(), Outcome::Ignored);
    assert!(harness.ops.calls().is_empty());
    assert_eq!(harness.storage.outbox_file("notes.txt"), Some(b"hello".to_vec()));
    assert!(harness.log("notes.txt").contains("ignored"));
    assert_eq!(harness.metrics.delivery_count("ignored", "ignored"), 1);
    Ok(())
}

#[tokio::test]
async fn finalize_failure_leaves_the_delivery_in_the_inbox() -> Result<()> {
    let harness = Harness::new(
        MemoryStorage::new()
            .with_file(ACME, b"1,2\n")
            .failing_on("move_to_outbox"),
        RecordingOperations::new().with_agreement(42),
    )?;

    let report = harness.process(ACME).await?;

    assert!(matches!(report.finalization, Finalization::StuckInInbox(_)));
    assert_eq!(harness.storage.inbox_names(), vec![ACME]);
    assert!(harness.storage.outbox_file(ACME).is_none());
    assert_eq!(harness.metrics.snapshot().delivery_finalize_failures_total, 1);
    assert!(report.log_persisted);
    assert!(harness.log(ACME).contains("finalize failed"));
    Ok(())
}

#[tokio::test]
async fn panicking_stage_is_contained_and_finalized() -> Result<()> {
    let harness = Harness::new(
        MemoryStorage::new()
            .with_file(ACME, b"1,2\n")
            .panicking_on("stage_for_load"),
        RecordingOperations::new().with_agreement(42),
    )?;

    let report = harness.process(ACME).await?;

    assert!(matches!(
        report.run.stage(Stage::Load),
        Some(StageRecord::Failed(reason)) if reason.starts_with("panicked")
    ));
    assert_eq!(report.finalization, Finalization::MovedToOutbox);
    assert!(harness.log(ACME).contains("pipeline panicked"));
    assert!(!harness.sink.is_bound());
    Ok(())
}

#[tokio::test]
async fn sink_is_free_for_the_next_delivery() -> Result<()> {
    let harness = Harness::new(
        MemoryStorage::new()
            .with_file("a.csv", b"1\n")
            .with_file("b.txt", b"2\n"),
        RecordingOperations::new().with_agreement(7),
    )?;

    harness.process("a.csv").await?;
    harness.process("b.txt").await?;

    assert!(harness.log("a.csv").contains("agreement 7"));
    assert!(!harness.log("b.txt").contains("agreement 7"));
    assert!(!harness.log("a.csv").contains("b.txt"));
    Ok(())
}

#[tokio::test]
async fn local_round_trip_is_byte_identical() -> Result<()> {
    init_audit_capture();
    let fixture = LocalFixture::new()?;
    let payload = csv_payload(50_000);
    fixture.deliver(ACME, &payload)?;

    let storage: Arc<dyn StorageProvider> = Arc::new(fixture.storage());
    let ops = Arc::new(RecordingOperations::new().with_agreement(42));
    let pipeline = Pipeline::new(
        storage.clone(),
        Procedures::new(ops.clone()),
        Metrics::new()?,
        "system",
    );
    let sink = SharedAuditSink::new(storage.clone());
    let file: DeliveryFile = storage
        .list_inbox()
        .await
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("delivery not listed"))?;

    let report = pipeline.process(file.clone(), &sink).await;

    assert_eq!(report.finalization, Finalization::MovedToOutbox);
    assert!(!fixture.inbox_contains(ACME));
    assert_eq!(fixture.read_outbox(ACME)?, payload);
    let log = String::from_utf8(fixture.read_outbox("acme_20240101.csv.log")?)?;
    assert_eq!(log.matches("stage completed").count(), 5);
    assert_eq!(storage.read_log(&file).await?, log.into_bytes());
    assert_eq!(
        ops.calls()[1].params[0],
        Param::from(fixture.inbox().join(ACME).to_string_lossy().into_owned())
    );
    Ok(())
}
