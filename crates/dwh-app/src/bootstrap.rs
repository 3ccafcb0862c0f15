use std::future::Future;
use std::sync::Arc;

use dwh_config::{DaemonConfig, LogOutput};
use dwh_data::{PgOperations, Procedures, RemoteOperations};
use dwh_ingest::{Pipeline, PollScheduler};
use dwh_storage::{StorageProvider, build_storage};
use dwh_telemetry::{LogFormat, LoggingConfig, Metrics, build_sha, init_logging};
use tracing::{error, info, warn};

use crate::error::{AppError, AppResult};

/// Fully wired daemon ready to poll.
pub(crate) struct Daemon {
    scheduler: PollScheduler,
}

impl Daemon {
    /// Wire the pipeline and scheduler over already constructed collaborators.
    pub(crate) fn new(
        config: &DaemonConfig,
        ops: Arc<dyn RemoteOperations>,
        storage: Arc<dyn StorageProvider>,
        metrics: Metrics,
    ) -> Self {
        let pipeline = Pipeline::new(
            Arc::clone(&storage),
            Procedures::new(ops),
            metrics.clone(),
            config.load_owner.clone(),
        );
        Self {
            scheduler: PollScheduler::new(
                storage,
                pipeline,
                metrics,
                config.workers,
                config.poll_interval,
            ),
        }
    }

    /// Poll until `shutdown` resolves. A cycle in flight is abandoned; its deliveries
    /// stay in the inbox and are picked up again on the next start.
    pub(crate) async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            () = self.scheduler.run() => {}
            () = shutdown => info!("shutdown signal received"),
        }
    }
}

/// Entry point for the daemon boot sequence.
///
/// # Errors
///
/// Returns an error when configuration is invalid, logging cannot be installed, the
/// database is unreachable or the storage backend cannot be built. All are fatal.
pub async fn run_app() -> AppResult<()> {
    let config =
        DaemonConfig::from_env().map_err(|err| AppError::config("config.from_env", err))?;
    init_logging(&logging_config(&config))
        .map_err(|err| AppError::telemetry("telemetry.init", err))?;

    info!(
        backend = config.backend.label(),
        workers = config.workers,
        poll_interval_secs = config.poll_interval.as_secs(),
        "delivery daemon starting"
    );

    let metrics = Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
    let max_connections = u32::try_from(config.workers.saturating_add(1)).unwrap_or(u32::MAX);
    let ops = PgOperations::connect(
        config.database_url.expose(),
        max_connections,
        config.request_timeout,
    )
    .await
    .map_err(|err| AppError::data("database.connect", err))?;
    info!("warehouse database connected");

    let storage =
        build_storage(&config, &metrics).map_err(|err| AppError::storage("storage.build", err))?;

    let daemon = Daemon::new(&config, Arc::new(ops), storage, metrics.clone());
    daemon.run_until(shutdown_signal()).await;
    log_final_metrics(&metrics);
    info!("delivery daemon stopped");
    Ok(())
}

fn log_final_metrics(metrics: &Metrics) {
    match metrics.render() {
        Ok(exposition) => info!(metrics = %exposition, "final metrics"),
        Err(err) => warn!(error = ?err, "final metrics could not be rendered"),
    }
}

fn logging_config(config: &DaemonConfig) -> LoggingConfig<'_> {
    LoggingConfig {
        level: &config.logging.level,
        format: log_format(config.logging.format),
        build_sha: build_sha(),
    }
}

const fn log_format(output: Option<LogOutput>) -> LogFormat {
    match output {
        Some(LogOutput::Json) => LogFormat::Json,
        Some(LogOutput::Pretty) => LogFormat::Pretty,
        None => LogFormat::infer(),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal; running until killed");
        std::future::pending::<()>().await;
    }
}
