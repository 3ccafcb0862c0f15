//! Backend selection from daemon configuration.

use std::sync::Arc;

use dwh_config::{DaemonConfig, StorageBackend};
use dwh_telemetry::Metrics;
use tracing::info;

use crate::cloud::rest::{RestClient, redact};
use crate::cloud::two_tier::{TwoTierLocations, TwoTierStorage};
use crate::error::StorageResult;
use crate::local::LocalStorage;
use crate::provider::StorageProvider;

/// Build the storage provider selected by `config`.
///
/// # Errors
///
/// Returns an error when the cloud HTTP client cannot be constructed.
pub fn build_storage(
    config: &DaemonConfig,
    metrics: &Metrics,
) -> StorageResult<Arc<dyn StorageProvider>> {
    match &config.backend {
        StorageBackend::Local { inbox, outbox } => {
            info!(
                inbox = %inbox.display(),
                outbox = %outbox.display(),
                "using local storage"
            );
            Ok(Arc::new(LocalStorage::new(inbox, outbox)))
        }
        StorageBackend::TwoTier {
            inbox,
            outbox,
            blob,
        } => {
            info!(
                inbox = %redact(inbox),
                outbox = %redact(outbox),
                blob = %redact(blob),
                "using two-tier cloud storage"
            );
            let client = RestClient::new(config.request_timeout)?;
            let locations = TwoTierLocations {
                inbox: inbox.clone(),
                outbox: outbox.clone(),
                blob: blob.clone(),
            };
            Ok(Arc::new(
                TwoTierStorage::new(client, locations, config.copy).with_metrics(metrics.clone()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use dwh_config::{ConnectionString, CopyPolicy, LogSettings};

    fn config(backend: StorageBackend) -> DaemonConfig {
        DaemonConfig {
            backend,
            database_url: ConnectionString::new("postgres://dwh@localhost/dwh".to_string()),
            poll_interval: Duration::from_secs(60),
            copy: CopyPolicy {
                poll_interval: Duration::from_millis(500),
                timeout: Duration::from_secs(30),
            },
            request_timeout: Duration::from_secs(10),
            workers: 1,
            load_owner: "system".to_string(),
            logging: LogSettings {
                level: "info".to_string(),
                format: None,
            },
        }
    }

    #[test]
    fn local_backend_builds_directory_storage() -> anyhow::Result<()> {
        let config = config(StorageBackend::Local {
            inbox: "/srv/dwh/inbox".into(),
            outbox: "/srv/dwh/outbox".into(),
        });
        let storage = build_storage(&config, &Metrics::new()?)?;
        assert_eq!(storage.backend_name(), "local");
        Ok(())
    }

    #[test]
    fn two_tier_backend_builds_cloud_storage() -> anyhow::Result<()> {
        let config = config(StorageBackend::TwoTier {
            inbox: "https://acct.file.example/share/inbox?sig=x".parse()?,
            outbox: "https://acct.file.example/share/outbox?sig=x".parse()?,
            blob: "https://acct.blob.example/load?sig=x".parse()?,
        });
        let storage = build_storage(&config, &Metrics::new()?)?;
        assert_eq!(storage.backend_name(), "two_tier");
        Ok(())
    }
}
