//! Two-tier cloud backend: a hierarchical file share for the inbox and outbox, and a
//! flat blob container that the bulk loader reads from.
//!
//! # Design
//! - Every tier move is a server-side copy polled by [`CopyPoller`], followed by a
//!   delete of the source once the copy is confirmed.
//! - Reclaim is best effort: each loader artifact is attempted, failures are logged and
//!   the last one is returned after the original's blob has been removed.
//! - Listing failures degrade to whatever pages were already gathered; for reclaim the
//!   listed artifacts are still returned and the listing error is reported.
//! - A move that fails after its copy started removes the destination again, so a file
//!   never ends up in both places and a failed staging leaves the load tier empty.

use async_trait::async_trait;
use dwh_config::CopyPolicy;
use dwh_telemetry::Metrics;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::cloud::listing::{
    ListedFile, ListingPage, parse_blob_listing, parse_directory_listing,
};
use crate::cloud::rest::{
    MAX_RANGE_BYTES, RestClient, blob_listing_url, child_url, directory_listing_url, redact,
};
use crate::copy::CopyPoller;
use crate::error::{StorageError, StorageResult};
use crate::model::{DeliveryFile, log_name};
use crate::provider::StorageProvider;

/// Locations addressed by the two-tier backend.
#[derive(Debug, Clone)]
pub struct TwoTierLocations {
    /// File-share directory holding incoming deliveries.
    pub inbox: Url,
    /// File-share directory receiving finalised deliveries and logs.
    pub outbox: Url,
    /// Blob container the bulk loader reads from.
    pub blob: Url,
}

/// Storage provider over a file share and a blob container.
#[derive(Debug, Clone)]
pub struct TwoTierStorage {
    client: RestClient,
    locations: TwoTierLocations,
    poller: CopyPoller,
    metrics: Option<Metrics>,
}

impl TwoTierStorage {
    /// Build the backend.
    #[must_use]
    pub fn new(client: RestClient, locations: TwoTierLocations, copy: CopyPolicy) -> Self {
        Self {
            client,
            locations,
            poller: CopyPoller::new(copy.poll_interval, copy.timeout),
            metrics: None,
        }
    }

    /// Count copy outcomes in `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn inbox_file(&self, name: &str) -> StorageResult<Url> {
        child_url(&self.locations.inbox, name)
    }

    fn outbox_file(&self, name: &str) -> StorageResult<Url> {
        child_url(&self.locations.outbox, name)
    }

    fn blob(&self, name: &str) -> StorageResult<Url> {
        child_url(&self.locations.blob, name)
    }

    async fn copy(
        &self,
        operation: &'static str,
        name: &str,
        source: &Url,
        destination: &Url,
    ) -> StorageResult<()> {
        debug!(
            file = name,
            source = %redact(source),
            destination = %redact(destination),
            "starting copy"
        );
        let initial = self.client.start_copy(destination, source, operation).await?;
        let outcome = self
            .poller
            .wait(initial, || self.client.copy_status(destination, operation))
            .await;
        if let (Ok(outcome), Some(metrics)) = (&outcome, &self.metrics) {
            metrics.inc_copy_task(outcome.label());
        }
        let result = outcome.and_then(|outcome| outcome.into_result(operation, name));
        if result.is_err() {
            self.discard(destination, operation, name).await;
        }
        result
    }

    /// Best-effort removal of a copy destination that must not survive a failed move.
    async fn discard(&self, target: &Url, operation: &'static str, name: &str) {
        match self.client.delete(target, operation).await {
            Ok(()) => info!(file = name, target = %redact(target), "incomplete copy discarded"),
            Err(err) => warn!(
                file = name,
                target = %redact(target),
                error = ?err,
                "incomplete copy could not be discarded"
            ),
        }
    }

    /// Names under `prefix`, plus the error that interrupted paging, if any.
    async fn list_blobs(&self, prefix: &str) -> (Vec<String>, Option<StorageError>) {
        let mut names = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let url = blob_listing_url(&self.locations.blob, prefix, marker.as_deref());
            let page = match self.blob_page(&url).await {
                Ok(page) => page,
                Err(err) => return (names, Some(err)),
            };
            names.extend(page.items);
            match page.next_marker {
                Some(next) => marker = Some(next),
                None => return (names, None),
            }
        }
    }

    async fn blob_page(&self, url: &Url) -> StorageResult<ListingPage<String>> {
        let xml = self.client.get_text(url, "list_blobs").await?;
        parse_blob_listing(&xml)
    }

    async fn return_artifact(&self, name: &str) -> StorageResult<()> {
        let source = self.blob(name)?;
        let destination = self.inbox_file(name)?;
        self.copy("reclaim_after_load", name, &source, &destination)
            .await?;
        self.client.delete(&source, "reclaim_after_load").await
    }

    async fn inbox_page(&self, url: &Url) -> StorageResult<ListingPage<ListedFile>> {
        let xml = self.client.get_text(url, "list_inbox").await?;
        parse_directory_listing(&xml)
    }

    async fn read_share_file(&self, url: &Url, operation: &'static str) -> StorageResult<Vec<u8>> {
        let length = self.client.content_length(url, operation).await?;
        self.client.download(url, length, operation).await
    }
}

#[async_trait]
impl StorageProvider for TwoTierStorage {
    fn backend_name(&self) -> &'static str {
        "two_tier"
    }

    async fn list_inbox(&self) -> Vec<DeliveryFile> {
        let mut files = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let url = directory_listing_url(&self.locations.inbox, marker.as_deref());
            let page = match self.inbox_page(&url).await {
                Ok(page) => page,
                Err(err) => {
                    warn!(
                        inbox = %redact(&self.locations.inbox),
                        gathered = files.len(),
                        error = ?err,
                        "inbox listing interrupted; continuing with partial list"
                    );
                    break;
                }
            };
            files.extend(
                page.items
                    .into_iter()
                    .map(|item| DeliveryFile::new(item.name.clone(), item.name, item.size)),
            );
            match page.next_marker {
                Some(next) => marker = Some(next),
                None => break,
            }
        }
        debug!(count = files.len(), "inbox listed");
        files
    }

    async fn read_file(&self, file: &DeliveryFile) -> StorageResult<Vec<u8>> {
        let url = self.inbox_file(&file.name)?;
        self.read_share_file(&url, "read_file").await
    }

    async fn stage_for_load(&self, file: &DeliveryFile) -> StorageResult<()> {
        let source = self.inbox_file(&file.name)?;
        let destination = self.blob(&file.path)?;
        self.copy("stage_for_load", &file.name, &source, &destination)
            .await?;
        info!(file = %file.name, "staged into load tier");
        Ok(())
    }

    async fn reclaim_after_load(&self, file: &DeliveryFile) -> StorageResult<()> {
        let prefix = format!("{}.", file.path);
        let mut last_error = None;

        let (artifacts, interrupted) = self.list_blobs(&prefix).await;
        if let Some(err) = interrupted {
            warn!(
                file = %file.name,
                listed = artifacts.len(),
                error = ?err,
                "loader artifact listing interrupted; returning what was listed"
            );
            last_error = Some(err);
        }

        for artifact in artifacts {
            match self.return_artifact(&artifact).await {
                Ok(()) => info!(
                    file = %file.name,
                    artifact = %artifact,
                    "loader artifact returned to inbox"
                ),
                Err(err) => {
                    warn!(
                        file = %file.name,
                        artifact = %artifact,
                        error = ?err,
                        "loader artifact could not be returned"
                    );
                    last_error = Some(err);
                }
            }
        }

        let staged = self.blob(&file.path)?;
        if let Err(err) = self.client.delete(&staged, "reclaim_after_load").await {
            warn!(file = %file.name, error = ?err, "staged copy could not be deleted");
            last_error = Some(err);
        }

        last_error.map_or(Ok(()), Err)
    }

    async fn move_to_outbox(&self, file: &DeliveryFile) -> StorageResult<()> {
        let source = self.inbox_file(&file.name)?;
        let destination = self.outbox_file(&file.name)?;
        self.copy("move_to_outbox", &file.name, &source, &destination)
            .await?;
        if let Err(err) = self.client.delete(&source, "move_to_outbox").await {
            error!(
                file = %file.name,
                error = ?err,
                "inbox copy could not be removed; withdrawing the outbox copy"
            );
            self.discard(&destination, "move_to_outbox", &file.name).await;
            return Err(err);
        }
        info!(file = %file.name, "moved to outbox");
        Ok(())
    }

    async fn write_log(&self, name: &str, contents: &[u8]) -> StorageResult<()> {
        let url = self.outbox_file(&log_name(name))?;
        self.client
            .create_file(&url, contents.len() as u64, "write_log")
            .await?;
        let mut offset = 0_u64;
        for chunk in contents.chunks(MAX_RANGE_BYTES) {
            self.client
                .put_range(&url, offset, chunk, "write_log")
                .await?;
            offset += chunk.len() as u64;
        }
        Ok(())
    }

    async fn read_log(&self, file: &DeliveryFile) -> StorageResult<Vec<u8>> {
        let url = self.outbox_file(&file.log_name())?;
        self.read_share_file(&url, "read_log").await
    }
}
