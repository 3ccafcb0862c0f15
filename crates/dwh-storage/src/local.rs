//! Local filesystem backend.
//!
//! # Design
//! - The inbox doubles as the load tier, so staging and reclaim are no-ops.
//! - Finalisation is a rename; a cross-device move falls back to copy then remove.
//! - Listing creates a missing inbox and skips entries it cannot inspect.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::{StorageError, StorageResult};
use crate::model::{DeliveryFile, log_name};
use crate::provider::StorageProvider;

/// Storage provider over two local directories.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    inbox: PathBuf,
    outbox: PathBuf,
}

impl LocalStorage {
    /// Build a provider for the given inbox and outbox directories.
    #[must_use]
    pub fn new(inbox: impl Into<PathBuf>, outbox: impl Into<PathBuf>) -> Self {
        Self {
            inbox: inbox.into(),
            outbox: outbox.into(),
        }
    }

    /// Inbox directory.
    #[must_use]
    pub fn inbox(&self) -> &Path {
        &self.inbox
    }

    /// Outbox directory.
    #[must_use]
    pub fn outbox(&self) -> &Path {
        &self.outbox
    }

    async fn ensure_outbox(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.outbox)
            .await
            .map_err(|source| StorageError::io("create_outbox", &self.outbox, source))
    }

    async fn collect_entries(&self, files: &mut Vec<DeliveryFile>) -> io::Result<()> {
        let mut entries = fs::read_dir(&self.inbox).await?;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(err) => {
                    warn!(path = %entry.path().display(), error = %err, "skipping unreadable inbox entry");
                    continue;
                }
            };
            if !metadata.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                warn!(path = %entry.path().display(), "skipping inbox entry with non utf-8 name");
                continue;
            };
            let path = entry.path().to_string_lossy().into_owned();
            files.push(DeliveryFile::new(name, path, metadata.len()));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageProvider for LocalStorage {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    async fn list_inbox(&self) -> Vec<DeliveryFile> {
        if let Err(err) = fs::create_dir_all(&self.inbox).await {
            warn!(inbox = %self.inbox.display(), error = %err, "inbox unavailable");
            return Vec::new();
        }
        let mut files = Vec::new();
        if let Err(err) = self.collect_entries(&mut files).await {
            warn!(
                inbox = %self.inbox.display(),
                gathered = files.len(),
                error = %err,
                "inbox listing interrupted; continuing with partial list"
            );
        }
        files.sort_by(|left, right| left.name.cmp(&right.name));
        debug!(count = files.len(), "inbox listed");
        files
    }

    async fn read_file(&self, file: &DeliveryFile) -> StorageResult<Vec<u8>> {
        let path = self.inbox.join(&file.name);
        fs::read(&path)
            .await
            .map_err(|source| StorageError::io("read_file", path, source))
    }

    async fn stage_for_load(&self, _file: &DeliveryFile) -> StorageResult<()> {
        Ok(())
    }

    async fn reclaim_after_load(&self, _file: &DeliveryFile) -> StorageResult<()> {
        Ok(())
    }

    async fn move_to_outbox(&self, file: &DeliveryFile) -> StorageResult<()> {
        self.ensure_outbox().await?;
        let source = self.inbox.join(&file.name);
        let target = self.outbox.join(&file.name);
        match fs::rename(&source, &target).await {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::CrossesDevices => {
                copy_then_remove(&source, &target).await?;
            }
            Err(err) => return Err(StorageError::io("move_to_outbox", source, err)),
        }
        info!(file = %file.name, outbox = %self.outbox.display(), "moved to outbox");
        Ok(())
    }

    async fn write_log(&self, name: &str, contents: &[u8]) -> StorageResult<()> {
        self.ensure_outbox().await?;
        let path = self.outbox.join(log_name(name));
        fs::write(&path, contents)
            .await
            .map_err(|source| StorageError::io("write_log", path, source))
    }

    async fn read_log(&self, file: &DeliveryFile) -> StorageResult<Vec<u8>> {
        let path = self.outbox.join(file.log_name());
        fs::read(&path)
            .await
            .map_err(|source| StorageError::io("read_log", path, source))
    }
}

/// Copy `source` to `target` and remove `source`. Any failure removes `target` again so
/// the file is only ever left at `source`.
async fn copy_then_remove(source: &Path, target: &Path) -> StorageResult<()> {
    let result = match fs::copy(source, target).await {
        Ok(_) => fs::remove_file(source)
            .await
            .map_err(|err| StorageError::io("move_to_outbox", source, err)),
        Err(err) => Err(StorageError::io("move_to_outbox", target, err)),
    };
    if result.is_err() {
        match fs::remove_file(target).await {
            Ok(()) => debug!(target = %target.display(), "partial outbox copy removed"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(
                target = %target.display(),
                error = %err,
                "partial outbox copy could not be removed"
            ),
        }
    }
    result
}
