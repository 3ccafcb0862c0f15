//! Storage capability shared by the local and cloud backends.

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::model::DeliveryFile;

/// Uniform access to the inbox, outbox and load tier of one deployment.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Short backend label for logs.
    fn backend_name(&self) -> &'static str;

    /// List the current inbox contents.
    ///
    /// Listing never fails a poll cycle: a missing inbox yields an empty list and
    /// errors part-way through are logged, returning what was gathered so far.
    async fn list_inbox(&self) -> Vec<DeliveryFile>;

    /// Fetch the full content of an inbox file.
    async fn read_file(&self, file: &DeliveryFile) -> StorageResult<Vec<u8>>;

    /// Make the file readable by the bulk loader; blocks until any copy settles.
    async fn stage_for_load(&self, file: &DeliveryFile) -> StorageResult<()>;

    /// Return loader artifacts to the inbox and empty the load tier for this file.
    ///
    /// Best effort: every artifact is attempted and the last error is returned.
    async fn reclaim_after_load(&self, file: &DeliveryFile) -> StorageResult<()>;

    /// Move the file from the inbox to the outbox.
    async fn move_to_outbox(&self, file: &DeliveryFile) -> StorageResult<()>;

    /// Persist `<name>.log` into the outbox, replacing any previous log.
    async fn write_log(&self, name: &str, contents: &[u8]) -> StorageResult<()>;

    /// Read back the audit log persisted for `file`.
    async fn read_log(&self, file: &DeliveryFile) -> StorageResult<Vec<u8>>;
}
