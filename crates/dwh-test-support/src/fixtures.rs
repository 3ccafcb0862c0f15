//! Test fixtures: temporary inbox/outbox roots and deterministic payloads.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dwh_data::Record;
use dwh_storage::LocalStorage;
use serde_json::Value;
use tempfile::TempDir;

/// Temporary inbox and outbox directories removed on drop.
pub struct LocalFixture {
    _root: TempDir,
    inbox: PathBuf,
    outbox: PathBuf,
}

impl LocalFixture {
    /// Create a root with an empty inbox; the outbox is left for the provider to create.
    ///
    /// # Errors
    ///
    /// Returns an error when the temporary directory cannot be created.
    pub fn new() -> Result<Self> {
        let root = tempfile::tempdir().context("failed to create fixture root")?;
        let inbox = root.path().join("inbox");
        let outbox = root.path().join("outbox");
        fs::create_dir_all(&inbox).context("failed to create fixture inbox")?;
        Ok(Self {
            _root: root,
            inbox,
            outbox,
        })
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

    /// Local storage provider over this fixture.
    #[must_use]
    pub fn storage(&self) -> LocalStorage {
        LocalStorage::new(&self.inbox, &self.outbox)
    }

    /// Drop a delivery into the inbox.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be written.
    pub fn deliver(&self, name: &str, contents: &[u8]) -> Result<()> {
        fs::write(self.inbox.join(name), contents)
            .with_context(|| format!("failed to write inbox file {name}"))
    }

    /// Read a file from the outbox.
    ///
    /// # Errors
    ///
    /// Returns an error when the file is absent or unreadable.
    pub fn read_outbox(&self, name: &str) -> Result<Vec<u8>> {
        fs::read(self.outbox.join(name)).with_context(|| format!("outbox file {name} missing"))
    }

    /// Whether the inbox still holds `name`.
    #[must_use]
    pub fn inbox_contains(&self, name: &str) -> bool {
        self.inbox.join(name).exists()
    }
}

/// Deterministic CSV bytes of exactly `len` bytes.
#[must_use]
pub fn csv_payload(len: usize) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(len);
    let mut row = 0_u64;
    while bytes.len() < len {
        bytes.extend_from_slice(format!("{row},acme,{}\n", row * 7).as_bytes());
        row += 1;
    }
    bytes.truncate(len);
    bytes
}

/// Row returned by `agreement_find` for agreement `id`.
#[must_use]
pub fn agreement_row(id: i64) -> Record {
    Record::from_pairs([
        ("agreement_id", Value::from(id)),
        ("procedure", Value::from("load_delivery")),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_payload_has_exact_length() {
        assert_eq!(csv_payload(50_000).len(), 50_000);
        assert!(csv_payload(0).is_empty());
    }

    #[test]
    fn fixture_round_trips_files() -> Result<()> {
        let fixture = LocalFixture::new()?;
        fixture.deliver("a.csv", b"1,2\n")?;
        assert!(fixture.inbox_contains("a.csv"));
        assert!(fixture.read_outbox("a.csv").is_err());
        Ok(())
    }

    #[test]
    fn agreement_row_exposes_identifier() {
        assert_eq!(agreement_row(42).get_i64("agreement_id"), Some(42));
    }
}
