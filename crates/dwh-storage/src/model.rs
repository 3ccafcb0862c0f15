//! File descriptors shared by every backend.

use serde::Serialize;

/// Suffix appended to a delivery name to form its audit log name.
pub const LOG_SUFFIX: &str = ".log";

/// One inbox entry as observed by the latest listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DeliveryFile {
    /// File name, including extension.
    pub name: String,
    /// Location handed to the bulk loader: a filesystem path for the local
    /// backend, the object name inside the load container for the cloud backend.
    pub path: String,
    /// Size in bytes at listing time.
    pub size: u64,
}

impl DeliveryFile {
    /// Construct a descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            size,
        }
    }

    /// Name of the audit log persisted next to this file in the outbox.
    #[must_use]
    pub fn log_name(&self) -> String {
        log_name(&self.name)
    }
}

/// Audit log name for a delivery called `name`.
#[must_use]
pub fn log_name(name: &str) -> String {
    format!("{name}{LOG_SUFFIX}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_name_appends_suffix() {
        let file = DeliveryFile::new("acme_20240101.csv", "acme_20240101.csv", 50_000);
        assert_eq!(file.log_name(), "acme_20240101.csv.log");
    }
}
