//! XML enumeration responses for directory and blob listings.

use serde::Deserialize;
use serde::de::IgnoredAny;

use crate::error::{StorageError, StorageResult};

/// One page of a paged listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingPage<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Continuation marker; `None` when this is the last page.
    pub next_marker: Option<String>,
}

/// A file entry from a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedFile {
    /// File name.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
}

#[derive(Debug, Deserialize)]
struct DirectoryListing {
    #[serde(rename = "Entries", default)]
    entries: DirectoryEntries,
    #[serde(rename = "NextMarker", default)]
    next_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DirectoryEntries {
    #[serde(rename = "$value", default)]
    items: Vec<DirectoryEntry>,
}

#[derive(Debug, Deserialize)]
enum DirectoryEntry {
    File(FileEntry),
    Directory(IgnoredAny),
}

#[derive(Debug, Deserialize)]
struct FileEntry {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Properties", default)]
    properties: FileProperties,
}

#[derive(Debug, Default, Deserialize)]
struct FileProperties {
    #[serde(rename = "Content-Length", default)]
    content_length: u64,
}

#[derive(Debug, Deserialize)]
struct NamedEntry {
    #[serde(rename = "Name")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct BlobListing {
    #[serde(rename = "Blobs", default)]
    blobs: Blobs,
    #[serde(rename = "NextMarker", default)]
    next_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Blobs {
    #[serde(rename = "Blob", default)]
    items: Vec<NamedEntry>,
}

/// Parse a directory listing page, keeping files and dropping sub-directories.
///
/// # Errors
///
/// Returns [`StorageError::Listing`] when the document is not a valid enumeration.
pub fn parse_directory_listing(xml: &str) -> StorageResult<ListingPage<ListedFile>> {
    let listing: DirectoryListing =
        quick_xml::de::from_str(strip_bom(xml)).map_err(|source| StorageError::Listing {
            operation: "list_inbox",
            source,
        })?;
    let items = listing
        .entries
        .items
        .into_iter()
        .filter_map(|entry| match entry {
            DirectoryEntry::File(file) => Some(ListedFile {
                name: file.name,
                size: file.properties.content_length,
            }),
            DirectoryEntry::Directory(_) => None,
        })
        .collect();
    Ok(ListingPage {
        items,
        next_marker: normalise_marker(listing.next_marker),
    })
}

/// Parse a blob listing page into blob names.
///
/// # Errors
///
/// Returns [`StorageError::Listing`] when the document is not a valid enumeration.
pub fn parse_blob_listing(xml: &str) -> StorageResult<ListingPage<String>> {
    let listing: BlobListing =
        quick_xml::de::from_str(strip_bom(xml)).map_err(|source| StorageError::Listing {
            operation: "list_blobs",
            source,
        })?;
    Ok(ListingPage {
        items: listing.blobs.items.into_iter().map(|blob| blob.name).collect(),
        next_marker: normalise_marker(listing.next_marker),
    })
}

fn strip_bom(xml: &str) -> &str {
    xml.trim_start_matches('\u{feff}')
}

fn normalise_marker(marker: Option<String>) -> Option<String> {
    marker
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
