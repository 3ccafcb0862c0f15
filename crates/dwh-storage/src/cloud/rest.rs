//! Thin REST client for file-share and blob endpoints addressed by SAS URLs.
//!
//! # Design
//! - Every request carries `x-ms-version`; authorisation rides in the SAS query string.
//! - Non-success statuses become [`StorageError::Status`] with the URL redacted.
//! - Child resources are derived by appending a path segment to the configured URL,
//!   which keeps the SAS query intact.

use std::time::Duration;

use reqwest::header::CONTENT_LENGTH;
use reqwest::{Client, RequestBuilder, Response};
use url::Url;

use crate::copy::CopyStatus;
use crate::error::{StorageError, StorageResult};

/// Storage REST API version sent with every request.
pub const API_VERSION: &str = "2021-08-06";

/// Largest body accepted by a single range write.
pub const MAX_RANGE_BYTES: usize = 4 * 1024 * 1024;

/// Page size requested from listing endpoints.
pub const LIST_PAGE_SIZE: u32 = 100;

const HEADER_VERSION: &str = "x-ms-version";
const HEADER_COPY_SOURCE: &str = "x-ms-copy-source";
const HEADER_COPY_STATUS: &str = "x-ms-copy-status";
const HEADER_RANGE: &str = "x-ms-range";
const HEADER_TYPE: &str = "x-ms-type";
const HEADER_FILE_LENGTH: &str = "x-ms-content-length";
const HEADER_WRITE: &str = "x-ms-write";

/// URL of `name` inside the directory or container addressed by `base`.
///
/// # Errors
///
/// Returns [`StorageError::InvalidUrl`] when `base` cannot carry path segments.
pub fn child_url(base: &Url, name: &str) -> StorageResult<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| StorageError::InvalidUrl {
            operation: "child_url",
            url: redact(base),
        })?
        .pop_if_empty()
        .push(name);
    Ok(url)
}

/// Directory listing URL for one page.
#[must_use]
pub fn directory_listing_url(base: &Url, marker: Option<&str>) -> Url {
    let mut url = base.clone();
    url.query_pairs_mut()
        .append_pair("restype", "directory")
        .append_pair("comp", "list")
        .append_pair("maxresults", &LIST_PAGE_SIZE.to_string())
        .append_pair("marker", marker.unwrap_or_default());
    url
}

/// Blob listing URL for one page of names starting with `prefix`.
#[must_use]
pub fn blob_listing_url(container: &Url, prefix: &str, marker: Option<&str>) -> Url {
    let mut url = container.clone();
    url.query_pairs_mut()
        .append_pair("restype", "container")
        .append_pair("comp", "list")
        .append_pair("prefix", prefix)
        .append_pair("maxresults", &LIST_PAGE_SIZE.to_string())
        .append_pair("marker", marker.unwrap_or_default());
    url
}

/// URL without its query string, safe for logs and errors.
#[must_use]
pub fn redact(url: &Url) -> String {
    let mut clean = url.clone();
    clean.set_query(None);
    clean.set_fragment(None);
    clean.to_string()
}

/// HTTP client speaking the storage REST dialect.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: Client,
}

impl RestClient {
    /// Build a client whose requests time out after `request_timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Client`] when the TLS backend cannot be initialised.
    pub fn new(request_timeout: Duration) -> StorageResult<Self> {
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|source| StorageError::Client { source })?;
        Ok(Self { http })
    }

    /// Fetch a listing page as text.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success status.
    pub async fn get_text(&self, url: &Url, operation: &'static str) -> StorageResult<String> {
        let response = self.send(self.http.get(url.clone()), url, operation).await?;
        response.text().await.map_err(|source| StorageError::Http {
            operation,
            url: redact(url),
            source,
        })
    }

    /// Read the content length of a file or blob.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, a non-success status, or a
    /// missing `content-length` header.
    pub async fn content_length(&self, url: &Url, operation: &'static str) -> StorageResult<u64> {
        let response = self.send(self.http.head(url.clone()), url, operation).await?;
        response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse().ok())
            .ok_or(StorageError::MissingHeader {
                operation,
                header: "content-length",
            })
    }

    /// Download exactly `length` bytes from the start of a file.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success status.
    pub async fn download(
        &self,
        url: &Url,
        length: u64,
        operation: &'static str,
    ) -> StorageResult<Vec<u8>> {
        if length == 0 {
            return Ok(Vec::new());
        }
        let request = self
            .http
            .get(url.clone())
            .header(HEADER_RANGE, format!("bytes=0-{}", length - 1));
        let response = self.send(request, url, operation).await?;
        let body = response.bytes().await.map_err(|source| StorageError::Http {
            operation,
            url: redact(url),
            source,
        })?;
        Ok(body.to_vec())
    }

    /// Start a server-side copy of `source` into `destination`.
    ///
    /// # Errors
    ///
    /// Returns an error when the copy cannot be started or the response lacks a
    /// copy status.
    pub async fn start_copy(
        &self,
        destination: &Url,
        source: &Url,
        operation: &'static str,
    ) -> StorageResult<CopyStatus> {
        let request = self
            .http
            .put(destination.clone())
            .header(HEADER_COPY_SOURCE, source.as_str())
            .header(CONTENT_LENGTH, "0");
        let response = self.send(request, destination, operation).await?;
        copy_status_header(&response, operation)
    }

    /// Poll the copy status recorded on `destination`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, a non-success status, or a missing
    /// copy status header.
    pub async fn copy_status(
        &self,
        destination: &Url,
        operation: &'static str,
    ) -> StorageResult<CopyStatus> {
        let response = self
            .send(self.http.head(destination.clone()), destination, operation)
            .await?;
        copy_status_header(&response, operation)
    }

    /// Delete a file or blob.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success status.
    pub async fn delete(&self, url: &Url, operation: &'static str) -> StorageResult<()> {
        self.send(self.http.delete(url.clone()), url, operation)
            .await
            .map(|_| ())
    }

    /// Create (or truncate) a share file of `length` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success status.
    pub async fn create_file(
        &self,
        url: &Url,
        length: u64,
        operation: &'static str,
    ) -> StorageResult<()> {
        let request = self
            .http
            .put(url.clone())
            .header(HEADER_TYPE, "file")
            .header(HEADER_FILE_LENGTH, length.to_string())
            .header(CONTENT_LENGTH, "0");
        self.send(request, url, operation).await.map(|_| ())
    }

    /// Write `chunk` at `offset` into an existing share file.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success status.
    pub async fn put_range(
        &self,
        url: &Url,
        offset: u64,
        chunk: &[u8],
        operation: &'static str,
    ) -> StorageResult<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        let end = offset + chunk.len() as u64 - 1;
        let mut target = url.clone();
        target.query_pairs_mut().append_pair("comp", "range");
        let request = self
            .http
            .put(target.clone())
            .header(HEADER_RANGE, format!("bytes={offset}-{end}"))
            .header(HEADER_WRITE, "update")
            .body(chunk.to_vec());
        self.send(request, &target, operation).await.map(|_| ())
    }

    async fn send(
        &self,
        request: RequestBuilder,
        url: &Url,
        operation: &'static str,
    ) -> StorageResult<Response> {
        let response = request
            .header(HEADER_VERSION, API_VERSION)
            .send()
            .await
            .map_err(|source| StorageError::Http {
                operation,
                url: redact(url),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::Status {
                operation,
                url: redact(url),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

fn copy_status_header(response: &Response, operation: &'static str) -> StorageResult<CopyStatus> {
    response
        .headers()
        .get(HEADER_COPY_STATUS)
        .and_then(|value| value.to_str().ok())
        .map(CopyStatus::parse)
        .ok_or(StorageError::MissingHeader {
            operation,
            header: HEADER_COPY_STATUS,
        })
}
