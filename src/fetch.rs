//! Single-feed HTTP download
//!
//! The fetcher performs one GET and streams the response body to a
//! destination file, reporting the byte count. It holds a shared
//! [`reqwest::Client`] so connections are reused across channels and
//! cycles.
//!
//! Unlike the service this replaces, a non-success HTTP status is treated
//! as a failed fetch rather than silently writing the error body to the
//! backup file. The status is checked before the destination is opened, so
//! a failed fetch never leaves an empty or truncated file behind.

use crate::error::FetchError;
use futures::StreamExt;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Downloads one feed export to a local file
#[derive(Clone, Debug, Default)]
pub struct FeedFetcher {
    client: reqwest::Client,
}

impl FeedFetcher {
    /// Create a fetcher with a fresh HTTP client
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fetcher around an existing client (custom timeouts, proxies)
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// GET `url` and stream the body to `dest`, truncating any existing file
    ///
    /// Returns the number of bytes written. Fails on connection errors, a
    /// non-success HTTP status, an uncreatable destination, or an I/O error
    /// mid-copy. All failures are non-fatal to the enclosing backup cycle.
    pub async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        debug!(url, dest = %dest.display(), "Downloading feed");

        let response =
            self.client
                .get(url)
                .send()
                .await
                .map_err(|e| FetchError::RequestFailed {
                    url: url.to_string(),
                    source: e,
                })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let mut output =
            tokio::fs::File::create(dest)
                .await
                .map_err(|e| FetchError::CreateFailed {
                    path: dest.to_path_buf(),
                    source: e,
                })?;

        let mut bytes_written: u64 = 0;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| FetchError::CopyFailed {
                path: dest.to_path_buf(),
                bytes_written,
                reason: e.to_string(),
            })?;
            output
                .write_all(&chunk)
                .await
                .map_err(|e| FetchError::CopyFailed {
                    path: dest.to_path_buf(),
                    bytes_written,
                    reason: e.to_string(),
                })?;
            bytes_written += chunk.len() as u64;
        }
        output.flush().await.map_err(|e| FetchError::CopyFailed {
            path: dest.to_path_buf(),
            bytes_written,
            reason: e.to_string(),
        })?;

        info!(dest = %dest.display(), bytes = bytes_written, "Feed downloaded");
        Ok(bytes_written)
    }
}
