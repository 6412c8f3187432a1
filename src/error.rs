//! Error types for feedvault
//!
//! This module provides the error taxonomy for the crate:
//! - Fatal startup errors (configuration, progress storage)
//! - Recoverable per-channel fetch errors ([`FetchError`])
//!
//! Fatal errors abort startup before the runner starts; everything that can
//! go wrong during a backup cycle is caught at the channel-fetch boundary
//! and logged, never propagated out of the runner.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for feedvault operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for feedvault
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "base_url")
        key: Option<String>,
    },

    /// Progress storage is unreadable or unwritable
    ///
    /// Fatal at startup: without the watermark the service cannot determine
    /// a safe incremental window.
    #[error("progress storage error at {path}: {reason}")]
    Storage {
        /// Location of the progress record
        path: PathBuf,
        /// The reason the record could not be read or written
        reason: String,
    },

    /// A single channel fetch failed (non-fatal to the enclosing cycle)
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error with an associated key
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

/// Errors from a single feed download
///
/// All variants are recoverable: the backup cycle logs them and moves on to
/// the next channel.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Destination file could not be created
    #[error("cannot create {path}: {source}")]
    CreateFailed {
        /// The destination path that could not be created
        path: PathBuf,
        /// The underlying I/O error
        source: std::io::Error,
    },

    /// The GET request failed before a response arrived
    #[error("request to {url} failed: {source}")]
    RequestFailed {
        /// The request URL
        url: String,
        /// The underlying transport error
        source: reqwest::Error,
    },

    /// The server answered with a non-success status
    #[error("{url} returned HTTP {status}")]
    Status {
        /// The request URL
        url: String,
        /// The HTTP status code returned by the server
        status: u16,
    },

    /// I/O error while streaming the body to disk
    #[error("write to {path} failed after {bytes_written} bytes: {reason}")]
    CopyFailed {
        /// The destination path being written
        path: PathBuf,
        /// Bytes successfully written before the failure
        bytes_written: u64,
        /// The reason the copy failed
        reason: String,
    },
}
