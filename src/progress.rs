//! Watermark persistence
//!
//! The progress store holds a single record: the timestamp of the last
//! successful backup. It is read once at startup and rewritten after each
//! completed cycle. On the first-ever run the record is seeded to the Unix
//! epoch, which makes the first fetch window cover all history.
//!
//! Saves go through a temp file that is renamed over the record, so a crash
//! mid-write never corrupts the previously valid record. A failed save
//! after a cycle is logged, not fatal: the in-memory watermark still
//! advances, and the next restart simply re-fetches the unsaved window
//! (at-least-once delivery of feed rows across restarts).

use crate::error::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The persisted watermark record
///
/// `last_backup` is monotonically non-decreasing across successful cycles
/// and is advanced only after all channel fetches in a cycle have been
/// attempted — never per-channel.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressState {
    /// Timestamp up to which data has already been backed up
    pub last_backup: DateTime<Utc>,
}

impl ProgressState {
    /// State for a first-ever run: fetch everything
    pub fn epoch() -> Self {
        Self {
            // Zero seconds past the epoch is always representable.
            last_backup: Utc.timestamp_opt(0, 0).single().unwrap_or_default(),
        }
    }
}

/// Reads and writes the [`ProgressState`] record on disk
#[derive(Clone, Debug)]
pub struct ProgressStore {
    path: PathBuf,
}

impl ProgressStore {
    /// Create a store for the record at `path`; performs no I/O
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the persisted record
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted state, seeding it on first run
    ///
    /// If no record exists yet, the epoch state is persisted before it is
    /// returned, so a crash immediately after startup still leaves a valid
    /// record behind. Any other read or parse failure is a
    /// [`Error::Storage`] and fatal at startup.
    pub fn load(&self) -> Result<ProgressState> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => {
                let state: ProgressState =
                    serde_json::from_str(&raw).map_err(|e| Error::Storage {
                        path: self.path.clone(),
                        reason: format!("corrupt progress record: {e}"),
                    })?;
                debug!(last_backup = %state.last_backup, "Loaded progress record");
                Ok(state)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let state = ProgressState::epoch();
                info!(
                    path = %self.path.display(),
                    "No progress record found, seeding epoch watermark"
                );
                self.save(&state)?;
                Ok(state)
            }
            Err(e) => Err(Error::Storage {
                path: self.path.clone(),
                reason: e.to_string(),
            }),
        }
    }

    /// Persist the state, replacing the previous record atomically
    ///
    /// The record is written to `<path>.tmp` and renamed into place; the
    /// previously valid record survives a crash at any point before the
    /// rename.
    pub fn save(&self, state: &ProgressState) -> Result<()> {
        let tmp = self.path.with_extension("tmp");
        let json = serde_json::to_string_pretty(state)?;

        std::fs::write(&tmp, json).map_err(|e| Error::Storage {
            path: tmp.clone(),
            reason: e.to_string(),
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|e| Error::Storage {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        debug!(last_backup = %state.last_backup, "Persisted progress record");
        Ok(())
    }
}
