//! # feedvault
//!
//! Incremental per-channel CSV feed backup service.
//!
//! feedvault periodically downloads per-channel feed exports from a remote
//! HTTP API into dated backup directories (`BAK_20240115/alpha.csv`) and
//! persists the timestamp of the last successful backup, so each run
//! requests only the window since the previous one.
//!
//! ## Design
//!
//! - **Single watermark** — one persisted timestamp for the whole channel
//!   set, advanced exactly once per completed cycle, after every channel
//!   has been attempted. A crash mid-cycle re-fetches the same window on
//!   the next run (at-least-once delivery, idempotent per cycle).
//! - **Serialized cycles** — one timer, cycles awaited inline; triggers
//!   that elapse while a cycle runs are skipped and logged, never queued.
//! - **Explicit dependencies** — configuration, channels, the progress
//!   store and the HTTP client are resolved once at startup into a
//!   [`cycle::BackupContext`]; there is no process-wide mutable state.
//!
//! ## Quick Start
//!
//! ```no_run
//! use feedvault::{BackupContext, BackupRunner, ChannelSet, Config, FeedFetcher, ProgressStore};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("feedvault.toml".as_ref())?;
//!     let channels = ChannelSet::load("channels.json".as_ref())?;
//!     let store = ProgressStore::new(&config.progress_file);
//!     let state = store.load()?;
//!
//!     let ctx = BackupContext {
//!         base_url: config.base_url.clone(),
//!         channels,
//!         output_dir: config.output_dir.clone(),
//!         store,
//!         fetcher: FeedFetcher::new(),
//!     };
//!
//!     let cancel = CancellationToken::new();
//!     BackupRunner::new(ctx, state, config.schedule, true, cancel).run().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Channel registry loading
pub mod channels;
/// Configuration types
pub mod config;
/// The backup cycle (core algorithm)
pub mod cycle;
/// Error types
pub mod error;
/// Single-feed HTTP download
pub mod fetch;
/// Watermark persistence
pub mod progress;
/// Background backup loop
pub mod runner;
/// Backup schedule expressions
pub mod schedule;

// Re-export commonly used types
pub use channels::{Channel, ChannelSet};
pub use config::Config;
pub use cycle::{BackupContext, CycleOutcome, run_cycle};
pub use error::{Error, FetchError, Result};
pub use fetch::FeedFetcher;
pub use progress::{ProgressState, ProgressStore};
pub use runner::BackupRunner;
pub use schedule::Schedule;

/// Wait for a termination signal.
///
/// - **Unix:** resolves on SIGTERM or SIGINT, falling back to
///   `tokio::signal::ctrl_c()` if signal registration fails.
/// - **Windows/other:** resolves on Ctrl+C.
pub async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let sigterm = signal(SignalKind::terminate());
        let sigint = signal(SignalKind::interrupt());
        match (sigterm, sigint) {
            (Ok(mut term), Ok(mut int)) => {
                tokio::select! {
                    _ = term.recv() => {}
                    _ = int.recv() => {}
                }
            }
            _ => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
