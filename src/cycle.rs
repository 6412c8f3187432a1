//! The backup cycle
//!
//! One cycle is a full pass over all channels: create the dated output
//! directory, fetch each channel's incremental feed into it, then advance
//! the persisted watermark. The watermark moves exactly once per cycle,
//! after every channel has been attempted — never per channel — so a crash
//! mid-cycle leaves it unadvanced and the next run re-fetches the same
//! window. Idempotent at cycle granularity, at-least-once per feed row.
//!
//! A single channel's failure is logged and does not abort the cycle;
//! remaining channels are still attempted and the watermark still advances.
//! Failed channels simply lose that window's data (no retry by design).

use crate::channels::{Channel, ChannelSet};
use crate::error::Result;
use crate::fetch::FeedFetcher;
use crate::progress::{ProgressState, ProgressStore};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use url::Url;

/// Maximum suffix tried when a dated directory already exists
const MAX_DIR_SUFFIX: u32 = 9999;

/// Format of the watermark in the request query string
const WINDOW_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format of the calendar date in backup directory names
const FOLDER_TIME_FORMAT: &str = "%Y%m%d";

/// Everything a backup cycle needs, resolved once at startup
///
/// Explicit dependency passing: the context is built in `main` and handed
/// to the runner, so there is no process-wide mutable state.
#[derive(Clone, Debug)]
pub struct BackupContext {
    /// Base address of the feed API, trailing slash normalized
    pub base_url: Url,
    /// Channels to back up, in fetch order
    pub channels: ChannelSet,
    /// Directory under which dated backup folders are created
    pub output_dir: PathBuf,
    /// Watermark persistence
    pub store: ProgressStore,
    /// HTTP downloader shared across channels and cycles
    pub fetcher: FeedFetcher,
}

/// Summary of one completed (or cancelled) cycle
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CycleOutcome {
    /// The dated directory this cycle wrote into
    pub directory: PathBuf,
    /// Channels attempted before completion or cancellation
    pub attempted: usize,
    /// Channels whose fetch failed
    pub failed: usize,
    /// Total bytes written across all successful fetches
    pub bytes_written: u64,
    /// False when the cycle was cancelled between fetches; the watermark is
    /// only advanced when true
    pub completed: bool,
}

/// Directory name for a cycle triggered at `now`, e.g. `BAK_20240115`
pub fn folder_name(now: DateTime<Utc>) -> String {
    format!("BAK_{}", now.format(FOLDER_TIME_FORMAT))
}

/// Create a fresh dated directory under `root`
///
/// Two cycles on the same calendar day collide on the folder name. Instead
/// of failing the whole cycle, a numeric suffix is appended until an unused
/// name is found: `BAK_20240115`, `BAK_20240115_2`, `BAK_20240115_3`, …
/// `create_dir` is used for each candidate so the existence check and the
/// creation are a single step.
fn create_cycle_dir(root: &Path, now: DateTime<Utc>) -> std::io::Result<PathBuf> {
    let base = folder_name(now);

    for i in 1..=MAX_DIR_SUFFIX {
        let name = if i == 1 {
            base.clone()
        } else {
            format!("{base}_{i}")
        };
        let candidate = root.join(&name);
        match std::fs::create_dir(&candidate) {
            Ok(()) => {
                info!(directory = %candidate.display(), "Created backup directory");
                return Ok(candidate);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        format!("no free directory name for {base} after {MAX_DIR_SUFFIX} attempts"),
    ))
}

/// Request URL for one channel's incremental feed
///
/// Path template and query shape follow the upstream API:
/// `{base}stream/channels/{id}/feeds?start={watermark}&api_key={key}`,
/// where the watermark is `YYYY-MM-DD HH:MM:SS` with spaces percent-encoded.
pub fn feed_url(base_url: &Url, channel: &Channel, window_start: DateTime<Utc>) -> String {
    let start = window_start.format(WINDOW_TIME_FORMAT).to_string();
    format!(
        "{base_url}stream/channels/{id}/feeds?start={start}&api_key={key}",
        id = channel.id,
        start = urlencoding::encode(&start),
        key = channel.api_key,
    )
}

/// Run one backup cycle triggered at `now`
///
/// Steps: create the dated directory, fetch every channel sequentially in
/// registry order into `<dir>/<id>.csv`, then set the watermark to `now`
/// and persist it. The cancellation token is checked between channel
/// fetches; a cancelled cycle returns early without advancing the
/// watermark.
///
/// Errors out only when the output directory cannot be created — every
/// per-channel failure is logged and absorbed. A failed watermark save is
/// also absorbed: the in-memory state still advances, and the next restart
/// re-fetches the unsaved window.
pub async fn run_cycle(
    ctx: &BackupContext,
    state: &mut ProgressState,
    now: DateTime<Utc>,
    cancel: &CancellationToken,
) -> Result<CycleOutcome> {
    let directory = create_cycle_dir(&ctx.output_dir, now)?;
    let window_start = state.last_backup;

    info!(
        directory = %directory.display(),
        window_start = %window_start,
        channel_count = ctx.channels.len(),
        "Backup cycle started"
    );

    let mut outcome = CycleOutcome {
        directory: directory.clone(),
        attempted: 0,
        failed: 0,
        bytes_written: 0,
        completed: false,
    };

    for channel in &ctx.channels.channels {
        if cancel.is_cancelled() {
            warn!(
                attempted = outcome.attempted,
                remaining = ctx.channels.len() - outcome.attempted,
                "Backup cycle cancelled, watermark not advanced"
            );
            return Ok(outcome);
        }

        let url = feed_url(&ctx.base_url, channel, window_start);
        let dest = directory.join(format!("{}.csv", channel.id));
        outcome.attempted += 1;

        match ctx.fetcher.fetch(&url, &dest).await {
            Ok(bytes) => outcome.bytes_written += bytes,
            Err(e) => {
                outcome.failed += 1;
                error!(channel = %channel.id, error = %e, "Channel fetch failed");
            }
        }
    }

    // All channels attempted: advance the watermark exactly once, even if
    // individual fetches failed.
    state.last_backup = now;
    if let Err(e) = ctx.store.save(state) {
        warn!(error = %e, "Failed to persist watermark, will re-fetch this window after restart");
    }
    outcome.completed = true;

    info!(
        directory = %directory.display(),
        attempted = outcome.attempted,
        failed = outcome.failed,
        bytes = outcome.bytes_written,
        watermark = %state.last_backup,
        "Backup cycle finished"
    );
    Ok(outcome)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn channel(id: &str, key: &str) -> Channel {
        Channel {
            id: id.into(),
            api_key: key.into(),
        }
    }

    fn test_context(server_uri: &str, dir: &Path, channels: Vec<Channel>) -> BackupContext {
        BackupContext {
            base_url: Url::parse(&format!("{server_uri}/")).unwrap(),
            channels: ChannelSet { channels },
            output_dir: dir.to_path_buf(),
            store: ProgressStore::new(dir.join("progress.json")),
            fetcher: FeedFetcher::new(),
        }
    }

    fn watermark(y: i32, mo: u32, d: u32) -> ProgressState {
        ProgressState {
            last_backup: Utc.with_ymd_and_hms(y, mo, d, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn folder_name_uses_compact_calendar_date() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap();
        assert_eq!(folder_name(now), "BAK_20240115");
    }

    #[test]
    fn feed_url_percent_encodes_the_window_start() {
        let base = Url::parse("http://api.example.com/").unwrap();
        let start = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        let url = feed_url(&base, &channel("alpha", "secret"), start);
        assert_eq!(
            url,
            "http://api.example.com/stream/channels/alpha/feeds\
             ?start=2024-01-10%2000%3A00%3A00&api_key=secret"
        );
    }

    #[tokio::test]
    async fn cycle_writes_one_file_per_channel() {
        let server = MockServer::start().await;
        for id in ["alpha", "beta", "gamma"] {
            Mock::given(method("GET"))
                .and(path(format!("/stream/channels/{id}/feeds")))
                .respond_with(ResponseTemplate::new(200).set_body_string(format!("{id} rows\n")))
                .mount(&server)
                .await;
        }

        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(
            &server.uri(),
            dir.path(),
            vec![
                channel("alpha", "k1"),
                channel("beta", "k2"),
                channel("gamma", "k3"),
            ],
        );

        let mut state = watermark(2024, 1, 10);
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 3, 0, 0).unwrap();
        let outcome = run_cycle(&ctx, &mut state, now, &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.completed);
        assert_eq!(outcome.attempted, 3);
        assert_eq!(outcome.failed, 0);
        assert_eq!(outcome.directory, dir.path().join("BAK_20240115"));
        for id in ["alpha", "beta", "gamma"] {
            let contents =
                std::fs::read_to_string(outcome.directory.join(format!("{id}.csv"))).unwrap();
            assert_eq!(contents, format!("{id} rows\n"));
        }
    }

    #[tokio::test]
    async fn cycle_sends_watermark_and_api_key_as_query_params() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stream/channels/alpha/feeds"))
            .and(query_param("start", "2024-01-10 00:00:00"))
            .and(query_param("api_key", "secret-key"))
            .respond_with(ResponseTemplate::new(200).set_body_string("rows"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(&server.uri(), dir.path(), vec![channel("alpha", "secret-key")]);

        let mut state = watermark(2024, 1, 10);
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        let outcome = run_cycle(&ctx, &mut state, now, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.failed, 0);
    }

    #[tokio::test]
    async fn one_failing_channel_does_not_stop_the_rest() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stream/channels/alpha/feeds"))
            .respond_with(ResponseTemplate::new(200).set_body_string("alpha rows"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/stream/channels/broken/feeds"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/stream/channels/gamma/feeds"))
            .respond_with(ResponseTemplate::new(200).set_body_string("gamma rows"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(
            &server.uri(),
            dir.path(),
            vec![
                channel("alpha", "k1"),
                channel("broken", "k2"),
                channel("gamma", "k3"),
            ],
        );

        let mut state = watermark(2024, 1, 10);
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        let outcome = run_cycle(&ctx, &mut state, now, &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.completed);
        assert_eq!(outcome.attempted, 3);
        assert_eq!(outcome.failed, 1);
        assert!(outcome.directory.join("alpha.csv").exists());
        assert!(!outcome.directory.join("broken.csv").exists());
        assert!(outcome.directory.join("gamma.csv").exists());
        // Watermark advances even with a failed channel.
        assert_eq!(state.last_backup, now);
    }

    #[tokio::test]
    async fn completed_cycle_persists_the_invocation_timestamp() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("rows"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(&server.uri(), dir.path(), vec![channel("alpha", "k1")]);

        let mut state = watermark(2024, 1, 10);
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 6, 30, 0).unwrap();
        run_cycle(&ctx, &mut state, now, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(state.last_backup, now);
        assert_eq!(ctx.store.load().unwrap().last_backup, now);
    }

    #[tokio::test]
    async fn same_day_rerun_gets_a_suffixed_directory() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("rows"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(&server.uri(), dir.path(), vec![channel("alpha", "k1")]);

        let mut state = watermark(2024, 1, 10);
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        let cancel = CancellationToken::new();

        let first = run_cycle(&ctx, &mut state, now, &cancel).await.unwrap();
        let second = run_cycle(&ctx, &mut state, now, &cancel).await.unwrap();
        let third = run_cycle(&ctx, &mut state, now, &cancel).await.unwrap();

        assert_eq!(first.directory, dir.path().join("BAK_20240115"));
        assert_eq!(second.directory, dir.path().join("BAK_20240115_2"));
        assert_eq!(third.directory, dir.path().join("BAK_20240115_3"));
        assert!(second.directory.join("alpha.csv").exists());
    }

    #[tokio::test]
    async fn cancelled_cycle_leaves_the_watermark_unadvanced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("rows"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(&server.uri(), dir.path(), vec![channel("alpha", "k1")]);

        let before = watermark(2024, 1, 10);
        let mut state = before;
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = run_cycle(&ctx, &mut state, now, &cancel).await.unwrap();

        assert!(!outcome.completed);
        assert_eq!(outcome.attempted, 0);
        assert_eq!(state, before);
    }

    #[tokio::test]
    async fn unwritable_output_root_fails_the_cycle() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = test_context(&server.uri(), dir.path(), vec![channel("alpha", "k1")]);
        ctx.output_dir = dir.path().join("missing").join("nested");

        let mut state = watermark(2024, 1, 10);
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        let result = run_cycle(&ctx, &mut state, now, &CancellationToken::new()).await;

        assert!(result.is_err());
        // A failed cycle never advances the watermark.
        assert_eq!(state, watermark(2024, 1, 10));
    }

    #[tokio::test]
    async fn failed_watermark_save_still_advances_in_memory() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("rows"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut ctx = test_context(&server.uri(), dir.path(), vec![channel("alpha", "k1")]);
        ctx.store = ProgressStore::new(dir.path().join("missing-dir").join("progress.json"));

        let mut state = watermark(2024, 1, 10);
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        let outcome = run_cycle(&ctx, &mut state, now, &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.completed);
        assert_eq!(state.last_backup, now);
    }
}
