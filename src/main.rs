//! feedvault binary: flag parsing, wiring, and signal handling.
//!
//! All behavior lives in the library; this binary resolves the
//! configuration and channel registry, loads the watermark, spawns the
//! backup runner, and waits for a termination signal. Configuration
//! failures exit non-zero before the runner starts; the process otherwise
//! runs until externally stopped.

use anyhow::Context;
use clap::Parser;
use feedvault::{
    BackupContext, BackupRunner, ChannelSet, Config, FeedFetcher, ProgressStore,
    wait_for_shutdown,
};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Incremental per-channel CSV feed backup service
#[derive(Parser, Debug)]
#[command(name = "feedvault", version, about)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "feedvault.toml")]
    config: PathBuf,

    /// Path to the JSON channel list
    #[arg(long, default_value = "channels.json")]
    channels: PathBuf,

    /// Run one backup cycle immediately at startup
    #[arg(short = 'b', long)]
    backup_at_start: bool,
}

fn init_tracing(log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .append(true)
                .create(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Arc::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config.display()))?;
    init_tracing(config.log_file.as_deref())?;

    info!(
        config = %args.config.display(),
        base_url = %config.base_url,
        schedule = %config.schedule,
        "feedvault starting"
    );

    let channels = ChannelSet::load(&args.channels)
        .with_context(|| format!("loading channel list from {}", args.channels.display()))?;
    let store = ProgressStore::new(&config.progress_file);
    let state = store
        .load()
        .with_context(|| format!("loading progress record {}", config.progress_file.display()))?;

    info!(
        channel_count = channels.len(),
        last_backup = %state.last_backup,
        "Loaded channel registry and watermark"
    );

    let ctx = BackupContext {
        base_url: config.base_url.clone(),
        channels,
        output_dir: config.output_dir.clone(),
        store,
        fetcher: FeedFetcher::new(),
    };

    let cancel = CancellationToken::new();
    let runner = BackupRunner::new(
        ctx,
        state,
        config.schedule,
        args.backup_at_start,
        cancel.clone(),
    );
    let runner_handle = tokio::spawn(runner.run());

    wait_for_shutdown().await;
    info!("Shutdown signal received");
    cancel.cancel();
    runner_handle.await.context("backup runner panicked")?;

    Ok(())
}
