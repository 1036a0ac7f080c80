use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use arxiv_digest::{
    app_state::AppState,
    config::Settings,
    services::{
        poller::BatchPoller,
        retry::{self, RetryPolicy, DEFAULT_INTERVAL, DEFAULT_MAX_ATTEMPTS},
        tracker::LifecycleTracker,
    },
};

/// Polls ongoing batches until they resolve or the attempt budget runs out.
#[derive(Parser)]
#[command(name = "worker", version)]
struct Args {
    /// Path to the JSON config file
    config: PathBuf,

    /// Poll cycles before giving up
    #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    max_attempts: u32,

    /// Seconds to wait between cycles
    #[arg(long, default_value_t = DEFAULT_INTERVAL.as_secs())]
    interval_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let args = Args::parse();
    tracing::info!(config = %args.config.display(), "Starting batch worker");

    // Load configuration
    let settings = Settings::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let state = AppState::new(settings)?;

    // Poll until every batch resolves or the budget runs out
    let poller = BatchPoller::new(&state.batch_api);
    let tracker = LifecycleTracker::new(&state.store, &poller);
    let policy = RetryPolicy {
        max_attempts: args.max_attempts,
        interval: Duration::from_secs(args.interval_secs),
    };

    let report = retry::drive(&tracker, policy).await?;

    tracing::info!(
        attempts = report.attempts,
        drained = report.drained,
        in_progress = report.last.map(|s| s.in_progress).unwrap_or_default(),
        "Worker finished"
    );
    Ok(())
}
