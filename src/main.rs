use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use arxiv_digest::{
    app_state::AppState,
    config::Settings,
    ledger::{JsonFileStore, LedgerStore},
    services::{
        arxiv,
        digest::{self, DigestError},
        poller::BatchPoller,
        submitter::Submitter,
        tracker::{LifecycleTracker, PollCycle},
    },
};

#[derive(Parser)]
#[command(
    name = "arxiv-digest",
    version,
    about = "Daily arXiv digests scored against reader interests"
)]
struct Cli {
    /// Path to the JSON config file
    #[arg(long, short, global = true, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory and empty ledger files
    Init,
    /// Fetch a day's listing and submit it as one batch
    Submit {
        /// Listing date (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,
        /// Re-fetch the listing even if it is cached
        #[arg(long)]
        refresh: bool,
    },
    /// Poll every ongoing batch once
    Poll,
    /// Write Markdown digests for a completed day
    Render {
        /// Listing date (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,
    },
    /// Show ledger counts
    Status,
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

    // Register application metrics
    metrics::describe_counter!("batch_jobs_submitted_total", "Batches accepted by the batch API");
    metrics::describe_counter!("batch_jobs_completed_total", "Batches moved to completed");
    metrics::describe_counter!("batch_jobs_failed_total", "Batches moved to failed");
    metrics::describe_counter!("batch_poll_errors_total", "Polls that hit a retrieval error");
    metrics::describe_gauge!("batch_jobs_ongoing", "Batches currently tracked as ongoing");

    // Load configuration from the environment and the config file
    let cli = Cli::parse();
    let settings = Settings::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Commands::Init => init(&settings),
        Commands::Submit { date, refresh } => submit(settings, date, refresh).await,
        Commands::Poll => poll(settings).await,
        Commands::Render { date } => render(&settings, date),
        Commands::Status => status(&settings),
    }
}

fn init(settings: &Settings) -> anyhow::Result<()> {
    let store = JsonFileStore::new(settings.digest.ledger_dir());
    let created = store.init().context("initialising ledger")?;
    for path in &created {
        tracing::info!(path = %path.display(), "Created ledger file");
    }
    println!("Ledger ready in {} ({} file(s) created)", store.dir().display(), created.len());
    Ok(())
}

async fn submit(settings: Settings, date: NaiveDate, refresh: bool) -> anyhow::Result<()> {
    let state = AppState::new(settings)?;
    let digest_config = &state.settings.digest;

    let papers = arxiv::cached_day(
        &state.arxiv,
        &digest_config.abstracts_dir(),
        &digest_config.category,
        date,
        refresh,
    )
    .await
    .with_context(|| format!("fetching listing for {date}"))?;

    let submitter = Submitter::new(
        &state.batch_api,
        &digest_config.model,
        digest_config.max_tokens,
        digest_config.staging_dir(),
    );
    let poller = BatchPoller::new(&state.batch_api);
    let tracker = LifecycleTracker::new(&state.store, &poller);
    let record = tracker
        .submit_and_record(&submitter, &papers, &digest_config.users, date)
        .await?;

    println!("Submitted {} ({} papers)", record.batch_id, record.entry_ids.len());
    Ok(())
}

async fn poll(settings: Settings) -> anyhow::Result<()> {
    let state = AppState::new(settings)?;
    let poller = BatchPoller::new(&state.batch_api);
    let tracker = LifecycleTracker::new(&state.store, &poller);

    let summary = tracker.poll_all().await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn render(settings: &Settings, date: NaiveDate) -> anyhow::Result<()> {
    let store = JsonFileStore::new(settings.digest.ledger_dir());
    let completed = store.load_completed()?;
    let record = digest::latest_for_date(&completed, date).ok_or(DigestError::NoResults(date))?;

    let papers = arxiv::load_cached_day(&settings.digest.abstracts_dir(), date)
        .with_context(|| format!("loading cached listing for {date}"))?;
    let written = digest::write_digests(
        record,
        &papers,
        &settings.digest.users,
        &settings.digest.markdown_dir(),
    )?;

    for path in written {
        println!("{}", path.display());
    }
    Ok(())
}

fn status(settings: &Settings) -> anyhow::Result<()> {
    let store = JsonFileStore::new(settings.digest.ledger_dir());
    let ongoing = store.load_ongoing()?;
    let completed = store.load_completed()?;
    let failed = store.load_failed()?;

    println!("ongoing:   {}", ongoing.len());
    for (batch_id, job) in &ongoing {
        println!("  {batch_id}  {}  submitted {}", job.list_date, job.submitted_at);
    }
    println!("completed: {}", completed.len());
    println!("failed:    {}", failed.len());
    Ok(())
}
