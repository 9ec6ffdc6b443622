//! shiftsync daemon: runs the feed sync orchestrator on a fixed interval and
//! forwards committed event changes to the partner notifier.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use shiftsync_core::feed::FeedFetcher;
use shiftsync_core::notify::{ChangeNotifier, LogPushChannel};
use shiftsync_core::orchestrator::SyncOrchestrator;
use shiftsync_core::store::MemoryStore;

#[derive(Parser)]
#[command(name = "shiftsync")]
#[command(about = "Import external calendar feeds into the event store and notify partners of shift changes")]
struct Cli {
    /// Path to the JSON-backed event store
    #[arg(long, default_value = "shiftsync-store.json")]
    store: PathBuf,

    /// Interval between sync ticks (e.g. "15m", "90s")
    #[arg(long, default_value = "15m", value_parser = humantime::parse_duration)]
    interval: Duration,

    /// Time zone for quiet-hours evaluation and notification formatting
    #[arg(long, default_value = "UTC")]
    timezone: chrono_tz::Tz,

    /// Run a single tick and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let store = Arc::new(
        MemoryStore::load(&cli.store)
            .with_context(|| format!("failed to load store from {}", cli.store.display()))?,
    );
    let fetcher = FeedFetcher::new().context("failed to build feed fetcher")?;

    // Changes are notified independently of the sync batch that produced
    // them; a slow or failing notification never delays reconciliation.
    let (changes_tx, mut changes_rx) = tokio::sync::mpsc::unbounded_channel();
    let notifier = ChangeNotifier::new(store.clone(), Arc::new(LogPushChannel), cli.timezone);
    let notifier_task = tokio::spawn(async move {
        while let Some(change) = changes_rx.recv().await {
            notifier.notify(&change, chrono::Utc::now()).await;
        }
    });

    let orchestrator = SyncOrchestrator::new(store.clone(), fetcher).with_change_sink(changes_tx);

    let mut ticks = tokio::time::interval(cli.interval);
    loop {
        ticks.tick().await;
        match orchestrator.run(chrono::Utc::now()).await {
            Ok(_report) => {
                if let Err(e) = store.save(&cli.store) {
                    error!("failed to persist store: {e}");
                }
            }
            Err(e) => error!("sync tick failed: {e}"),
        }
        if cli.once {
            break;
        }
    }

    // Dropping the orchestrator closes the change channel; wait for the
    // notifier to drain what the final tick produced before exiting.
    drop(orchestrator);
    let _ = notifier_task.await;

    Ok(())
}
