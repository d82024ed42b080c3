//! Command handlers. Each builds a worker over the on-disk stores and
//! delivers one lifecycle event to it.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use shellcache_core::{
    CacheStore, CacheWorker, Config, ControlMessage, DiskStore, EventHandler, EventOutcome,
    FetchOutcome, HttpTransport, LifecycleEvent, RefreshReport, RefreshSummary, Request, Response,
    Transport,
};
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use tracing::{debug, info};

use crate::cli::{Commands, FetchArgs};

/// Upper bound on how long `fetch` waits for background shell refreshes
/// before exiting.
const REFRESH_SETTLE_SECS: u64 = 10;

/// Poll interval while waiting for background refreshes.
const REFRESH_POLL_MS: u64 = 100;

pub async fn run(command: Commands, config: Config) -> Result<()> {
    let cache_dir = config.cache_dir()?;
    debug!(?cache_dir, "Cache directory configured");

    let store: Arc<dyn CacheStore> = Arc::new(DiskStore::new(cache_dir)?);
    let transport = Arc::new(HttpTransport::new(config.request_timeout())?);
    let (worker, reports) = CacheWorker::new(&config, Arc::clone(&store), transport.clone())?;

    match command {
        Commands::Install => install(&worker, &config).await,
        Commands::Activate => activate(&worker).await,
        Commands::Fetch(args) => fetch(&worker, &*transport, reports, args).await,
        Commands::Message { json } => message(&worker, &json).await,
        Commands::Sync { tag } => {
            let tag = tag.unwrap_or_else(|| config.refresh_tag.clone());
            sync(&worker, tag).await
        }
        Commands::Status => status(&worker, &*store).await,
    }
}

async fn install(worker: &CacheWorker, config: &Config) -> Result<()> {
    worker
        .dispatch(LifecycleEvent::Install)
        .await
        .context("Install failed; no shell resources were cached")?;
    eprintln!(
        "Cached {} shell resources into {}",
        config.shell_files.len(),
        worker.generations().shell
    );
    Ok(())
}

async fn activate(worker: &CacheWorker) -> Result<()> {
    worker
        .dispatch(LifecycleEvent::Activate)
        .await
        .context("Activation failed")?;
    eprintln!("Activated; live generations:");
    for name in worker.generations().live_names() {
        eprintln!("  {}", name);
    }
    Ok(())
}

/// Resolve `target` against the origin unless it is already absolute.
fn resolve_target(worker: &CacheWorker, target: &str, method: &str) -> Result<Request> {
    let url = worker
        .origin()
        .join(target)
        .with_context(|| format!("Invalid target: {}", target))?;
    Ok(Request::parse(method, url.as_str())?)
}

async fn fetch(
    worker: &CacheWorker,
    transport: &dyn Transport,
    mut reports: mpsc::Receiver<RefreshReport>,
    args: FetchArgs,
) -> Result<()> {
    let request = resolve_target(worker, &args.target, &args.method)?;

    let outcome = match worker.dispatch(LifecycleEvent::Fetch(request)).await? {
        EventOutcome::Fetched(outcome) => outcome,
        other => anyhow::bail!("Unexpected outcome for fetch: {:?}", other),
    };
    let response = match outcome {
        FetchOutcome::Respond(response) => response,
        FetchOutcome::PassThrough(request) => {
            info!(request = %request, "Request not managed, fetching directly");
            transport
                .fetch(&request)
                .await
                .with_context(|| format!("Failed to fetch {}", request.url))?
        }
    };

    write_response(&response, args.output.as_deref())?;
    settle_refreshes(worker, &mut reports).await;
    Ok(())
}

fn write_response(response: &Response, output: Option<&Path>) -> Result<()> {
    eprintln!("{}", response.status);
    for (name, value) in &response.headers {
        eprintln!("{}: {}", name, value);
    }

    match output {
        Some(path) => std::fs::write(path, &response.body)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&response.body)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

/// Give detached shell refreshes a bounded chance to finish before the
/// process exits.
async fn settle_refreshes(worker: &CacheWorker, reports: &mut mpsc::Receiver<RefreshReport>) {
    let deadline = Instant::now() + Duration::from_secs(REFRESH_SETTLE_SECS);
    while worker.engine().refreshes_in_flight() > 0 && Instant::now() < deadline {
        let poll = timeout(Duration::from_millis(REFRESH_POLL_MS), reports.recv());
        if let Ok(Some(report)) = poll.await {
            debug!(key = %report.key, outcome = ?report.outcome, "Background refresh finished");
        }
    }
    while let Ok(report) = reports.try_recv() {
        debug!(key = %report.key, outcome = ?report.outcome, "Background refresh finished");
    }
}

async fn message(worker: &CacheWorker, json: &str) -> Result<()> {
    let message = ControlMessage::parse(json)?;
    worker.dispatch(LifecycleEvent::Message(message)).await?;
    if worker.skip_waiting_requested() {
        eprintln!("Skip waiting requested");
    } else {
        eprintln!("Message ignored");
    }
    Ok(())
}

async fn sync(worker: &CacheWorker, tag: String) -> Result<()> {
    let outcome = worker
        .dispatch(LifecycleEvent::Sync { tag: tag.clone() })
        .await?;
    match outcome {
        EventOutcome::Refreshed(Some(summary)) => print_summary(&summary),
        _ => eprintln!("Nothing to do for sync tag {:?}", tag),
    }
    Ok(())
}

fn print_summary(summary: &RefreshSummary) {
    eprintln!("Refreshed {} shell resources", summary.refreshed.len());
    for (path, reason) in &summary.failed {
        eprintln!("  failed {}: {}", path, reason);
    }
}

async fn status(worker: &CacheWorker, store: &dyn CacheStore) -> Result<()> {
    let live = worker.generations().live_names();
    let names = store.store_names().await?;
    if names.is_empty() {
        println!("No cache stores");
        return Ok(());
    }

    for name in names {
        let entries = store.entries(&name).await?;
        let marker = if live.contains(&name) { "live" } else { "stale" };
        println!("{} ({}, {} entries)", name, marker, entries.len());
        for entry in entries {
            println!(
                "  {:>3}  {:<9} {}",
                entry.response.status,
                entry.age_display(),
                entry.key
            );
        }
    }
    Ok(())
}
