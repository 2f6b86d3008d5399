//! shellcache - drive a web app's offline cache from the command line.
//!
//! Each subcommand delivers one lifecycle event to a worker backed by an
//! on-disk store and real HTTP, so a deployment can be staged, activated
//! and inspected outside a browser.

mod config;
mod format;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use clap::{Parser, Subcommand};
use shellcache_core::{
    ActivationOutcome, CacheResult, CacheStorage, ClientController, Deployment, DiskStorage,
    EventOutcome, HttpFetcher, LifecycleEvent, Origin, Region, Request, ResourceManifest, Worker,
    MANIFEST_RECORD_KEY,
};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::Config;
use format::{age_display, format_bytes};

#[derive(Parser)]
#[command(name = "shellcache", version, about = "Offline cache manager for packaged web apps")]
struct Cli {
    /// Config file (default: ~/.config/shellcache/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Origin the app is served from, e.g. https://app.example.com
    #[arg(long, env = "SHELLCACHE_ORIGIN", global = true)]
    origin: Option<String>,

    /// Deployment file: {"resources": {...}, "shell": [...]}
    #[arg(long, env = "SHELLCACHE_DEPLOYMENT", global = true)]
    deployment: Option<PathBuf>,

    /// Directory holding the cache regions
    #[arg(long, env = "SHELLCACHE_STORAGE_DIR", global = true)]
    storage_dir: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Populate the staging region with the shell set
    Install,
    /// Reconcile staging into the persistent cache
    Activate,
    /// Run the request interceptor for one URL
    Fetch {
        url: String,
        #[arg(long, default_value = "GET")]
        method: String,
        /// Write the response body to this file
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Deliver a message (skipWaiting | downloadOffline)
    Message { payload: String },
    /// Show regions, entry counts and the stored manifest record
    Status,
}

/// Client signals have no pages to act on here; they are logged.
struct LoggingClients;

#[async_trait]
impl ClientController for LoggingClients {
    async fn claim(&self) -> CacheResult<()> {
        info!("Clients claimed");
        Ok(())
    }

    async fn skip_waiting(&self) -> CacheResult<()> {
        info!("Skip waiting requested");
        Ok(())
    }
}

/// Initialize the tracing subscriber for logging.
/// The returned guard must live until exit so buffered file logs are flushed.
fn init_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("Invalid log file path: {}", path.display()))?;
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_file.as_deref())?;

    let config = Config::load(cli.config.as_deref())?;
    let storage_dir = match cli.storage_dir {
        Some(ref dir) => dir.clone(),
        None => config.storage_dir()?,
    };
    let storage = Arc::new(
        DiskStorage::new(&storage_dir)
            .with_context(|| format!("Failed to open storage at {}", storage_dir.display()))?,
    );

    match cli.command {
        Command::Status => show_status(storage.as_ref(), &config).await,
        Command::Install => install(&build_worker(&cli, &config, storage).await?).await,
        Command::Activate => activate(&build_worker(&cli, &config, storage).await?).await,
        Command::Fetch {
            ref url,
            ref method,
            ref output,
        } => {
            let worker = build_worker(&cli, &config, storage).await?;
            fetch(&worker, url, method, output.as_deref()).await
        }
        Command::Message { ref payload } => {
            message(&build_worker(&cli, &config, storage).await?, payload).await
        }
    }
}

async fn build_worker(cli: &Cli, config: &Config, storage: Arc<DiskStorage>) -> Result<Worker> {
    let origin = cli
        .origin
        .clone()
        .or_else(|| config.origin.clone())
        .context("No origin configured; pass --origin or set SHELLCACHE_ORIGIN")?;
    let origin = Origin::parse(&origin)?;

    let deployment_path = cli
        .deployment
        .clone()
        .or_else(|| config.deployment.clone())
        .context("No deployment configured; pass --deployment or set SHELLCACHE_DEPLOYMENT")?;
    let contents = std::fs::read_to_string(&deployment_path).with_context(|| {
        format!("Failed to read deployment: {}", deployment_path.display())
    })?;
    let deployment = Deployment::from_json(&contents).with_context(|| {
        format!("Failed to parse deployment: {}", deployment_path.display())
    })?;

    let worker = Worker::new(
        storage,
        Arc::new(HttpFetcher::new()?),
        Arc::new(LoggingClients),
        Arc::new(deployment),
        origin,
        config.regions.clone(),
    )?;
    worker.refresh_state().await?;
    Ok(worker)
}

async fn install(worker: &Worker) -> Result<()> {
    worker
        .dispatch(LifecycleEvent::Install)
        .await
        .context("Install failed")?;
    println!(
        "Staged {} shell file(s) into {}",
        worker.deployment().shell().len(),
        worker.regions().staging
    );
    Ok(())
}

async fn activate(worker: &Worker) -> Result<()> {
    let outcome = match worker.dispatch(LifecycleEvent::Activate).await? {
        EventOutcome::Activated(outcome) => outcome,
        other => anyhow::bail!("Unexpected outcome: {:?}", other),
    };
    match outcome {
        ActivationOutcome::Active(report) => {
            println!("Activated ({:?})", report.kind);
            println!("  reused:   {}", report.reused.len());
            println!("  pruned:   {}", report.pruned.len());
            println!("  promoted: {}", report.promoted.len());
            Ok(())
        }
        ActivationOutcome::Failed(e) => {
            Err(anyhow::Error::new(e).context("Activation failed; all cache regions were discarded"))
        }
    }
}

async fn fetch(worker: &Worker, url: &str, method: &str, output: Option<&Path>) -> Result<()> {
    let request = Request::with_method(method, url);
    match worker.dispatch(LifecycleEvent::Fetch(request)).await? {
        EventOutcome::Responded(intercepted) => {
            let response = &intercepted.response;
            println!(
                "{} {:?} {} ({})",
                response.status,
                intercepted.source,
                intercepted.key,
                format_bytes(response.body.len())
            );
            if let Some(path) = output {
                std::fs::write(path, &response.body)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
            }
        }
        EventOutcome::Declined => println!("Declined: not a manifest resource"),
        other => anyhow::bail!("Unexpected outcome: {:?}", other),
    }
    Ok(())
}

async fn message(worker: &Worker, payload: &str) -> Result<()> {
    match worker
        .dispatch(LifecycleEvent::Message(payload.to_string()))
        .await?
    {
        EventOutcome::SkipWaiting => println!("Skip waiting signalled"),
        EventOutcome::Prefetched(keys) if keys.is_empty() => {
            println!("Everything is already cached")
        }
        EventOutcome::Prefetched(keys) => {
            println!("Downloaded {} resource(s) for offline use", keys.len())
        }
        EventOutcome::Ignored => println!("Ignored unrecognized message: {}", payload),
        other => anyhow::bail!("Unexpected outcome: {:?}", other),
    }
    Ok(())
}

async fn show_status(storage: &DiskStorage, config: &Config) -> Result<()> {
    let regions = &config.regions;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "Storage: {}", storage.root().display())?;

    for name in regions.all() {
        if !storage.has(name).await? {
            writeln!(out, "  {:<24} absent", name)?;
            continue;
        }
        let region = storage.open(name).await?;
        let keys = region.keys().await?;
        let mut bytes = 0;
        for key in &keys {
            if let Some(response) = region.get(key).await? {
                bytes += response.body.len();
            }
        }
        writeln!(
            out,
            "  {:<24} {} entries, {}",
            name,
            keys.len(),
            format_bytes(bytes)
        )?;
    }

    if storage.has(&regions.manifest).await? {
        let store = storage.open(&regions.manifest).await?;
        if let Some(record) = store.get(MANIFEST_RECORD_KEY).await? {
            let manifest = ResourceManifest::from_json(&record.text())
                .context("Stored manifest record is corrupt")?;
            writeln!(
                out,
                "Manifest record: {} resources, stored {}",
                manifest.len(),
                age_display(record.stored_at, Utc::now())
            )?;
            return Ok(());
        }
    }
    writeln!(out, "Manifest record: none (next activation is a first install)")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shellcache_core::{ActivationState, MemoryStorage, RegionNames};

    fn worker(storage: MemoryStorage) -> Worker {
        let deployment = Deployment::from_json(r#"{"resources": {"main.js": "m1"}}"#).unwrap();
        Worker::new(
            Arc::new(storage),
            Arc::new(HttpFetcher::new().unwrap()),
            Arc::new(LoggingClients),
            Arc::new(deployment),
            Origin::parse("https://app.test").unwrap(),
            RegionNames::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_activate_reports_success() {
        let worker = worker(MemoryStorage::new());
        activate(&worker).await.unwrap();
        assert_eq!(worker.state().await, ActivationState::Active);
    }

    #[tokio::test]
    async fn test_failed_activation_is_an_error() {
        let storage = MemoryStorage::new();
        storage
            .open(&RegionNames::default().manifest)
            .await
            .unwrap()
            .put(MANIFEST_RECORD_KEY, shellcache_core::Response::ok("{broken"))
            .await
            .unwrap();

        let err = activate(&worker(storage)).await.unwrap_err();
        assert!(err.to_string().contains("Activation failed"));
    }

    #[tokio::test]
    async fn test_unknown_message_is_not_an_error() {
        message(&worker(MemoryStorage::new()), "refresh").await.unwrap();
    }

    #[tokio::test]
    async fn test_foreign_request_is_declined() {
        let worker = worker(MemoryStorage::new());
        fetch(&worker, "https://elsewhere.test/x.js", "GET", None)
            .await
            .unwrap();
        fetch(&worker, "https://app.test/main.js", "POST", None)
            .await
            .unwrap();
    }
}
