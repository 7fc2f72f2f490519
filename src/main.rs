//! Prewarm - prefix cache warmer for LLM inference servers
//!
//! Entry point for the prewarm daemon.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use prewarm::cache::HttpBackend;
use prewarm::error::WatcherError;
use prewarm::server::{init_metrics, init_tracing, shutdown_signal, StatusServer};
use prewarm::watcher::{EligibilityFilter, FileWatcher, GitignoreOracle};
use prewarm::{Config, Result, Scheduler};
use tokio_util::sync::CancellationToken;

/// Prewarm - keeps an inference server's prefix cache warm for a codebase
#[derive(Parser, Debug)]
#[command(name = "prewarm")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Root directory to watch
    #[arg(short, long, env = "WATCH_DIR", default_value = "/workspace")]
    watch_dir: PathBuf,

    /// Ignore-rule file, relative to the watch directory
    #[arg(long, env = "IGNORE_FILE", default_value = ".gitignore")]
    ignore_file: String,

    /// Base URL of the OpenAI-compatible inference server
    #[arg(short, long, env = "INFERENCE_ENDPOINT", default_value = "http://vllm:8000")]
    endpoint: String,

    /// Seconds between periodic queue flushes
    #[arg(long, env = "CACHE_FLUSH_INTERVAL", default_value = "5")]
    flush_interval: u64,

    /// Queue length that triggers an immediate flush
    #[arg(long, env = "CACHE_BATCH_SIZE", default_value = "5")]
    batch_size: usize,

    /// Largest file size in bytes that will be primed
    #[arg(long, env = "CACHE_MAX_FILE_SIZE", default_value = "100000")]
    max_file_size: u64,

    /// Extra directory names to ignore. `models` and `cache` directories are
    /// not ignored by default; list them here to skip them
    #[arg(long, env = "EXTRA_IGNORE_DIRS", value_delimiter = ',')]
    extra_ignore_dirs: Vec<String>,

    /// Seconds between readiness probes while waiting for the server
    #[arg(long, env = "HEALTH_POLL_INTERVAL", default_value = "5")]
    health_poll_interval: u64,

    /// Timeout in seconds for a single priming request
    #[arg(long, env = "REQUEST_TIMEOUT", default_value = "30")]
    request_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    /// Address for the health/status/metrics server
    #[arg(long, env = "STATUS_ADDR")]
    status_addr: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.log_json);

    tracing::info!("Prewarm v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut config = Config {
        watch_dir: cli.watch_dir,
        ignore_file: cli.ignore_file,
        endpoint: cli.endpoint,
        flush_interval: Duration::from_secs(cli.flush_interval),
        batch_size: cli.batch_size,
        max_file_size: cli.max_file_size,
        extra_ignore_dirs: cli
            .extra_ignore_dirs
            .into_iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect(),
        health_poll_interval: Duration::from_secs(cli.health_poll_interval),
        request_timeout: Duration::from_secs(cli.request_timeout),
        log_level: cli.log_level,
        log_json: cli.log_json,
        status_addr: cli.status_addr,
    };

    config.validate()?;

    // Watcher events carry canonical paths
    config.watch_dir =
        std::fs::canonicalize(&config.watch_dir).map_err(|e| WatcherError::WatchFailed {
            path: config.watch_dir.display().to_string(),
            reason: e.to_string(),
        })?;

    tracing::debug!(?config, "Configuration loaded");
    tracing::info!(
        watch_dir = %config.watch_dir.display(),
        endpoint = config.endpoint_base(),
        ignore_file = %config.ignore_path().display(),
        batch_size = config.batch_size,
        flush_interval_secs = config.flush_interval.as_secs(),
        "Configuration"
    );

    init_metrics();

    let backend = Arc::new(HttpBackend::new(
        config.endpoint_base(),
        config.request_timeout,
    )?);
    let filter = EligibilityFilter::new(
        &config.extra_ignore_dirs,
        GitignoreOracle::load(&config.watch_dir, &config.ignore_file),
    );
    let scheduler = Scheduler::new(&config, backend, filter);

    let shutdown = CancellationToken::new();

    let status_task = match config.status_addr {
        Some(addr) => {
            let server = StatusServer::bind(addr, scheduler.handle()).await?;
            Some(tokio::spawn(server.run(shutdown.clone())))
        }
        None => None,
    };

    let watcher = FileWatcher::new(&config.watch_dir)?;

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    scheduler.run(watcher, shutdown.clone()).await;

    // The scheduler can also stop because the watch was lost
    shutdown.cancel();
    if let Some(task) = status_task {
        match task.await {
            Ok(result) => result?,
            Err(e) => tracing::error!(error = %e, "Status server task failed"),
        }
    }

    tracing::info!("Prewarm stopped");
    Ok(())
}
