//! Pipeline lifecycle: wait for the backend, scan the tree, then watch.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::cache::{CacheManager, CacheStatsSnapshot, InferenceBackend, ModelInfo, PrimeOutcome};
use crate::config::Config;
use crate::server::metrics;
use crate::server::observability::spans;
use crate::watcher::{
    load_snapshot, relative_path, scan_tree_async, EligibilityFilter, EventHandler, EventSource,
    FileIndex, WatcherStats, WatcherStatsSnapshot,
};

/// Where the scheduler is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    #[default]
    Starting,
    WaitingForBackend,
    Scanning,
    Watching,
    Stopped,
}

impl LifecycleState {
    /// Short name used in logs and the health endpoint.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::WaitingForBackend => "waiting_for_backend",
            Self::Scanning => "scanning",
            Self::Watching => "watching",
            Self::Stopped => "stopped",
        }
    }
}

/// Point-in-time view of the whole pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub version: &'static str,
    pub state: LifecycleState,
    pub model: Option<ModelInfo>,
    pub tracked_files: usize,
    pub cached_files: usize,
    pub queue_len: usize,
    pub cache: CacheStatsSnapshot,
    pub watcher: WatcherStatsSnapshot,
}

/// Cloneable read access to a running scheduler.
#[derive(Clone)]
pub struct PipelineHandle {
    state: Arc<Mutex<LifecycleState>>,
    index: Arc<FileIndex>,
    cache: Arc<CacheManager>,
    watcher_stats: Arc<WatcherStats>,
}

impl PipelineHandle {
    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// The shared file index.
    #[must_use]
    pub fn index(&self) -> &Arc<FileIndex> {
        &self.index
    }

    /// The shared cache manager.
    #[must_use]
    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    /// Collect a status report.
    #[must_use]
    pub fn report(&self) -> StatusReport {
        StatusReport {
            version: env!("CARGO_PKG_VERSION"),
            state: self.state(),
            model: self.cache.model(),
            tracked_files: self.index.len(),
            cached_files: self.cache.cached_count(),
            queue_len: self.cache.queue_len(),
            cache: self.cache.stats().snapshot(),
            watcher: self.watcher_stats.snapshot(),
        }
    }
}

/// Owns the pipeline components and drives them through the lifecycle.
pub struct Scheduler {
    root: PathBuf,
    flush_interval: Duration,
    health_poll_interval: Duration,
    max_file_size: u64,
    backend: Arc<dyn InferenceBackend>,
    filter: Arc<EligibilityFilter>,
    handler: EventHandler,
    handle: PipelineHandle,
}

impl Scheduler {
    /// Build the pipeline for `config.watch_dir`.
    #[must_use]
    pub fn new(
        config: &Config,
        backend: Arc<dyn InferenceBackend>,
        filter: EligibilityFilter,
    ) -> Self {
        let filter = Arc::new(filter);
        let index = Arc::new(FileIndex::new());
        let cache = Arc::new(CacheManager::new(
            Arc::clone(&backend),
            config.batch_size,
        ));
        let handler = EventHandler::new(
            config.watch_dir.clone(),
            Arc::clone(&filter),
            Arc::clone(&index),
            Arc::clone(&cache),
            config.max_file_size,
        );

        let handle = PipelineHandle {
            state: Arc::new(Mutex::new(LifecycleState::Starting)),
            index,
            cache,
            watcher_stats: handler.stats(),
        };

        Self {
            root: config.watch_dir.clone(),
            flush_interval: config.flush_interval,
            health_poll_interval: config.health_poll_interval,
            max_file_size: config.max_file_size,
            backend,
            filter,
            handler,
            handle,
        }
    }

    /// Read access for the status endpoint and tests.
    #[must_use]
    pub fn handle(&self) -> PipelineHandle {
        self.handle.clone()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.handle.state()
    }

    fn set_state(&self, state: LifecycleState) {
        let previous = std::mem::replace(&mut *self.handle.state.lock(), state);
        if previous != state {
            tracing::info!(from = previous.as_str(), to = state.as_str(), "Lifecycle");
        }
    }

    /// Run until `shutdown` is cancelled or the event source closes.
    ///
    /// Events that arrive during the initial scan stay buffered in the
    /// source and are applied once watching starts.
    pub async fn run<S: EventSource>(self, mut source: S, shutdown: CancellationToken) {
        self.set_state(LifecycleState::WaitingForBackend);
        if !self.wait_for_backend(&shutdown).await {
            drop(source);
            self.set_state(LifecycleState::Stopped);
            return;
        }

        self.handle.cache.initialize().await;

        self.set_state(LifecycleState::Scanning);
        self.initial_scan(&shutdown).await;
        if shutdown.is_cancelled() {
            drop(source);
            self.set_state(LifecycleState::Stopped);
            return;
        }

        self.set_state(LifecycleState::Watching);

        let flush_token = shutdown.child_token();
        let flush_task = tokio::spawn(flush_loop(
            Arc::clone(&self.handle.cache),
            self.flush_interval,
            flush_token.clone(),
        ));

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    tracing::info!("Shutdown requested, stopping watcher");
                    break;
                }
                event = source.next_event() => match event {
                    Some(event) => {
                        let span = spans::event_span(event.kind(), &event.path().display().to_string());
                        self.handler.handle(event).instrument(span).await;
                    }
                    None => {
                        tracing::warn!("Event source closed");
                        break;
                    }
                },
            }
        }

        drop(source);
        flush_token.cancel();
        if let Err(e) = flush_task.await {
            tracing::error!(error = %e, "Flush task failed");
        }

        self.set_state(LifecycleState::Stopped);
    }

    /// Poll the backend until it reports ready. Returns `false` on shutdown.
    async fn wait_for_backend(&self, shutdown: &CancellationToken) -> bool {
        loop {
            if self.backend.health().await {
                tracing::info!("Inference server is ready");
                return true;
            }

            tracing::info!(
                retry_in_secs = self.health_poll_interval.as_secs_f64(),
                "Waiting for inference server"
            );

            tokio::select! {
                () = shutdown.cancelled() => return false,
                () = tokio::time::sleep(self.health_poll_interval) => {}
            }
        }
    }

    /// Prime every eligible file under the root, bypassing the queue.
    async fn initial_scan(&self, shutdown: &CancellationToken) {
        let span = spans::scan_span(&self.root.display().to_string());
        let result = match scan_tree_async(&self.root, &self.root, Arc::clone(&self.filter))
            .instrument(span)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "Initial scan failed");
                return;
            }
        };

        tracing::info!(
            found = result.stats.files_found,
            eligible = result.stats.files_eligible,
            skipped = result.stats.files_skipped,
            "Initial scan found files"
        );

        let mut primed = 0usize;
        let mut queued = 0usize;
        for path in &result.files {
            if shutdown.is_cancelled() {
                tracing::info!("Shutdown during initial scan");
                break;
            }

            let Some(rel) = relative_path(&self.root, path) else {
                continue;
            };

            let snapshot = match load_snapshot(path, &rel, self.max_file_size).await {
                Ok(Some(snapshot)) => snapshot,
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(path = %rel, error = %e, "Failed to read file");
                    continue;
                }
            };

            if !self
                .handle
                .index
                .upsert(snapshot.record.clone())
                .needs_priming()
            {
                continue;
            }

            match self.handle.cache.prime_file(&snapshot).await {
                PrimeOutcome::Primed { .. } => primed += 1,
                // Picked up by the periodic flush once the model is known
                PrimeOutcome::NoModel => {
                    if self.handle.cache.enqueue(snapshot).await {
                        queued += 1;
                    }
                }
                _ => {}
            }
        }

        metrics::FILES_TRACKED.set(i64::try_from(self.handle.index.len()).unwrap_or(i64::MAX));
        tracing::info!(
            primed,
            queued,
            tracked = self.handle.index.len(),
            "Initial scan complete"
        );
    }
}

/// Flush the cache queue every `period` until cancelled.
async fn flush_loop(cache: Arc<CacheManager>, period: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let flushed = cache.flush().await;
                if flushed > 0 {
                    tracing::debug!(flushed, "Periodic flush");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::testing::RecordingBackend;
    use crate::cache::CacheState;
    use crate::watcher::{FileEvent, GitignoreOracle};
    use std::fs;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    async fn wait_until(what: &str, cond: impl Fn() -> bool) {
        let waited = tokio::time::timeout(Duration::from_secs(5), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(waited.is_ok(), "timed out waiting for {what}");
    }

    fn scheduler_for(root: &std::path::Path, backend: Arc<RecordingBackend>) -> Scheduler {
        let config = Config {
            watch_dir: root.to_path_buf(),
            flush_interval: Duration::from_millis(50),
            health_poll_interval: Duration::from_millis(10),
            ..Config::default()
        };
        let filter = EligibilityFilter::new(
            &config.extra_ignore_dirs,
            GitignoreOracle::load(root, &config.ignore_file),
        );
        Scheduler::new(&config, backend, filter)
    }

    #[tokio::test]
    async fn test_end_to_end_scan_then_modify() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a.py");
        fs::write(&a, "def greet(name):\n    return \"hello here, \" + name\n").unwrap();
        assert_eq!(fs::metadata(&a).unwrap().len(), 50);
        fs::write(tmp.path().join("b.bin"), [0u8, 1, 2, 3]).unwrap();

        let backend = RecordingBackend::new("qwen", 8192);
        let scheduler = scheduler_for(tmp.path(), backend.clone());
        let handle = scheduler.handle();
        let (tx, rx) = mpsc::channel(16);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(scheduler.run(rx, shutdown.clone()));

        wait_until("watching", || handle.state() == LifecycleState::Watching).await;
        assert_eq!(backend.primed_paths(), vec!["a.py"]);
        assert!(!handle.index().contains("b.bin"));

        fs::write(&a, "def greet(name):\n    return name\n").unwrap();
        tx.send(FileEvent::Modified(a)).await.unwrap();

        wait_until("second priming", || backend.request_count() == 2).await;
        assert_eq!(backend.primed_paths(), vec!["a.py", "a.py"]);
        let last = backend.requests().pop().unwrap();
        assert!(last.messages[0].content.contains("return name"));
        assert_eq!(handle.cache().entry_state("a.py"), CacheState::Cached);

        shutdown.cancel();
        task.await.unwrap();
        assert_eq!(handle.state(), LifecycleState::Stopped);
        assert_eq!(backend.request_count(), 2);
    }

    #[tokio::test]
    async fn test_waits_for_backend_until_shutdown() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.py"), "print(1)").unwrap();

        let backend = RecordingBackend::new("qwen", 8192);
        backend.set_healthy(false);
        let scheduler = scheduler_for(tmp.path(), backend.clone());
        let handle = scheduler.handle();
        let (_tx, rx) = mpsc::channel::<FileEvent>(16);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(scheduler.run(rx, shutdown.clone()));

        wait_until("repeated probes", || backend.health_checks() >= 3).await;
        assert_eq!(handle.state(), LifecycleState::WaitingForBackend);

        shutdown.cancel();
        task.await.unwrap();
        assert_eq!(handle.state(), LifecycleState::Stopped);
        assert_eq!(backend.request_count(), 0);
        assert!(handle.index().is_empty());
    }

    #[tokio::test]
    async fn test_backend_recovers_and_scan_proceeds() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.py"), "print(1)").unwrap();

        let backend = RecordingBackend::new("qwen", 8192);
        backend.set_healthy(false);
        let scheduler = scheduler_for(tmp.path(), backend.clone());
        let handle = scheduler.handle();
        let (_tx, rx) = mpsc::channel::<FileEvent>(16);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(scheduler.run(rx, shutdown.clone()));

        wait_until("first probe", || backend.health_checks() >= 1).await;
        backend.set_healthy(true);

        wait_until("watching", || handle.state() == LifecycleState::Watching).await;
        assert_eq!(backend.primed_paths(), vec!["a.py"]);

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_no_model_queues_until_model_appears() {
        let tmp = TempDir::new().unwrap();
        let backend = RecordingBackend::without_model();
        let scheduler = scheduler_for(tmp.path(), backend.clone());
        let handle = scheduler.handle();
        let (tx, rx) = mpsc::channel(16);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(scheduler.run(rx, shutdown.clone()));

        wait_until("watching", || handle.state() == LifecycleState::Watching).await;

        let path = tmp.path().join("late.rs");
        fs::write(&path, "fn late() {}").unwrap();
        tx.send(FileEvent::Created(path)).await.unwrap();
        wait_until("queued", || handle.cache().queue_len() == 1).await;

        // Periodic flushes keep the queue while no model is known
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(handle.cache().queue_len(), 1);
        assert_eq!(backend.request_count(), 0);

        backend.set_model(Some(("qwen", 8192)));
        wait_until("primed", || backend.request_count() == 1).await;
        assert_eq!(handle.cache().queue_len(), 0);

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_scanned_files_primed_once_model_appears() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.py"), "print('a')\n").unwrap();

        let backend = RecordingBackend::without_model();
        let scheduler = scheduler_for(tmp.path(), backend.clone());
        let handle = scheduler.handle();
        let (_tx, rx) = mpsc::channel::<FileEvent>(16);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(scheduler.run(rx, shutdown.clone()));

        wait_until("watching", || handle.state() == LifecycleState::Watching).await;
        assert!(handle.index().contains("a.py"));
        assert_eq!(handle.cache().queue_len(), 1);
        assert_eq!(handle.cache().entry_state("a.py"), CacheState::Queued);
        assert_eq!(backend.request_count(), 0);

        backend.set_model(Some(("qwen", 8192)));
        wait_until("scanned file primed", || backend.request_count() == 1).await;
        assert_eq!(backend.primed_paths(), vec!["a.py"]);
        wait_until("cached", || {
            handle.cache().entry_state("a.py") == CacheState::Cached
        })
        .await;

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_source_close_stops_scheduler() {
        let tmp = TempDir::new().unwrap();
        let backend = RecordingBackend::new("qwen", 8192);
        let scheduler = scheduler_for(tmp.path(), backend);
        let handle = scheduler.handle();
        let (tx, rx) = mpsc::channel::<FileEvent>(16);
        drop(tx);

        scheduler.run(rx, CancellationToken::new()).await;
        assert_eq!(handle.state(), LifecycleState::Stopped);
    }

    #[test]
    fn test_status_report_serializes_state() {
        let tmp = TempDir::new().unwrap();
        let scheduler = scheduler_for(tmp.path(), RecordingBackend::new("qwen", 8192));
        let report = serde_json::to_value(scheduler.handle().report()).unwrap();

        assert_eq!(report["state"], "starting");
        assert_eq!(report["tracked_files"], 0);
        assert!(report["model"].is_null());
    }
}
