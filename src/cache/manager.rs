//! Pending-queue management, dedup and priming.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use super::client::{InferenceBackend, ModelInfo};
use super::request::PrimingPrompt;
use super::tokens::TokenBudget;
use crate::server::metrics;
use crate::watcher::{FileSnapshot, Fingerprint};

/// Priming lifecycle of a tracked path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheState {
    /// Never primed, or rejected by the token budget.
    #[default]
    Uncached,
    /// Waiting in the pending queue.
    Queued,
    /// A priming request is outstanding.
    InFlight,
    /// Last priming succeeded for the current content.
    Cached,
    /// Primed once, but the latest attempt for newer content failed.
    Stale,
}

/// Cache tracking for one path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheEntry {
    /// Fingerprint of the content last primed successfully.
    pub last_cached: Option<Fingerprint>,
    /// Fingerprint of the newest content admitted for this path. Only a
    /// response for this content may change `state`.
    pub latest: Option<Fingerprint>,
    pub state: CacheState,
}

impl CacheEntry {
    fn is_latest(&self, fingerprint: Fingerprint) -> bool {
        self.latest == Some(fingerprint)
    }

    /// Return to a resting state after an attempt that did not succeed.
    fn settle(&mut self) {
        self.state = if self.last_cached.is_some() {
            CacheState::Stale
        } else {
            CacheState::Uncached
        };
    }
}

/// What happened to a priming attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimeOutcome {
    /// Request succeeded.
    Primed { latency: Duration },
    /// Content already primed; nothing sent.
    AlreadyCached,
    /// No model identifier is known yet; nothing sent.
    NoModel,
    /// Estimated tokens exceed the context budget; nothing sent.
    OverBudget { tokens: usize },
    /// Request was sent and failed.
    Failed,
}

/// Counters for cache activity.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub primed: AtomicU64,
    pub failed: AtomicU64,
    pub duplicates: AtomicU64,
    pub over_budget: AtomicU64,
    pub no_model: AtomicU64,
    pub flushes: AtomicU64,
}

impl CacheStats {
    /// Get snapshot of current stats.
    #[must_use]
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            primed: self.primed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            over_budget: self.over_budget.load(Ordering::Relaxed),
            no_model: self.no_model.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of cache stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStatsSnapshot {
    pub primed: u64,
    pub failed: u64,
    pub duplicates: u64,
    pub over_budget: u64,
    pub no_model: u64,
    pub flushes: u64,
}

#[derive(Debug, Default)]
struct ModelSlot {
    info: Option<ModelInfo>,
    budget: TokenBudget,
}

/// Queue and cached-fingerprint map, always mutated together.
#[derive(Debug, Default)]
struct Pending {
    queue: VecDeque<FileSnapshot>,
    entries: HashMap<String, CacheEntry>,
}

/// Owns the pending queue and the cached-fingerprint map and sends
/// priming requests to the inference server.
///
/// The queue and the map share one lock, which is never held across a
/// network call. The count trigger in [`CacheManager::enqueue`] and the
/// periodic [`CacheManager::flush`] are not otherwise coordinated, so a
/// file may be primed by whichever runs first.
pub struct CacheManager {
    backend: Arc<dyn InferenceBackend>,
    batch_size: usize,
    model: RwLock<ModelSlot>,
    pending: Mutex<Pending>,
    stats: CacheStats,
}

impl CacheManager {
    /// Create a manager that drains at most `batch_size` files per flush.
    #[must_use]
    pub fn new(backend: Arc<dyn InferenceBackend>, batch_size: usize) -> Self {
        Self {
            backend,
            batch_size: batch_size.max(1),
            model: RwLock::new(ModelSlot::default()),
            pending: Mutex::new(Pending::default()),
            stats: CacheStats::default(),
        }
    }

    /// Query the backend for the active model and its context length.
    ///
    /// On failure the default context length stays in effect and priming
    /// is skipped until a later call succeeds. Returns whether a model is
    /// now known.
    pub async fn initialize(&self) -> bool {
        match self.backend.model_info().await {
            Ok(Some(info)) => {
                tracing::info!(
                    model = %info.id,
                    max_context_len = info.max_model_len,
                    "Using model"
                );
                let mut slot = self.model.write();
                slot.budget = TokenBudget::new(info.max_model_len);
                slot.info = Some(info);
                true
            }
            Ok(None) => {
                tracing::warn!("Backend reports no loaded models");
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to get model info");
                false
            }
        }
    }

    /// Prime the inference server's cache with one file.
    ///
    /// The snapshot becomes the current content for its path, superseding
    /// anything queued earlier.
    pub async fn prime_file(&self, snapshot: &FileSnapshot) -> PrimeOutcome {
        {
            let mut guard = self.pending.lock();
            let pending = &mut *guard;
            let path = snapshot.path();
            pending
                .entries
                .entry(path.to_string())
                .or_default()
                .latest = Some(snapshot.record.fingerprint);
            pending.queue.retain(|s| s.path() != path);
            metrics::QUEUE_DEPTH.set(gauge_value(pending.queue.len()));
        }

        self.prime(snapshot).await
    }

    /// Send one snapshot. Only the newest admitted content for a path
    /// updates its state; responses for superseded content are recorded
    /// in stats but leave the entry alone.
    async fn prime(&self, snapshot: &FileSnapshot) -> PrimeOutcome {
        let (model_id, budget) = {
            let slot = self.model.read();
            match slot.info {
                Some(ref info) => (info.id.clone(), slot.budget),
                None => {
                    self.stats.no_model.fetch_add(1, Ordering::Relaxed);
                    metrics::PRIMING_SKIPPED.with_label_values(&["no_model"]).inc();
                    return PrimeOutcome::NoModel;
                }
            }
        };

        let path = snapshot.path();
        let fingerprint = snapshot.record.fingerprint;

        {
            let mut pending = self.pending.lock();
            let entry = pending.entries.entry(path.to_string()).or_default();
            if entry.last_cached == Some(fingerprint) {
                if entry.is_latest(fingerprint) {
                    entry.state = CacheState::Cached;
                }
                drop(pending);
                tracing::debug!(path, "Already cached, skipping");
                self.stats.duplicates.fetch_add(1, Ordering::Relaxed);
                metrics::PRIMING_SKIPPED.with_label_values(&["duplicate"]).inc();
                return PrimeOutcome::AlreadyCached;
            }
        }

        let prompt = PrimingPrompt::new(snapshot);
        let tokens = prompt.estimated_tokens();

        if !budget.fits(tokens) {
            if let Some(entry) = self.pending.lock().entries.get_mut(path) {
                if entry.is_latest(fingerprint) {
                    entry.last_cached = None;
                    entry.state = CacheState::Uncached;
                }
            }
            tracing::warn!(
                path,
                tokens,
                budget = budget.effective_budget(),
                "File too large for context window, skipping"
            );
            self.stats.over_budget.fetch_add(1, Ordering::Relaxed);
            metrics::PRIMING_SKIPPED
                .with_label_values(&["over_budget"])
                .inc();
            return PrimeOutcome::OverBudget { tokens };
        }

        if let Some(entry) = self.pending.lock().entries.get_mut(path) {
            if entry.is_latest(fingerprint) {
                entry.state = CacheState::InFlight;
            }
        }

        let request = prompt.into_request(&model_id);
        let start = Instant::now();
        let result = self.backend.complete(&request).await;
        let latency = start.elapsed();

        match result {
            Ok(()) => {
                match self.pending.lock().entries.get_mut(path) {
                    Some(entry) if entry.is_latest(fingerprint) => {
                        entry.last_cached = Some(fingerprint);
                        entry.state = CacheState::Cached;
                    }
                    Some(_) => tracing::debug!(path, "Newer content admitted while priming"),
                    None => tracing::debug!(path, "File deleted while priming"),
                }
                tracing::info!(
                    path,
                    bytes = snapshot.content.len(),
                    tokens,
                    elapsed_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                    "Cached file"
                );
                self.stats.primed.fetch_add(1, Ordering::Relaxed);
                metrics::PRIMING_REQUESTS
                    .with_label_values(&["success"])
                    .inc();
                metrics::PRIMING_LATENCY.observe(latency.as_secs_f64());
                PrimeOutcome::Primed { latency }
            }
            Err(e) => {
                if let Some(entry) = self.pending.lock().entries.get_mut(path) {
                    if entry.is_latest(fingerprint) {
                        entry.settle();
                    }
                }
                tracing::error!(path, error = %e, "Failed to cache file");
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                metrics::PRIMING_REQUESTS
                    .with_label_values(&["failure"])
                    .inc();
                PrimeOutcome::Failed
            }
        }
    }

    /// Append a snapshot to the pending queue, replacing any queued
    /// snapshot of the same path.
    ///
    /// Returns `false` without queueing when the content is already
    /// primed; older queued content for the path is dropped in that case
    /// too. Reaching the batch size flushes immediately.
    pub async fn enqueue(&self, snapshot: FileSnapshot) -> bool {
        let should_flush = {
            let mut guard = self.pending.lock();
            let pending = &mut *guard;
            let path = snapshot.path();
            let fingerprint = snapshot.record.fingerprint;
            let entry = pending.entries.entry(path.to_string()).or_default();
            entry.latest = Some(fingerprint);

            let already_cached = entry.last_cached == Some(fingerprint);
            if already_cached {
                entry.state = CacheState::Cached;
            } else {
                entry.state = CacheState::Queued;
            }

            pending.queue.retain(|s| s.path() != path);
            if already_cached {
                metrics::QUEUE_DEPTH.set(gauge_value(pending.queue.len()));
                tracing::debug!(path, "Already cached, not queueing");
                return false;
            }

            pending.queue.push_back(snapshot);
            metrics::QUEUE_DEPTH.set(gauge_value(pending.queue.len()));
            pending.queue.len() >= self.batch_size
        };

        if should_flush {
            tracing::debug!(batch_size = self.batch_size, "Batch size reached, flushing");
            self.flush().await;
        }

        true
    }

    /// Prime up to `batch_size` queued files in FIFO order.
    ///
    /// Returns the number of files taken off the queue. If no model is
    /// known the model query is retried first, and the queue is left
    /// untouched when it still fails.
    pub async fn flush(&self) -> usize {
        let has_model = self.model.read().info.is_some();
        if !has_model {
            if self.queue_len() == 0 {
                return 0;
            }
            if !self.initialize().await {
                tracing::debug!(queued = self.queue_len(), "No model yet, keeping queue");
                return 0;
            }
        }

        let (batch, remaining) = {
            let mut pending = self.pending.lock();
            let take = pending.queue.len().min(self.batch_size);
            let batch: Vec<FileSnapshot> = pending.queue.drain(..take).collect();
            metrics::QUEUE_DEPTH.set(gauge_value(pending.queue.len()));
            (batch, pending.queue.len())
        };

        if batch.is_empty() {
            return 0;
        }

        tracing::debug!(count = batch.len(), remaining, "Flushing cache queue");
        for snapshot in &batch {
            self.prime(snapshot).await;
        }
        self.stats.flushes.fetch_add(1, Ordering::Relaxed);

        batch.len()
    }

    /// Drop all tracking for a deleted path, including queued snapshots.
    pub fn forget(&self, path: &str) {
        let mut pending = self.pending.lock();
        pending.entries.remove(path);
        pending.queue.retain(|s| s.path() != path);
        metrics::QUEUE_DEPTH.set(gauge_value(pending.queue.len()));
    }

    /// Current state for a path.
    #[must_use]
    pub fn entry_state(&self, path: &str) -> CacheState {
        self.pending
            .lock()
            .entries
            .get(path)
            .map_or(CacheState::Uncached, |e| e.state)
    }

    /// Fingerprint last primed for a path.
    #[must_use]
    pub fn cached_fingerprint(&self, path: &str) -> Option<Fingerprint> {
        self.pending
            .lock()
            .entries
            .get(path)
            .and_then(|e| e.last_cached)
    }

    /// Number of queued snapshots.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.pending.lock().queue.len()
    }

    /// Number of paths whose current content is primed.
    #[must_use]
    pub fn cached_count(&self) -> usize {
        self.pending
            .lock()
            .entries
            .values()
            .filter(|e| e.state == CacheState::Cached)
            .count()
    }

    /// The active model, if known.
    #[must_use]
    pub fn model(&self) -> Option<ModelInfo> {
        self.model.read().info.clone()
    }

    /// The token budget in effect.
    #[must_use]
    pub fn budget(&self) -> TokenBudget {
        self.model.read().budget
    }

    /// Activity counters.
    #[must_use]
    pub const fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

fn gauge_value(len: usize) -> i64 {
    i64::try_from(len).unwrap_or(i64::MAX)
}
