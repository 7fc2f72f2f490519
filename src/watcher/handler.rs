//! File change event handler.
//!
//! Applies filesystem events to the file index and feeds changed files
//! to the cache manager.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use super::events::FileEvent;
use super::filter::EligibilityFilter;
use super::index::FileIndex;
use super::scanner::scan_tree_async;
use super::snapshot::{load_snapshot, relative_path};
use crate::cache::CacheManager;
use crate::server::metrics;

/// Statistics for file watching.
#[derive(Debug, Default)]
pub struct WatcherStats {
    pub files_detected: AtomicU64,
    pub files_filtered: AtomicU64,
    pub files_enqueued: AtomicU64,
    pub files_deleted: AtomicU64,
    pub errors: AtomicU64,
}

impl WatcherStats {
    /// Create new stats tracker.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Get snapshot of current stats.
    #[must_use]
    pub fn snapshot(&self) -> WatcherStatsSnapshot {
        WatcherStatsSnapshot {
            files_detected: self.files_detected.load(Ordering::Relaxed),
            files_filtered: self.files_filtered.load(Ordering::Relaxed),
            files_enqueued: self.files_enqueued.load(Ordering::Relaxed),
            files_deleted: self.files_deleted.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of watcher stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WatcherStatsSnapshot {
    pub files_detected: u64,
    pub files_filtered: u64,
    pub files_enqueued: u64,
    pub files_deleted: u64,
    pub errors: u64,
}

/// Event handler that filters, fingerprints and tracks file changes.
pub struct EventHandler {
    root: PathBuf,
    filter: Arc<EligibilityFilter>,
    index: Arc<FileIndex>,
    cache: Arc<CacheManager>,
    max_file_size: u64,
    stats: Arc<WatcherStats>,
}

impl EventHandler {
    /// Create a new event handler for the tree at `root`.
    #[must_use]
    pub fn new(
        root: impl Into<PathBuf>,
        filter: Arc<EligibilityFilter>,
        index: Arc<FileIndex>,
        cache: Arc<CacheManager>,
        max_file_size: u64,
    ) -> Self {
        Self {
            root: root.into(),
            filter,
            index,
            cache,
            max_file_size,
            stats: WatcherStats::new(),
        }
    }

    /// Apply one filesystem event.
    pub async fn handle(&self, event: FileEvent) {
        self.stats.files_detected.fetch_add(1, Ordering::Relaxed);
        let kind = event.kind();

        match event {
            FileEvent::Created(path) | FileEvent::Modified(path) => {
                self.admit(&path, kind).await;
            }
            FileEvent::Deleted(path) => self.remove(&path),
            FileEvent::Renamed { from, to } => {
                self.remove(&from);
                self.admit(&to, kind).await;
            }
        }
    }

    /// Admit a created or modified path, expanding directories.
    async fn admit(&self, path: &Path, kind: &'static str) {
        if path.is_dir() {
            self.admit_dir(path, kind).await;
        } else {
            self.admit_file(path, kind).await;
        }
    }

    /// Re-read a file and enqueue it if its content changed.
    async fn admit_file(&self, path: &Path, kind: &'static str) {
        let Some(rel) = self.relativize(path) else {
            return;
        };

        if !self.filter.is_eligible(Path::new(&rel)) {
            tracing::debug!(path = %rel, "Ignoring ineligible path");
            self.stats.files_filtered.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let snapshot = match load_snapshot(path, &rel, self.max_file_size).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                self.stats.files_filtered.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Err(e) => {
                tracing::error!(path = %rel, error = %e, "Failed to read file");
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        let change = self.index.upsert(snapshot.record.clone());
        metrics::FILES_TRACKED.set(i64::try_from(self.index.len()).unwrap_or(i64::MAX));

        if !change.needs_priming() {
            tracing::debug!(path = %rel, "Content unchanged");
            return;
        }

        tracing::info!(
            path = %rel,
            kind,
            fingerprint = %snapshot.record.fingerprint.short(),
            "File changed"
        );

        if self.cache.enqueue(snapshot).await {
            self.stats.files_enqueued.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// A directory appeared (created or moved in): admit every eligible file below it.
    async fn admit_dir(&self, dir: &Path, kind: &'static str) {
        if let Some(rel) = self.relativize(dir) {
            if self.filter.is_excluded_dir(Path::new(&rel)) {
                return;
            }
        }

        match scan_tree_async(&self.root, dir, Arc::clone(&self.filter)).await {
            Ok(result) => {
                for file in result.files {
                    self.admit_file(&file, kind).await;
                }
            }
            Err(e) => {
                tracing::error!(path = %dir.display(), error = %e, "Failed to scan directory");
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Drop a deleted path (and anything tracked below it) from all state.
    fn remove(&self, path: &Path) {
        let Some(rel) = self.relativize(path) else {
            return;
        };

        let mut removed = 0;
        if self.index.remove(&rel).is_some() {
            removed += 1;
        }
        self.cache.forget(&rel);

        for child in self.index.remove_under(&rel) {
            self.cache.forget(&child);
            removed += 1;
        }

        if removed > 0 {
            tracing::info!(path = %rel, files = removed, "File deleted");
            self.stats
                .files_deleted
                .fetch_add(removed, Ordering::Relaxed);
            metrics::FILES_TRACKED.set(i64::try_from(self.index.len()).unwrap_or(i64::MAX));
        }
    }

    fn relativize(&self, path: &Path) -> Option<String> {
        relative_path(&self.root, path)
    }

    /// The shared file index.
    #[must_use]
    pub fn index(&self) -> &Arc<FileIndex> {
        &self.index
    }

    /// Get current stats.
    #[must_use]
    pub fn stats(&self) -> Arc<WatcherStats> {
        Arc::clone(&self.stats)
    }
}
