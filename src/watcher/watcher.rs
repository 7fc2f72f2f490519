//! File system watcher using notify-rs.

#![allow(clippy::used_underscore_binding)]

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use super::events::{EventSource, FileEvent};
use crate::error::WatcherError;
use crate::Result;

/// Capacity of the channel between the notify thread and the scheduler.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Recursive watcher over a single root directory.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    event_rx: mpsc::Receiver<FileEvent>,
    root: PathBuf,
}

impl FileWatcher {
    /// Start watching `root` recursively.
    ///
    /// # Errors
    ///
    /// Returns an error if the root does not exist or cannot be watched.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        if !root.is_dir() {
            return Err(WatcherError::WatchFailed {
                path: root.display().to_string(),
                reason: "directory does not exist".to_string(),
            }
            .into());
        }

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let mut watcher = notify::recommended_watcher(
            move |result: std::result::Result<Event, notify::Error>| match result {
                Ok(event) => {
                    for file_event in translate(event) {
                        if event_tx.blocking_send(file_event).is_err() {
                            // Receiver dropped during shutdown
                            return;
                        }
                    }
                }
                Err(e) => {
                    tracing::error!("Watch error: {:?}", e);
                }
            },
        )
        .map_err(|e| WatcherError::WatchFailed {
            path: root.display().to_string(),
            reason: e.to_string(),
        })?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| WatcherError::WatchFailed {
                path: root.display().to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!(path = %root.display(), "Watching directory");

        Ok(Self {
            _watcher: watcher,
            event_rx,
            root,
        })
    }

    /// The watched root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl EventSource for FileWatcher {
    async fn next_event(&mut self) -> Option<FileEvent> {
        self.event_rx.recv().await
    }
}

/// Map a raw notify event onto zero or more file events.
///
/// Reads and opens are dropped. A close after writing counts as a modification
/// so editors that write in place are still picked up.
fn translate(event: Event) -> Vec<FileEvent> {
    let Event { kind, paths, .. } = event;

    match kind {
        EventKind::Create(_) => paths.into_iter().map(FileEvent::Created).collect(),
        EventKind::Remove(_) => paths.into_iter().map(FileEvent::Deleted).collect(),
        EventKind::Modify(ModifyKind::Name(mode)) => translate_rename(mode, paths),
        EventKind::Modify(_) | EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
            paths.into_iter().map(FileEvent::Modified).collect()
        }
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

fn translate_rename(mode: RenameMode, paths: Vec<PathBuf>) -> Vec<FileEvent> {
    match mode {
        RenameMode::Both if paths.len() == 2 => {
            let mut paths = paths.into_iter();
            match (paths.next(), paths.next()) {
                (Some(from), Some(to)) => vec![FileEvent::Renamed { from, to }],
                _ => Vec::new(),
            }
        }
        RenameMode::From => paths.into_iter().map(FileEvent::Deleted).collect(),
        RenameMode::To => paths.into_iter().map(FileEvent::Created).collect(),
        // Backends that cannot tell the halves apart: decide by what is on disk now
        _ => paths
            .into_iter()
            .map(|p| {
                if p.exists() {
                    FileEvent::Created(p)
                } else {
                    FileEvent::Deleted(p)
                }
            })
            .collect(),
    }
}
