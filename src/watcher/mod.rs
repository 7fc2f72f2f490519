//! File system watching and change detection.
//!
//! This module provides:
//! - Directory watching using notify-rs
//! - Gitignore-aware eligibility filtering
//! - Content fingerprinting and the file index
//! - Initial tree scanning

mod events;
mod filter;
mod fingerprint;
mod handler;
mod index;
mod scanner;
mod snapshot;
#[allow(clippy::module_inception)]
mod watcher;

pub use events::{EventSource, FileEvent};
pub use filter::{EligibilityFilter, GitignoreOracle, IgnoreOracle};
pub use fingerprint::{Fingerprint, Fingerprinter, CHUNK_SIZE};
pub use handler::{EventHandler, WatcherStats, WatcherStatsSnapshot};
pub use index::{FileIndex, FileRecord, IndexChange};
pub use scanner::{scan_tree, scan_tree_async, ScanResult, ScanStats};
pub use snapshot::{load_snapshot, relative_path, FileSnapshot};
pub use watcher::FileWatcher;
