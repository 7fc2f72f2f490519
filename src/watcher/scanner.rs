//! Directory scanner for the initial full-tree pass.
//!
//! Walks a directory, pruning excluded directories early, and returns
//! eligible regular files in a stable order.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::WalkDir;

use super::filter::EligibilityFilter;
use crate::Result;

/// Scan statistics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanStats {
    pub files_found: u64,
    pub files_eligible: u64,
    pub files_skipped: u64,
    pub errors: u64,
}

/// Files found by a scan.
#[derive(Debug, Default)]
pub struct ScanResult {
    /// Absolute paths of eligible files, sorted.
    pub files: Vec<PathBuf>,
    pub stats: ScanStats,
}

/// Scan `start` (which must be under `root`) for eligible files.
///
/// Eligibility is judged on paths relative to `root`.
#[must_use]
pub fn scan_tree(root: &Path, start: &Path, filter: &EligibilityFilter) -> ScanResult {
    let mut result = ScanResult::default();

    tracing::debug!(path = %start.display(), "Starting directory scan");

    let walker = WalkDir::new(start)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            entry
                .path()
                .strip_prefix(root)
                .map_or(true, |rel| !filter.is_excluded_dir(rel))
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "Error walking directory");
                result.stats.errors += 1;
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        result.stats.files_found += 1;

        let eligible = entry
            .path()
            .strip_prefix(root)
            .is_ok_and(|rel| filter.is_eligible(rel));

        if eligible {
            result.stats.files_eligible += 1;
            result.files.push(entry.into_path());
        } else {
            result.stats.files_skipped += 1;
        }
    }

    tracing::debug!(
        path = %start.display(),
        found = result.stats.files_found,
        eligible = result.stats.files_eligible,
        skipped = result.stats.files_skipped,
        errors = result.stats.errors,
        "Directory scan complete"
    );

    result
}

/// Async version of [`scan_tree`], run on the blocking pool.
///
/// # Errors
///
/// Returns an error if the scan task panics or is cancelled.
pub async fn scan_tree_async(
    root: &Path,
    start: &Path,
    filter: Arc<EligibilityFilter>,
) -> Result<ScanResult> {
    let root = root.to_path_buf();
    let start = start.to_path_buf();

    tokio::task::spawn_blocking(move || scan_tree(&root, &start, &filter))
        .await
        .map_err(|e| crate::Error::internal(format!("Scan task failed: {e}")))
}
