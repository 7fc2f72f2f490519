//! Reading a file into a fingerprinted snapshot.

use std::path::Path;

use tokio::io::AsyncReadExt;

use super::filter::EligibilityFilter;
use super::fingerprint::{Fingerprinter, CHUNK_SIZE};
use super::index::FileRecord;
use crate::error::WatcherError;
use crate::Result;

/// A file record together with the content it was fingerprinted from.
///
/// Queued snapshots carry their content, so a later snapshot of the same
/// path supersedes an earlier one without re-reading the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSnapshot {
    pub record: FileRecord,
    pub content: String,
}

impl FileSnapshot {
    /// Relative path of the snapshotted file.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.record.path
    }
}

/// Path of `path` relative to `root`, or `None` for the root itself and
/// anything outside it.
#[must_use]
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    if rel.as_os_str().is_empty() {
        return None;
    }
    Some(rel.to_string_lossy().into_owned())
}

/// Read `path` and build a snapshot keyed by `rel_path`.
///
/// Returns `Ok(None)` when the path is not a regular file or is larger
/// than `max_file_size`. Content is streamed through the fingerprinter in
/// bounded chunks; invalid UTF-8 is replaced rather than rejected.
///
/// # Errors
///
/// Returns an error if the file cannot be inspected or read.
pub async fn load_snapshot(
    path: &Path,
    rel_path: &str,
    max_file_size: u64,
) -> Result<Option<FileSnapshot>> {
    let process_failed = |e: std::io::Error| WatcherError::ProcessFailed {
        path: rel_path.to_string(),
        reason: e.to_string(),
    };

    let metadata = tokio::fs::metadata(path).await.map_err(process_failed)?;
    if !metadata.is_file() {
        return Ok(None);
    }

    if metadata.len() > max_file_size {
        tracing::debug!(path = rel_path, size = metadata.len(), "Skipping large file");
        return Ok(None);
    }

    let mut file = tokio::fs::File::open(path).await.map_err(process_failed)?;
    let mut hasher = Fingerprinter::new();
    let mut bytes = Vec::with_capacity(usize::try_from(metadata.len()).unwrap_or(0));
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = file.read(&mut buf).await.map_err(process_failed)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        bytes.extend_from_slice(&buf[..n]);

        // File grew past the limit while being read
        if bytes.len() as u64 > max_file_size {
            tracing::debug!(path = rel_path, "File grew past size limit during read");
            return Ok(None);
        }
    }

    let record = FileRecord {
        path: rel_path.to_string(),
        fingerprint: hasher.finish(),
        language: EligibilityFilter::detect_language(Path::new(rel_path)),
    };

    Ok(Some(FileSnapshot {
        record,
        content: String::from_utf8_lossy(&bytes).into_owned(),
    }))
}
