//! In-memory index of the last-seen fingerprint per tracked file.

use std::collections::HashMap;
use std::path::Path;

use parking_lot::Mutex;

use super::fingerprint::Fingerprint;

/// A tracked file as of its last confirmed filesystem event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Path relative to the watch root, the unique key.
    pub path: String,
    /// Fingerprint of the current content.
    pub fingerprint: Fingerprint,
    /// Language tag used when fencing the content.
    pub language: Option<&'static str>,
}

/// Result of recording a file in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexChange {
    /// Path was not tracked before.
    New,
    /// Path was tracked with a different fingerprint.
    Changed,
    /// Path was tracked with the same fingerprint.
    Unchanged,
}

impl IndexChange {
    /// Whether the file needs to be (re)primed.
    #[must_use]
    pub const fn needs_priming(self) -> bool {
        matches!(self, Self::New | Self::Changed)
    }
}

/// Mapping from relative path to last-seen record.
#[derive(Debug, Default)]
pub struct FileIndex {
    records: Mutex<HashMap<String, FileRecord>>,
}

impl FileIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a record.
    pub fn upsert(&self, record: FileRecord) -> IndexChange {
        let mut records = self.records.lock();
        match records.get_mut(&record.path) {
            Some(existing) if existing.fingerprint == record.fingerprint => {
                existing.language = record.language;
                IndexChange::Unchanged
            }
            Some(existing) => {
                *existing = record;
                IndexChange::Changed
            }
            None => {
                records.insert(record.path.clone(), record);
                IndexChange::New
            }
        }
    }

    /// Remove a single record.
    pub fn remove(&self, path: &str) -> Option<FileRecord> {
        self.records.lock().remove(path)
    }

    /// Remove every record located below `dir`, returning the removed paths.
    pub fn remove_under(&self, dir: &str) -> Vec<String> {
        let dir = Path::new(dir);
        let mut records = self.records.lock();
        let doomed: Vec<String> = records
            .keys()
            .filter(|p| {
                let p = Path::new(p.as_str());
                p != dir && p.starts_with(dir)
            })
            .cloned()
            .collect();

        for path in &doomed {
            records.remove(path);
        }
        doomed
    }

    /// Get a copy of the record for a path.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<FileRecord> {
        self.records.lock().get(path).cloned()
    }

    /// Check if a path is tracked.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.records.lock().contains_key(path)
    }

    /// Number of tracked files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Check if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// All tracked paths, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.records.lock().keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str, content: &[u8]) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            fingerprint: Fingerprint::of(content),
            language: Some("python"),
        }
    }

    #[test]
    fn test_upsert_transitions() {
        let index = FileIndex::new();
        assert!(index.is_empty());

        assert_eq!(index.upsert(record("a.py", b"x = 1")), IndexChange::New);
        assert_eq!(index.upsert(record("a.py", b"x = 1")), IndexChange::Unchanged);
        assert_eq!(index.upsert(record("a.py", b"x = 2")), IndexChange::Changed);

        assert_eq!(index.len(), 1);
        assert_eq!(
            index.get("a.py").unwrap().fingerprint,
            Fingerprint::of(b"x = 2")
        );
    }

    #[test]
    fn test_needs_priming() {
        assert!(IndexChange::New.needs_priming());
        assert!(IndexChange::Changed.needs_priming());
        assert!(!IndexChange::Unchanged.needs_priming());
    }

    #[test]
    fn test_remove() {
        let index = FileIndex::new();
        index.upsert(record("a.py", b"x"));

        assert!(index.remove("a.py").is_some());
        assert!(index.remove("a.py").is_none());
        assert!(!index.contains("a.py"));

        // Re-creation after delete is a fresh entity
        assert_eq!(index.upsert(record("a.py", b"x")), IndexChange::New);
    }

    #[test]
    fn test_remove_under_directory() {
        let index = FileIndex::new();
        index.upsert(record("pkg/a.py", b"a"));
        index.upsert(record("pkg/sub/b.py", b"b"));
        index.upsert(record("pkg_other/c.py", b"c"));
        index.upsert(record("d.py", b"d"));

        let mut removed = index.remove_under("pkg");
        removed.sort();

        assert_eq!(removed, vec!["pkg/a.py", "pkg/sub/b.py"]);
        assert_eq!(index.paths(), vec!["d.py", "pkg_other/c.py"]);
    }
}
