//! File system event types and the event source capability.

#![allow(clippy::missing_const_for_fn)]

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::mpsc;

/// File system event types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    /// File was created.
    Created(PathBuf),
    /// File content or metadata changed.
    Modified(PathBuf),
    /// File (or directory) was deleted.
    Deleted(PathBuf),
    /// File was renamed from old path to new path.
    Renamed { from: PathBuf, to: PathBuf },
}

impl FileEvent {
    /// Get the primary path associated with this event.
    #[must_use]
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::Created(p) | Self::Modified(p) | Self::Deleted(p) => p,
            Self::Renamed { to, .. } => to,
        }
    }

    /// Short name of the event kind for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Created(_) => "create",
            Self::Modified(_) => "modify",
            Self::Deleted(_) => "delete",
            Self::Renamed { .. } => "move",
        }
    }
}

/// Source of filesystem events for a watched tree.
///
/// Events for the same path arrive in the order they happened. Returning
/// `None` means the source has closed and no further events will follow.
#[async_trait]
pub trait EventSource: Send {
    /// Wait for the next event.
    async fn next_event(&mut self) -> Option<FileEvent>;
}

#[async_trait]
impl EventSource for mpsc::Receiver<FileEvent> {
    async fn next_event(&mut self) -> Option<FileEvent> {
        self.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_path() {
        let created = FileEvent::Created(PathBuf::from("/test/new.rs"));
        assert_eq!(created.path(), &PathBuf::from("/test/new.rs"));

        let deleted = FileEvent::Deleted(PathBuf::from("/test/removed.rs"));
        assert_eq!(deleted.path(), &PathBuf::from("/test/removed.rs"));

        let renamed = FileEvent::Renamed {
            from: PathBuf::from("/old.rs"),
            to: PathBuf::from("/new.rs"),
        };
        assert_eq!(renamed.path(), &PathBuf::from("/new.rs"));
    }

    #[test]
    fn test_event_kind() {
        assert_eq!(FileEvent::Created(PathBuf::from("a")).kind(), "create");
        assert_eq!(FileEvent::Modified(PathBuf::from("a")).kind(), "modify");
        assert_eq!(FileEvent::Deleted(PathBuf::from("a")).kind(), "delete");
        let renamed = FileEvent::Renamed {
            from: PathBuf::from("a"),
            to: PathBuf::from("b"),
        };
        assert_eq!(renamed.kind(), "move");
    }

    #[tokio::test]
    async fn test_channel_event_source() {
        let (tx, mut rx) = mpsc::channel(4);
        tx.send(FileEvent::Modified(PathBuf::from("/a.rs")))
            .await
            .unwrap();
        drop(tx);

        assert_eq!(
            rx.next_event().await,
            Some(FileEvent::Modified(PathBuf::from("/a.rs")))
        );
        assert_eq!(rx.next_event().await, None);
    }
}
