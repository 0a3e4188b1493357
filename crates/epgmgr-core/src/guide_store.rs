//! `GuideStore` - atomically swapped guide snapshot for one station.

use std::sync::Arc;

use tokio::sync::watch;

use crate::models::Show;

/// Immutable guide snapshot.
pub type Guide = Arc<[Show]>;

/// Holds the current guide of one station.
///
/// The guide is never mutated in place. [`GuideStore::replace`] swaps the
/// whole snapshot, so a reader either sees the old guide or the new one.
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub struct GuideStore {
    tx: watch::Sender<Guide>,
}

impl GuideStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Guide::from(Vec::new()));
        Self { tx }
    }

    /// Replaces the guide wholesale.
    pub fn replace(&self, shows: Vec<Show>) {
        self.tx.send_replace(Guide::from(shows));
    }

    /// Returns the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Guide {
        self.tx.borrow().clone()
    }

    /// Read-only handle that observes future swaps.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Guide> {
        self.tx.subscribe()
    }
}

impl Default for GuideStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::indexing_slicing)]

    use super::*;
    use crate::test_support::show;

    #[test]
    fn test_starts_empty() {
        // Arrange & Act
        let store = GuideStore::new();

        // Assert
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_replace_keeps_old_snapshot_intact() {
        // Arrange
        let store = GuideStore::new();
        store.replace(vec![show("A", 9, 0, 60)]);
        let before = store.snapshot();

        // Act
        store.replace(vec![show("B", 10, 0, 60), show("C", 11, 0, 60)]);

        // Assert
        assert_eq!(before.len(), 1);
        assert_eq!(before[0].title, "A");
        let after = store.snapshot();
        assert_eq!(after.len(), 2);
        assert_eq!(after[0].title, "B");
    }

    #[test]
    fn test_watch_observes_replace() {
        // Arrange
        let store = GuideStore::new();
        let mut rx = store.watch();

        // Act
        store.replace(vec![show("A", 9, 0, 60)]);

        // Assert
        assert!(rx.has_changed().unwrap_or(false));
        assert_eq!(rx.borrow_and_update().len(), 1);
    }
}
