//! Last-broadcast snapshot storage

use crate::value::Snapshot;
use std::sync::{Arc, Mutex, PoisonError};

/// Holds the snapshot that was most recently broadcast
///
/// The poller is the only writer. Comparison and replacement happen under a
/// single lock acquisition, so two concurrent callers can never both observe
/// the old value and both decide to broadcast.
#[derive(Debug)]
pub struct SnapshotStore {
    current: Mutex<Arc<Snapshot>>,
}

impl SnapshotStore {
    /// Create a store holding the empty snapshot
    pub fn new() -> Self {
        Self::with_initial(Snapshot::empty())
    }

    /// Create a store seeded with a known snapshot
    pub fn with_initial(snapshot: Snapshot) -> Self {
        Self {
            current: Mutex::new(Arc::new(snapshot)),
        }
    }

    /// Replace the stored snapshot if `next` differs from it
    ///
    /// Returns the new shared snapshot when a replacement happened, or `None`
    /// when `next` is structurally equal to what is stored.
    pub fn replace_if_changed(&self, next: Snapshot) -> Option<Arc<Snapshot>> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if **current == next {
            return None;
        }
        let next = Arc::new(next);
        *current = next.clone();
        Some(next)
    }

    /// The stored snapshot
    pub fn current(&self) -> Arc<Snapshot> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}
