use lpvres_predicate::ClusterSnapshot;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Latest cluster snapshot shared between the syncer and request handlers
///
/// Readers get an `Arc` to a complete snapshot; a refresh swaps in a new one
/// and never touches a snapshot a reader still holds.
#[derive(Debug, Default)]
pub struct ClusterCache {
    snapshot: RwLock<Arc<ClusterSnapshot>>,
    synced: AtomicBool,
}

impl ClusterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The snapshot to evaluate one request against
    pub fn current(&self) -> Arc<ClusterSnapshot> {
        Arc::clone(&self.snapshot.read())
    }

    /// Publish a new snapshot and mark the cache as synced
    pub fn replace(&self, snapshot: ClusterSnapshot) {
        *self.snapshot.write() = Arc::new(snapshot);
        self.synced.store(true, Ordering::Release);
    }

    /// Whether at least one snapshot has been published
    pub fn has_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }
}
