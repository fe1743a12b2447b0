//! In-memory store of the latest snapshot per target.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use crate::metrics::Snapshot;

/// Thread-safe map from target name to its most recent snapshot.
///
/// Publishing swaps an `Arc` under a short write lock, and readers clone
/// `Arc`s under a read lock, so nobody ever sees a snapshot half-written.
/// Publishing twice under the same name keeps the last one.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    snapshots: RwLock<BTreeMap<String, Arc<Snapshot>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot stored for `name`.
    pub fn publish(&self, name: &str, snapshot: Snapshot) {
        let snapshot = Arc::new(snapshot);
        // Insert is the only mutation, so a poisoned map is still consistent.
        let mut snapshots = self
            .snapshots
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        snapshots.insert(name.to_string(), snapshot);
    }

    /// Point-in-time copy of every stored snapshot, ordered by target name.
    ///
    /// Empty until the first poll cycle has published something.
    pub fn read_all(&self) -> Vec<Arc<Snapshot>> {
        let snapshots = self.snapshots.read().unwrap_or_else(PoisonError::into_inner);
        snapshots.values().cloned().collect()
    }

    pub fn read_one(&self, name: &str) -> Option<Arc<Snapshot>> {
        let snapshots = self.snapshots.read().unwrap_or_else(PoisonError::into_inner);
        snapshots.get(name).cloned()
    }

    /// Drop snapshots for targets that are no longer configured.
    pub fn retain<'a, I>(&self, names: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let keep: HashSet<&str> = names.into_iter().collect();
        let mut snapshots = self
            .snapshots
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        snapshots.retain(|name, _| {
            let kept = keep.contains(name.as_str());
            if !kept {
                tracing::info!("Store: dropping snapshot for removed target {}", name);
            }
            kept
        });
    }

    pub fn len(&self) -> usize {
        self.snapshots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
