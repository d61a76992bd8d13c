use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;
use tracing::info;

use crate::payload::Conflicts;
use crate::payload::ReconciliationRecord;

/// Per-client counters for the current window.
///
/// The store keeps two maps behind two locks:
///
/// * `committed` holds the cluster-reconciled count. It is cleared by a window
///   reset and only ever grows otherwise.
/// * `pending` holds increments accrued on this node since the last merge. It
///   survives window resets.
///
/// Whenever both locks are needed they are taken `committed` first, then
/// `pending`, and released in reverse order. Every method that takes both
/// follows that order.
#[derive(Debug, Default)]
pub struct CounterStore {
    committed: RwLock<HashMap<String, u64>>,
    pending: RwLock<HashMap<String, u64>>,
}

/// Point-in-time sizes of the two maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    pub committed_ids: usize,
    pub pending_ids: usize,
}

impl CounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The observed count for `id`: committed plus pending, read atomically.
    pub fn read(&self, id: &str) -> u64 {
        let committed = self.committed.read();
        let pending = self.pending.read();

        committed
            .get(id)
            .copied()
            .unwrap_or(0)
            .saturating_add(pending.get(id).copied().unwrap_or(0))
    }

    /// Record one locally admitted request for `id`.
    pub fn increment(&self, id: &str) {
        let mut pending = self.pending.write();
        // Avoid allocating a key for every hit on an existing client
        match pending.get_mut(id) {
            Some(count) => *count = count.saturating_add(1),
            None => {
                pending.insert(id.to_string(), 1);
            }
        }
    }

    /// Apply a peer's pending deltas to our committed counts.
    ///
    /// For every record where our committed count is larger than the peer's
    /// `current`, our value wins: it is reported back in the returned map and
    /// the peer's data for that id is ignored. Otherwise we adopt the peer's
    /// `current` and add its delta.
    pub fn reconcile(&self, records: &[ReconciliationRecord]) -> Conflicts {
        let mut committed = self.committed.write();
        let mut conflicts = Conflicts::new();

        for record in records {
            let ours = committed.get(&record.id).copied().unwrap_or(0);
            if ours > record.current {
                conflicts.insert(record.id.clone(), ours);
            } else {
                committed.insert(
                    record.id.clone(),
                    record.current.saturating_add(record.delta),
                );
            }
        }

        debug!(
            records = records.len(),
            conflicts = conflicts.len(),
            "reconciled peer counters"
        );
        conflicts
    }

    /// Fold every pending delta into the committed counts and start a fresh
    /// pending map.
    pub fn merge_pending(&self) {
        // Cheap early out; the check is repeated under the locks.
        if self.pending.read().is_empty() {
            return;
        }

        let mut committed = self.committed.write();
        let mut pending = self.pending.write();

        if pending.is_empty() {
            return;
        }

        debug!(ids = pending.len(), "merging pending counters");

        for (id, delta) in std::mem::take(&mut *pending) {
            let count = committed.entry(id).or_insert(0);
            *count = count.saturating_add(delta);
        }
    }

    /// Start a new window: committed counts are dropped, pending deltas are
    /// left to accumulate.
    pub fn reset_window(&self) {
        let mut committed = self.committed.write();
        info!(ids = committed.len(), "resetting window counters");
        *committed = HashMap::new();
    }

    /// One record per client with a non-zero pending delta, carrying the
    /// committed value as it stands at the same instant.
    pub fn snapshot_pending(&self) -> Vec<ReconciliationRecord> {
        let committed = self.committed.read();
        let pending = self.pending.read();

        pending
            .iter()
            .filter(|(_, delta)| **delta > 0)
            .map(|(id, delta)| ReconciliationRecord {
                id: id.clone(),
                current: committed.get(id).copied().unwrap_or(0),
                delta: *delta,
            })
            .collect()
    }

    /// Raise committed counts to the values a peer claimed authority for, then
    /// drop every pending delta, including those of unrelated clients.
    pub fn absorb_conflict_winner(&self, peer_values: &Conflicts) {
        let mut committed = self.committed.write();
        let mut pending = self.pending.write();

        info!(
            ids = peer_values.len(),
            dropped = pending.len(),
            "absorbing conflicting peer counters"
        );

        for (id, value) in peer_values {
            let count = committed.entry(id.clone()).or_insert(0);
            *count = (*count).max(*value);
        }

        *pending = HashMap::new();
    }

    /// The committed count for `id`.
    pub fn committed(&self, id: &str) -> u64 {
        self.committed.read().get(id).copied().unwrap_or(0)
    }

    /// The pending delta for `id`.
    pub fn pending(&self, id: &str) -> u64 {
        self.pending.read().get(id).copied().unwrap_or(0)
    }

    pub fn stats(&self) -> StoreStats {
        let committed = self.committed.read();
        let pending = self.pending.read();
        StoreStats {
            committed_ids: committed.len(),
            pending_ids: pending.len(),
        }
    }
}
