use std::ops::ControlFlow;
use std::sync::Arc;

use opentelemetry::global;
use opentelemetry::metrics::Counter;
use tracing::debug;

use super::Reason;
use crate::error::SyncError;
use crate::store::CounterStore;

#[derive(Clone, Debug)]
struct AdmissionGateMetrics {
    rejections: Counter<u64>,
}

/// Decides whether a client may make another request in the current window.
///
/// The check and the increment are two separate store calls, so concurrent
/// admissions for one client may all pass the check before any of them
/// increments. The ceiling is therefore soft: it can be exceeded by at most
/// the number of requests admitted concurrently for that client.
#[derive(Clone, Debug)]
pub struct AdmissionGate {
    store: Arc<CounterStore>,
    ceiling: u64,
    instruments: AdmissionGateMetrics,
}

impl AdmissionGate {
    pub fn new(store: Arc<CounterStore>, ceiling: u64) -> Self {
        let meter = global::meter("admission_gate");
        let instruments = AdmissionGateMetrics {
            rejections: meter.u64_counter("admission_rejections").build(),
        };

        Self {
            store,
            ceiling,
            instruments,
        }
    }

    /// Admit or reject one request for `id` against the configured ceiling.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidRequest`] if `id` is empty.
    pub fn decide(&self, id: &str) -> Result<ControlFlow<Reason>, SyncError> {
        self.decide_with_ceiling(id, self.ceiling)
    }

    /// As [`AdmissionGate::decide`], against an explicit ceiling.
    pub fn decide_with_ceiling(
        &self,
        id: &str,
        ceiling: u64,
    ) -> Result<ControlFlow<Reason>, SyncError> {
        if id.is_empty() {
            return Err(SyncError::InvalidRequest);
        }

        let observed = self.store.read(id);
        debug!(id, observed, ceiling, "read counter");

        if observed >= ceiling {
            self.instruments.rejections.add(1, &[]);
            return Ok(ControlFlow::Break(Reason::QuotaExceeded { observed, ceiling }));
        }

        self.store.increment(id);
        Ok(ControlFlow::Continue(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_enforces_the_ceiling() {
        let store = Arc::new(CounterStore::new());
        let gate = AdmissionGate::new(store.clone(), 3);

        for _ in 0..3 {
            assert_eq!(gate.decide("alice").unwrap(), ControlFlow::Continue(()));
        }
        assert_eq!(
            gate.decide("alice").unwrap(),
            ControlFlow::Break(Reason::QuotaExceeded {
                observed: 3,
                ceiling: 3
            })
        );

        // Rejections do not count against the client
        assert_eq!(store.read("alice"), 3);
        assert!(gate.decide("alice").unwrap().is_break());
        assert_eq!(store.read("alice"), 3);
    }

    #[test]
    fn it_tracks_clients_independently() {
        let gate = AdmissionGate::new(Arc::new(CounterStore::new()), 1);

        assert!(gate.decide("alice").unwrap().is_continue());
        assert!(gate.decide("alice").unwrap().is_break());
        assert!(gate.decide("bob").unwrap().is_continue());
    }

    #[test]
    fn it_rejects_an_empty_id() {
        let store = Arc::new(CounterStore::new());
        let gate = AdmissionGate::new(store.clone(), 10);

        assert_eq!(gate.decide(""), Err(SyncError::InvalidRequest));
        assert_eq!(store.stats().pending_ids, 0);
    }

    #[test]
    fn test_counts_from_peers_apply() {
        let store = Arc::new(CounterStore::new());
        let gate = AdmissionGate::new(store.clone(), 5);

        store.reconcile(&[crate::ReconciliationRecord {
            id: "alice".to_string(),
            current: 3,
            delta: 2,
        }]);

        assert!(gate.decide("alice").unwrap().is_break());
    }

    #[test]
    fn test_explicit_ceiling() {
        let gate = AdmissionGate::new(Arc::new(CounterStore::new()), 1);

        assert!(gate.decide_with_ceiling("alice", 2).unwrap().is_continue());
        assert!(gate.decide_with_ceiling("alice", 2).unwrap().is_continue());
        assert!(gate.decide_with_ceiling("alice", 2).unwrap().is_break());
    }

    #[tokio::test]
    async fn test_concurrent_admissions_respect_ceiling() {
        let ceiling = 100;
        let store = Arc::new(CounterStore::new());
        let gate = Arc::new(AdmissionGate::new(store.clone(), ceiling));

        let mut handles = vec![];
        for _ in 0..ceiling + 50 {
            let gate = Arc::clone(&gate);
            handles.push(tokio::spawn(async move { gate.decide("alice") }));
        }

        let results = futures::future::join_all(handles).await;
        let admitted = results
            .into_iter()
            .filter(|r| matches!(r, Ok(Ok(ControlFlow::Continue(())))))
            .count() as u64;

        assert_eq!(store.read("alice"), admitted);
        // The default test runtime is single threaded, so no admissions overlap.
        assert_eq!(admitted, ceiling);
    }
}
