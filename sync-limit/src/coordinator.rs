use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::Counter;
use tokio::time::timeout;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::clock::WindowClock;
use crate::error::SyncError;
use crate::payload::Conflicts;
use crate::payload::SyncRequest;
use crate::store::CounterStore;
use crate::transport::ClusterTransport;
use crate::transport::PeerReply;
use crate::transport::STATUS_CONFLICT;
use crate::transport::STATUS_OK;

#[derive(Clone, Debug)]
struct SyncCoordinatorMetrics {
    rounds: Counter<u64>,
    peer_failures: Counter<u64>,
    conflicts: Counter<u64>,
}

/// How one peer's part of a round ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerOutcome {
    /// The peer absorbed our deltas.
    Accepted,
    /// The peer's counts won for this many ids and were absorbed locally.
    Conflict(usize),
    /// The peer was not reconciled this round.
    Failed(SyncError),
}

/// Summary of one reconciliation round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundReport {
    /// Number of records sent to each peer.
    pub records: usize,
    pub accepted: usize,
    /// Number of peers that answered with a conflict.
    pub conflicts: usize,
    /// Ids whose winning counts were absorbed, summed over conflicting peers.
    pub absorbed: usize,
    pub failures: Vec<SyncError>,
}

impl RoundReport {
    /// True when there was nothing pending and no peer was contacted.
    pub fn is_idle(&self) -> bool {
        self.records == 0
    }
}

/// Pushes this node's pending deltas to every peer and applies what comes back.
pub struct SyncCoordinator<T> {
    store: Arc<CounterStore>,
    transport: T,
    peers: Vec<String>,
    peer_timeout: Duration,
    clock: Arc<dyn WindowClock>,
    instruments: SyncCoordinatorMetrics,
}

impl<T> SyncCoordinator<T>
where
    T: ClusterTransport,
{
    pub fn new(
        store: Arc<CounterStore>,
        transport: T,
        peers: Vec<String>,
        peer_timeout: Duration,
        clock: Arc<dyn WindowClock>,
    ) -> Self {
        let meter = global::meter("sync_coordinator");
        let instruments = SyncCoordinatorMetrics {
            rounds: meter.u64_counter("sync_rounds").build(),
            peer_failures: meter.u64_counter("peer_failures").build(),
            conflicts: meter.u64_counter("conflicts_absorbed").build(),
        };

        Self {
            store,
            transport,
            peers,
            peer_timeout,
            clock,
            instruments,
        }
    }

    pub fn peers(&self) -> &[String] {
        &self.peers
    }

    /// Run one reconciliation round.
    ///
    /// Peers are contacted concurrently, each bounded by the peer timeout. A
    /// failing peer never affects the others and is never retried within the
    /// round: its deltas stay pending locally until the caller merges.
    ///
    /// # Errors
    ///
    /// Only [`SyncError::SerializationFailure`] aborts a round. Peer faults are
    /// reported in the returned [`RoundReport`].
    pub async fn run_round(&self) -> Result<RoundReport, SyncError> {
        let values = self.store.snapshot_pending();
        if values.is_empty() {
            return Ok(RoundReport::default());
        }

        let records = values.len();
        let request = SyncRequest::new(self.clock.second_of_minute(), values);
        let payload = serde_json::to_vec(&request)
            .map_err(|e| SyncError::SerializationFailure(e.to_string()))?;

        self.instruments.rounds.add(1, &[]);
        info!(records, peers = ?self.peers, "syncing counters with cluster members");

        let outcomes = join_all(
            self.peers
                .iter()
                .map(|peer| self.sync_peer(peer, &payload)),
        )
        .await;

        let mut report = RoundReport {
            records,
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome {
                PeerOutcome::Accepted => report.accepted += 1,
                PeerOutcome::Conflict(ids) => {
                    report.conflicts += 1;
                    report.absorbed += ids;
                }
                PeerOutcome::Failed(err) => report.failures.push(err),
            }
        }
        Ok(report)
    }

    async fn sync_peer(&self, peer: &str, payload: &[u8]) -> PeerOutcome {
        let reply = match timeout(self.peer_timeout, self.transport.post(peer, payload)).await {
            Ok(reply) => reply,
            Err(_) => Err(SyncError::PeerTimeout {
                peer: peer.to_string(),
                timeout: self.peer_timeout,
            }),
        };

        match reply.and_then(|reply| self.classify(peer, reply)) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(peer, error = %err, "error syncing counters");
                self.instruments.peer_failures.add(
                    1,
                    &[
                        KeyValue::new("peer", peer.to_string()),
                        KeyValue::new("kind", err.kind()),
                    ],
                );
                PeerOutcome::Failed(err)
            }
        }
    }

    fn classify(&self, peer: &str, reply: PeerReply) -> Result<PeerOutcome, SyncError> {
        match reply.status {
            STATUS_OK => {
                debug!(peer, "peer accepted counters");
                Ok(PeerOutcome::Accepted)
            }
            STATUS_CONFLICT => {
                warn!(peer, "conflicting response values");
                let winners: Conflicts =
                    serde_json::from_slice(&reply.body).map_err(|e| SyncError::DecodeFailure {
                        peer: peer.to_string(),
                        reason: e.to_string(),
                    })?;
                self.store.absorb_conflict_winner(&winners);
                self.instruments
                    .conflicts
                    .add(winners.len() as u64, &[KeyValue::new("peer", peer.to_string())]);
                Ok(PeerOutcome::Conflict(winners.len()))
            }
            status => Err(SyncError::UnexpectedStatus {
                peer: peer.to_string(),
                status,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use more_asserts::assert_lt;
    use parking_lot::Mutex;

    use super::*;
    use crate::clock::FixedClock;

    #[derive(Debug, Clone)]
    enum Script {
        Reply(PeerReply),
        Hang,
        Refuse,
    }

    /// Answers each peer from a fixed script and records what was sent.
    #[derive(Debug, Default)]
    struct MockTransport {
        scripts: HashMap<String, Script>,
        sent: Mutex<Vec<(String, SyncRequest)>>,
        calls: AtomicUsize,
    }

    impl MockTransport {
        fn with(mut self, peer: &str, script: Script) -> Self {
            self.scripts.insert(peer.to_string(), script);
            self
        }
    }

    impl ClusterTransport for MockTransport {
        async fn post(&self, peer: &str, payload: &[u8]) -> Result<PeerReply, SyncError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let request: SyncRequest = serde_json::from_slice(payload).unwrap();
            self.sent.lock().push((peer.to_string(), request));

            match self.scripts.get(peer).cloned().unwrap_or(Script::Reply(PeerReply::ok())) {
                Script::Reply(reply) => Ok(reply),
                Script::Hang => std::future::pending().await,
                Script::Refuse => Err(SyncError::PeerUnreachable {
                    peer: peer.to_string(),
                    reason: "connection refused".to_string(),
                }),
            }
        }
    }

    fn coordinator(
        store: &Arc<CounterStore>,
        transport: MockTransport,
        peers: &[&str],
    ) -> SyncCoordinator<MockTransport> {
        SyncCoordinator::new(
            store.clone(),
            transport,
            peers.iter().map(|p| p.to_string()).collect(),
            Duration::from_millis(100),
            Arc::new(FixedClock::new(17)),
        )
    }

    fn conflict(body: &str) -> Script {
        Script::Reply(PeerReply::new(STATUS_CONFLICT, body))
    }

    #[tokio::test]
    async fn it_stays_silent_with_nothing_pending() {
        let store = Arc::new(CounterStore::new());
        let sync = coordinator(&store, MockTransport::default(), &["a", "b"]);

        let report = sync.run_round().await.unwrap();

        assert!(report.is_idle());
        assert_eq!(sync.transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn it_sends_the_snapshot_to_every_peer() {
        let store = Arc::new(CounterStore::new());
        store.increment("alice");
        store.increment("alice");
        let sync = coordinator(&store, MockTransport::default(), &["a", "b"]);

        let report = sync.run_round().await.unwrap();

        assert_eq!(report.records, 1);
        assert_eq!(report.accepted, 2);
        assert!(report.failures.is_empty());

        let sent = sync.transport.sent.lock();
        assert_eq!(sent.len(), 2);
        for (_, request) in sent.iter() {
            assert_eq!(request.sec, 17);
            assert_eq!(request.values[0].id, "alice");
            assert_eq!(request.values[0].delta, 2);
        }

        // Accepted peers leave local state for the merge step
        assert_eq!(store.pending("alice"), 2);
    }

    #[tokio::test]
    async fn it_absorbs_a_conflict_winner() {
        let store = Arc::new(CounterStore::new());
        store.increment("alice");
        store.increment("bob");
        let transport = MockTransport::default().with("a", conflict(r#"{"alice":42}"#));
        let sync = coordinator(&store, transport, &["a"]);

        let report = sync.run_round().await.unwrap();

        assert_eq!(report.conflicts, 1);
        assert_eq!(report.absorbed, 1);
        assert_eq!(store.committed("alice"), 42);
        // All pending deltas are dropped on conflict, related or not
        assert_eq!(store.pending("alice"), 0);
        assert_eq!(store.pending("bob"), 0);
    }

    #[tokio::test]
    async fn it_counts_absorbed_ids_across_peers() {
        let store = Arc::new(CounterStore::new());
        store.increment("alice");
        let transport = MockTransport::default()
            .with("a", conflict(r#"{"alice":3,"bob":4}"#))
            .with("b", conflict(r#"{"alice":5}"#));
        let sync = coordinator(&store, transport, &["a", "b", "c"]);

        let report = sync.run_round().await.unwrap();

        assert_eq!(report.accepted, 1);
        assert_eq!(report.conflicts, 2);
        assert_eq!(report.absorbed, 3);
        assert_eq!(store.committed("alice"), 5);
        assert_eq!(store.committed("bob"), 4);
    }

    #[tokio::test]
    async fn it_discards_an_undecodable_conflict() {
        let store = Arc::new(CounterStore::new());
        store.increment("alice");
        let transport = MockTransport::default().with("a", conflict("{not json"));
        let sync = coordinator(&store, transport, &["a"]);

        let report = sync.run_round().await.unwrap();

        assert_eq!(report.conflicts, 0);
        assert!(matches!(
            report.failures.as_slice(),
            [SyncError::DecodeFailure { peer, .. }] if peer == "a"
        ));
        assert_eq!(store.committed("alice"), 0);
        assert_eq!(store.pending("alice"), 1);
    }

    #[tokio::test]
    async fn it_treats_other_statuses_as_soft_failures() {
        let store = Arc::new(CounterStore::new());
        store.increment("alice");
        let transport = MockTransport::default()
            .with("a", Script::Reply(PeerReply::new(500, "boom")))
            .with("b", Script::Refuse);
        let sync = coordinator(&store, transport, &["a", "b", "c"]);

        let report = sync.run_round().await.unwrap();

        assert_eq!(report.accepted, 1);
        assert_eq!(report.failures.len(), 2);
        assert!(report.failures.contains(&SyncError::UnexpectedStatus {
            peer: "a".to_string(),
            status: 500
        }));
        assert_eq!(report.failures[1].kind(), "unreachable");
        assert_eq!(store.pending("alice"), 1);
    }

    #[tokio::test]
    async fn test_hung_peer_does_not_block_others() {
        tokio::time::pause();

        let store = Arc::new(CounterStore::new());
        store.increment("alice");
        let transport = MockTransport::default()
            .with("slow", Script::Hang)
            .with("fast", conflict(r#"{"alice":9}"#));
        let sync = coordinator(&store, transport, &["slow", "fast"]);

        let start = tokio::time::Instant::now();
        let report = sync.run_round().await.unwrap();

        assert_lt!(start.elapsed(), Duration::from_millis(200));
        assert_eq!(report.conflicts, 1);
        assert_eq!(
            report.failures,
            vec![SyncError::PeerTimeout {
                peer: "slow".to_string(),
                timeout: Duration::from_millis(100)
            }]
        );
        assert_eq!(store.committed("alice"), 9);
    }

    #[tokio::test]
    async fn test_failed_round_resends_next_time() {
        let store = Arc::new(CounterStore::new());
        store.increment("alice");
        let transport = MockTransport::default().with("a", Script::Refuse);
        let sync = coordinator(&store, transport, &["a"]);

        let _ = sync.run_round().await.unwrap();
        store.increment("alice");
        let _ = sync.run_round().await.unwrap();

        let sent = sync.transport.sent.lock();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].1.values[0].delta, 2);
    }
}
