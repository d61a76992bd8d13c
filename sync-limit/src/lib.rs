//! # sync-limit
//!
//! `sync-limit` enforces a per-client, per-minute request ceiling across a
//! cluster of nodes without a coordinator.
//!
//! ## Core Philosophy
//!
//! Every node answers admission requests from local memory only. Counts are
//! reconciled with the other members on a short, fixed interval, so the
//! ceiling is enforced against an approximate cluster-wide total rather than
//! a per-node total. Between rounds a client may briefly overshoot; that is the
//! price of never putting the network on the admission path.
//!
//! ## Key Concepts
//!
//! * **Committed vs Pending**: [`CounterStore`] keeps the reconciled count
//!   (cleared every window) apart from the increments accrued locally since the
//!   last merge (which survive a window reset).
//! * **Reconciliation Round**: [`SyncCoordinator`] snapshots pending deltas,
//!   pushes them to every peer concurrently and absorbs any peer that claims a
//!   larger count.
//! * **Aligned Windows**: [`Scheduler`] resets committed counts on wall-clock
//!   minute boundaries once it has aligned, and runs a round on every sync
//!   tick.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use sync_limit::AdmissionGate;
//! use sync_limit::CounterStore;
//!
//! let store = Arc::new(CounterStore::new());
//! let gate = AdmissionGate::new(store, 100);
//!
//! if gate.decide("client-42").unwrap().is_continue() {
//!     // Request allowed
//! }
//! ```

mod clock;
mod config;
mod coordinator;
mod error;
mod gate;
mod payload;
mod scheduler;
mod store;
mod transport;

pub use clock::FixedClock;
pub use clock::SystemClock;
pub use clock::WindowClock;
pub use config::SyncConfig;
pub use coordinator::PeerOutcome;
pub use coordinator::RoundReport;
pub use coordinator::SyncCoordinator;
pub use error::SyncError;
pub use gate::AdmissionGate;
pub use payload::Conflicts;
pub use payload::ReconciliationRecord;
pub use payload::SyncRequest;
pub use scheduler::Scheduler;
pub use store::CounterStore;
pub use store::StoreStats;
pub use transport::ClusterTransport;
pub use transport::PeerReply;
pub use transport::STATUS_CONFLICT;
pub use transport::STATUS_OK;

/// Reasons why a request might be rejected by the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    /// The client's observed count has reached the ceiling for this window.
    QuotaExceeded { observed: u64, ceiling: u64 },
}
