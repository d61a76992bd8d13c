//! # Tower Sync
//!
//! `tower-sync` puts a [`sync_limit`] cluster node on the network.
//!
//! ## Pieces
//!
//! 1. **Transport**: [`HttpTransport`] implements
//!    [`sync_limit::ClusterTransport`] by POSTing reconciliation payloads to
//!    `http://<peer>/sync` with a hard per-call timeout.
//! 2. **Middleware**: [`AdmissionLayer`] consults an
//!    [`sync_limit::AdmissionGate`] before a request reaches the inner service,
//!    failing with [`GateError`] when the client is over its ceiling.
//! 3. **Endpoints**: with the `axum` feature, [`router`] serves `/verify` (for a
//!    load balancer), `/sync` (for peers) and `/health`.
//!
//! ## Feature Flags
//!
//! - `axum` (default): Enables the router and `IntoResponse` for [`GateError`],
//!   allowing automatic conversion to HTTP status codes (400, 503, 500).
//! - `cli`: Builds the `sync-limit-node` binary.

mod error;
mod layer;
#[cfg(feature = "axum")]
mod routes;
mod service;
mod transport;


pub use error::GateError;
pub use layer::AdmissionLayer;
#[cfg(feature = "axum")]
pub use routes::NodeState;
#[cfg(feature = "axum")]
pub use routes::router;
pub use service::AdmissionService;
pub use service::IdExtractor;
pub use service::ResponseFuture;
pub use transport::HttpTransport;
