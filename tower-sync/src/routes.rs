use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::Query;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use http::StatusCode;
use serde::Deserialize;
use sync_limit::AdmissionGate;
use sync_limit::CounterStore;
use sync_limit::SyncRequest;
use sync_limit::WindowClock;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::error::GateError;

/// Shared state behind the node's HTTP endpoints.
#[derive(Clone)]
pub struct NodeState {
    gate: Arc<AdmissionGate>,
    store: Arc<CounterStore>,
    clock: Arc<dyn WindowClock>,
    reject_stale: bool,
}

impl NodeState {
    pub fn new(
        gate: Arc<AdmissionGate>,
        store: Arc<CounterStore>,
        clock: Arc<dyn WindowClock>,
        reject_stale: bool,
    ) -> Self {
        Self {
            gate,
            store,
            clock,
            reject_stale,
        }
    }
}

#[derive(Debug, Deserialize)]
struct VerifyParams {
    id: Option<String>,
}

/// Build the node router: `/verify` for the load balancer, `/sync` for
/// peers and `/health`.
pub fn router(state: NodeState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/verify", get(verify))
        .route("/sync", post(sync_state))
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn verify(
    State(state): State<NodeState>,
    Query(params): Query<VerifyParams>,
) -> Result<StatusCode, GateError> {
    let id = params.id.unwrap_or_default();
    GateError::from_decision(state.gate.decide(&id))?;
    Ok(StatusCode::OK)
}

async fn sync_state(State(state): State<NodeState>, body: Bytes) -> Response {
    let request: SyncRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            error!(error = %err, "error unmarshalling sync request");
            return (StatusCode::BAD_REQUEST, err.to_string()).into_response();
        }
    };

    let now = state.clock.second_of_minute();
    if state.reject_stale && request.is_stale(now) {
        warn!(sent = request.sec, now, "time has already elapsed, ignoring sync request");
        return StatusCode::OK.into_response();
    }

    debug!(values = request.values.len(), "sync request");
    let conflicts = state.store.reconcile(&request.values);
    if conflicts.is_empty() {
        StatusCode::OK.into_response()
    } else {
        (StatusCode::CONFLICT, Json(conflicts)).into_response()
    }
}
