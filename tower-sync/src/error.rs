use std::ops::ControlFlow;

use sync_limit::Reason;
use sync_limit::SyncError;

/// Errors produced by the admission middleware and the `/verify` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    /// The request did not identify a client.
    ///
    /// When the `axum` feature is enabled, this converts to `400 Bad Request`.
    #[error("missing client id")]
    InvalidRequest,

    /// The client has used up its quota for the current window.
    ///
    /// When the `axum` feature is enabled, this converts to
    /// `503 Service Unavailable`.
    #[error("request quota exceeded")]
    QuotaExceeded {
        /// The ceiling that was reached.
        ceiling: u64,
    },

    /// An unexpected error occurred in the inner service.
    ///
    /// The string contains the `Display` representation of the inner error.
    /// When the `axum` feature is enabled, this converts to `500 Internal Server Error`.
    #[error("Internal service error: {0}")]
    Inner(String),
}

impl GateError {
    /// Turn a gate decision into `Ok(())` for an admitted request.
    pub fn from_decision(decision: Result<ControlFlow<Reason>, SyncError>) -> Result<(), Self> {
        match decision {
            Ok(ControlFlow::Continue(())) => Ok(()),
            Ok(ControlFlow::Break(Reason::QuotaExceeded { ceiling, .. })) => {
                Err(Self::QuotaExceeded { ceiling })
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl From<SyncError> for GateError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::InvalidRequest => Self::InvalidRequest,
            other => Self::Inner(other.to_string()),
        }
    }
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for GateError {
    fn into_response(self) -> axum::response::Response {
        use http::StatusCode;

        let status = match self {
            Self::InvalidRequest => StatusCode::BAD_REQUEST,
            Self::QuotaExceeded { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Inner(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, self.to_string()).into_response()
    }
}
