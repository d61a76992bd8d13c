use std::future::Future;

use crate::error::SyncError;

/// Status a peer answers with when it absorbed a payload without conflict.
pub const STATUS_OK: u16 = 200;

/// Status a peer answers with when its own counts won for some ids.
pub const STATUS_CONFLICT: u16 = 409;

/// What came back from a peer, before interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerReply {
    pub status: u16,
    pub body: Vec<u8>,
}

impl PeerReply {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok() -> Self {
        Self::new(STATUS_OK, Vec::new())
    }
}

/// Delivers an encoded reconciliation payload to one peer.
///
/// Implementations report connection-level faults as
/// [`SyncError::PeerUnreachable`] or [`SyncError::PeerTimeout`] and hand any
/// HTTP-level answer back as a [`PeerReply`]; classifying the status and
/// decoding the body is left to the caller.
pub trait ClusterTransport: Send + Sync {
    fn post(
        &self,
        peer: &str,
        payload: &[u8],
    ) -> impl Future<Output = Result<PeerReply, SyncError>> + Send;
}
