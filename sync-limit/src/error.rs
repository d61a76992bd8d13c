use std::time::Duration;

/// Errors produced by the admission gate and the reconciliation machinery.
///
/// Only [`SyncError::InvalidRequest`] ever reaches an admission caller. The
/// peer-facing variants are contained inside a sync round: they are logged,
/// counted and reported in a [`crate::RoundReport`], but never stop the
/// scheduler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// The admission call carried no client id.
    #[error("missing client id")]
    InvalidRequest,

    /// The configuration cannot drive a node.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The peer could not be reached at all (connect refused, DNS, reset).
    #[error("peer {peer} unreachable: {reason}")]
    PeerUnreachable { peer: String, reason: String },

    /// The peer did not answer within the configured deadline.
    #[error("peer {peer} did not answer within {timeout:?}")]
    PeerTimeout { peer: String, timeout: Duration },

    /// The peer answered with a status that is neither success nor conflict.
    #[error("peer {peer} answered with unexpected status {status}")]
    UnexpectedStatus { peer: String, status: u16 },

    /// The peer's conflict body could not be decoded; its authority data is
    /// discarded for the round.
    #[error("could not decode conflict body from {peer}: {reason}")]
    DecodeFailure { peer: String, reason: String },

    /// The outgoing payload could not be encoded; the round is aborted.
    #[error("could not encode sync payload: {0}")]
    SerializationFailure(String),
}

impl SyncError {
    /// A short, stable label used as a metric attribute.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidConfig(_) => "invalid_config",
            Self::PeerUnreachable { .. } => "unreachable",
            Self::PeerTimeout { .. } => "timeout",
            Self::UnexpectedStatus { .. } => "unexpected_status",
            Self::DecodeFailure { .. } => "decode",
            Self::SerializationFailure(_) => "serialization",
        }
    }
}
