use std::time::Duration;

use crate::error::SyncError;

/// Settings for one cluster node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Addresses (`host:port`) of the other cluster members.
    pub peers: Vec<String>,
    /// Requests a client may make per window, cluster-wide.
    pub ceiling: u64,
    /// Time between reconciliation rounds.
    pub sync_interval: Duration,
    /// Reset period used until resets are aligned to the minute.
    pub bootstrap_reset_interval: Duration,
    /// Deadline for a single peer call.
    pub peer_timeout: Duration,
    /// Ignore incoming payloads whose second-of-minute is ahead of ours.
    pub reject_stale: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            peers: Vec::new(),
            ceiling: 500,
            sync_interval: Duration::from_secs(1),
            bootstrap_reset_interval: Duration::from_secs(10),
            peer_timeout: Duration::from_secs(2),
            reject_stale: true,
        }
    }
}

impl SyncConfig {
    pub fn new(ceiling: u64) -> Self {
        Self {
            ceiling,
            ..Default::default()
        }
    }

    /// Set the peer list. Blank entries are dropped.
    pub fn with_peers<I, S>(mut self, peers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.peers = peers
            .into_iter()
            .map(Into::into)
            .map(|peer: String| peer.trim().to_string())
            .filter(|peer| !peer.is_empty())
            .collect();
        self
    }

    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    pub fn with_bootstrap_reset_interval(mut self, interval: Duration) -> Self {
        self.bootstrap_reset_interval = interval;
        self
    }

    pub fn with_peer_timeout(mut self, timeout: Duration) -> Self {
        self.peer_timeout = timeout;
        self
    }

    pub fn with_reject_stale(mut self, reject_stale: bool) -> Self {
        self.reject_stale = reject_stale;
        self
    }

    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] for a zero ceiling or a zero
    /// interval or timeout.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.ceiling == 0 {
            return Err(SyncError::InvalidConfig(
                "ceiling must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("sync interval", self.sync_interval),
            ("reset interval", self.bootstrap_reset_interval),
            ("peer timeout", self.peer_timeout),
        ] {
            if value.is_zero() {
                return Err(SyncError::InvalidConfig(format!("{name} must be non-zero")));
            }
        }
        Ok(())
    }
}
