use std::time::Duration;

use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use sync_limit::ClusterTransport;
use sync_limit::PeerReply;
use sync_limit::SyncError;
use tracing::debug;

/// Delivers reconciliation payloads to `http://<peer>/sync`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    timeout: Duration,
}

impl HttpTransport {
    /// Build a transport whose every call is bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("http client: {e}")))?;
        Ok(Self { client, timeout })
    }

    fn transport_error(&self, peer: &str, err: reqwest::Error) -> SyncError {
        if err.is_timeout() {
            SyncError::PeerTimeout {
                peer: peer.to_string(),
                timeout: self.timeout,
            }
        } else {
            SyncError::PeerUnreachable {
                peer: peer.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

impl ClusterTransport for HttpTransport {
    async fn post(&self, peer: &str, payload: &[u8]) -> Result<PeerReply, SyncError> {
        let url = format!("http://{peer}/sync");
        let resp = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(payload.to_vec())
            .send()
            .await
            .map_err(|e| self.transport_error(peer, e))?;

        let status = resp.status().as_u16();
        debug!(peer, status, "sync response");

        let body = resp
            .bytes()
            .await
            .map_err(|e| self.transport_error(peer, e))?;
        Ok(PeerReply::new(status, body.to_vec()))
    }
}
