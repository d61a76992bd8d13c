use std::sync::Arc;

use sync_limit::AdmissionGate;
use tower::Layer;

use crate::service::AdmissionService;
use crate::service::IdExtractor;

/// Applies cluster-wide admission to requests.
pub struct AdmissionLayer<Req> {
    gate: Arc<AdmissionGate>,
    extract: IdExtractor<Req>,
}

impl<Req> Clone for AdmissionLayer<Req> {
    fn clone(&self) -> Self {
        Self {
            gate: Arc::clone(&self.gate),
            extract: Arc::clone(&self.extract),
        }
    }
}

impl<Req> AdmissionLayer<Req> {
    /// Create an AdmissionLayer
    ///
    /// `extract` names the client a request belongs to. Requests for which it
    /// returns `None` (or an empty id) fail with `GateError::InvalidRequest`.
    pub fn new<F>(gate: Arc<AdmissionGate>, extract: F) -> Self
    where
        F: Fn(&Req) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            gate,
            extract: Arc::new(extract),
        }
    }
}

impl<S, Req> Layer<S> for AdmissionLayer<Req> {
    type Service = AdmissionService<S, Req>;

    fn layer(&self, service: S) -> Self::Service {
        AdmissionService::new(service, self.gate.clone(), self.extract.clone())
    }
}
