use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;

use pin_project_lite::pin_project;
use sync_limit::AdmissionGate;
use tower::BoxError;
use tower::Service;

use crate::error::GateError;

/// Pulls the client id out of a request.
pub type IdExtractor<Req> = Arc<dyn Fn(&Req) -> Option<String> + Send + Sync>;

/// Admits or rejects each request through an [`AdmissionGate`] before it
/// reaches the inner service.
pub struct AdmissionService<S, Req> {
    inner: S,
    gate: Arc<AdmissionGate>,
    extract: IdExtractor<Req>,
}

pin_project! {
    #[project = ResponseFutureProj]
    /// Either the inner service's future, or an immediate rejection.
    pub enum ResponseFuture<F> {
        Admitted {
            #[pin]
            inner: F,
        },
        Rejected {
            error: GateError,
        },
    }
}

impl<F, T, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<T, E>>,
    E: From<BoxError>,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project() {
            ResponseFutureProj::Admitted { inner } => inner.poll(cx),
            ResponseFutureProj::Rejected { error } => {
                Poll::Ready(Err(E::from(BoxError::from(error.clone()))))
            }
        }
    }
}

// Manually implement Clone so that `Req` need not be Clone
impl<S, Req> Clone for AdmissionService<S, Req>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            gate: Arc::clone(&self.gate),
            extract: Arc::clone(&self.extract),
        }
    }
}

impl<S, Req> Service<Req> for AdmissionService<S, Req>
where
    S: Service<Req, Error = BoxError>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let decision = match (self.extract)(&req) {
            Some(id) => GateError::from_decision(self.gate.decide(&id)),
            None => Err(GateError::InvalidRequest),
        };

        match decision {
            Ok(()) => ResponseFuture::Admitted {
                inner: self.inner.call(req),
            },
            Err(error) => ResponseFuture::Rejected { error },
        }
    }
}

impl<S, Req> AdmissionService<S, Req> {
    pub fn new(inner: S, gate: Arc<AdmissionGate>, extract: IdExtractor<Req>) -> Self {
        Self {
            inner,
            gate,
            extract,
        }
    }
}
