//! Request tracing for the verification proxy.

use std::convert::Infallible;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tower::{Layer, Service};
use tracing::{Instrument, info_span};
use uuid::Uuid;

use super::{ProxyRequest, ProxyResponse};

/// Opens a `proxy_request` span with a correlation id around each exchange.
#[derive(Debug, Clone)]
pub struct TracingLayer {
    service_name: String,
}

impl TracingLayer {
    /// Creates a new tracing layer
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }
}

impl<S> Layer<S> for TracingLayer {
    type Service = TracingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TracingService {
            inner,
            service_name: self.service_name.clone(),
        }
    }
}

/// Service produced by [`TracingLayer`].
#[derive(Debug, Clone)]
pub struct TracingService<S> {
    inner: S,
    service_name: String,
}

impl<S> Service<ProxyRequest> for TracingService<S>
where
    S: Service<ProxyRequest, Response = ProxyResponse, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = ProxyResponse;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: ProxyRequest) -> Self::Future {
        let correlation_id = Uuid::new_v4();
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let span = info_span!(
            "proxy_request",
            service = %self.service_name,
            correlation_id = %correlation_id,
            method = %req.method(),
            path = %req.uri().path(),
        );

        Box::pin(
            async move {
                let response = inner.call(req).await?;
                let status = response.status();
                if status.is_server_error() {
                    tracing::warn!(status = status.as_u16(), "request completed with server error");
                } else {
                    tracing::trace!(status = status.as_u16(), "request completed");
                }
                Ok(response)
            }
            .instrument(span),
        )
    }
}

/// Logs each request right before it is forwarded upstream.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLoggingLayer;

impl<S> Layer<S> for RequestLoggingLayer {
    type Service = RequestLoggingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLoggingService { inner }
    }
}

/// Service produced by [`RequestLoggingLayer`].
#[derive(Debug, Clone)]
pub struct RequestLoggingService<S> {
    inner: S,
}

impl<S> Service<ProxyRequest> for RequestLoggingService<S>
where
    S: Service<ProxyRequest, Response = ProxyResponse, Error = Infallible>,
{
    type Response = ProxyResponse;
    type Error = Infallible;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: ProxyRequest) -> Self::Future {
        tracing::trace!(
            method = %req.method(),
            uri = %req.uri(),
            headers = ?req.headers(),
            "proxying request"
        );
        self.inner.call(req)
    }
}
