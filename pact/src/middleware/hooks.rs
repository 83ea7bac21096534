//! Before-each and after-each interaction hooks.
//!
//! Neither hook short-circuits the chain. A failing before hook marks the
//! response as a 500 but the request still travels downstream; a failing
//! after hook rewrites the status of the already produced, still unsent
//! response.

use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::http::StatusCode;
use futures::future::BoxFuture;
use tower::{Layer, Service};

use super::{ProxyRequest, ProxyResponse, is_setup_path};
use crate::handler::Hook;

/// Runs a hook on the provider-states setup path, before the rest of the chain.
#[derive(Clone)]
pub struct BeforeEachLayer {
    hook: Arc<dyn Hook>,
}

impl BeforeEachLayer {
    /// Creates the layer.
    pub fn new(hook: Arc<dyn Hook>) -> Self {
        Self { hook }
    }
}

impl<S> Layer<S> for BeforeEachLayer {
    type Service = BeforeEachService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        BeforeEachService {
            inner,
            hook: Arc::clone(&self.hook),
        }
    }
}

/// Service produced by [`BeforeEachLayer`].
pub struct BeforeEachService<S> {
    inner: S,
    hook: Arc<dyn Hook>,
}

impl<S: Clone> Clone for BeforeEachService<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            hook: Arc::clone(&self.hook),
        }
    }
}

impl<S> Service<ProxyRequest> for BeforeEachService<S>
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
        // the ready service goes to the future, the clone stays behind
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let hook = Arc::clone(&self.hook);

        Box::pin(async move {
            if !is_setup_path(&req) {
                return inner.call(req).await;
            }

            tracing::debug!("executing before hook");
            let failure = hook.call().await.err();
            let mut response = inner.call(req).await?;
            if let Some(err) = failure {
                tracing::error!(error = %err, "before hook failed");
                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            }
            Ok(response)
        })
    }
}

/// Runs a hook after every non-setup exchange has produced its response.
#[derive(Clone)]
pub struct AfterEachLayer {
    hook: Arc<dyn Hook>,
}

impl AfterEachLayer {
    /// Creates the layer.
    pub fn new(hook: Arc<dyn Hook>) -> Self {
        Self { hook }
    }
}

impl<S> Layer<S> for AfterEachLayer {
    type Service = AfterEachService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AfterEachService {
            inner,
            hook: Arc::clone(&self.hook),
        }
    }
}

/// Service produced by [`AfterEachLayer`].
pub struct AfterEachService<S> {
    inner: S,
    hook: Arc<dyn Hook>,
}

impl<S: Clone> Clone for AfterEachService<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            hook: Arc::clone(&self.hook),
        }
    }
}

impl<S> Service<ProxyRequest> for AfterEachService<S>
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
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let hook = Arc::clone(&self.hook);
        let setup = is_setup_path(&req);

        Box::pin(async move {
            let mut response = inner.call(req).await?;
            if setup {
                return Ok(response);
            }

            tracing::debug!("executing after hook");
            if let Err(err) = hook.call().await {
                tracing::error!(error = %err, "after hook failed");
                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            }
            Ok(response)
        })
    }
}
