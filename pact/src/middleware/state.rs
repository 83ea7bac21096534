//! Bridge from state-change HTTP calls to registered state handlers.

use std::convert::Infallible;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use futures::future::BoxFuture;
use tower::{Layer, Service};

use super::{ProxyRequest, ProxyResponse, is_setup_path};
use crate::handler::StateHandlers;
use crate::models::StateChangeInstruction;

/// Answers the provider-states setup path from a [`StateHandlers`] registry.
///
/// Requests to any other path go to the inner service untouched.
#[derive(Debug, Clone)]
pub struct StateHandlerLayer {
    handlers: StateHandlers,
}

impl StateHandlerLayer {
    /// Creates the layer.
    #[must_use]
    pub const fn new(handlers: StateHandlers) -> Self {
        Self { handlers }
    }
}

impl<S> Layer<S> for StateHandlerLayer {
    type Service = StateHandlerService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        StateHandlerService {
            inner,
            handlers: self.handlers.clone(),
        }
    }
}

/// Service produced by [`StateHandlerLayer`].
#[derive(Debug, Clone)]
pub struct StateHandlerService<S> {
    inner: S,
    handlers: StateHandlers,
}

impl<S> Service<ProxyRequest> for StateHandlerService<S>
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
        if !is_setup_path(&req) {
            let clone = self.inner.clone();
            let mut inner = std::mem::replace(&mut self.inner, clone);
            return Box::pin(async move { inner.call(req).await });
        }

        let handlers = self.handlers.clone();
        Box::pin(async move { Ok(handle_state_change(&handlers, req).await) })
    }
}

async fn handle_state_change(handlers: &StateHandlers, req: ProxyRequest) -> ProxyResponse {
    tracing::debug!("executing state handler middleware");

    let raw = match axum::body::to_bytes(req.into_body(), usize::MAX).await {
        Ok(raw) => raw,
        Err(err) => {
            tracing::error!(error = %err, "unable to read state change request body");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let instruction = match StateChangeInstruction::parse(&raw) {
        Ok(instruction) => instruction,
        Err(err) => {
            tracing::error!(error = %err, "unable to decode state change request");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let Some(handler) = handlers.get(&instruction.state) else {
        tracing::warn!(
            state = %instruction.state,
            "no state handler found for state"
        );
        return StatusCode::OK.into_response();
    };

    tracing::info!(
        state = %instruction.state,
        action = %instruction.action,
        "calling state handler"
    );
    let result = match handler
        .handle(instruction.is_setup(), &instruction.provider_state())
        .await
    {
        Ok(result) => result,
        Err(err) => {
            tracing::error!(state = %instruction.state, error = %err, "state handler failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let Some(values) = result else {
        return StatusCode::OK.into_response();
    };

    match serde_json::to_vec(&values) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            Body::from(body),
        )
            .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "unable to encode state handler result");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
