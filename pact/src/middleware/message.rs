//! Bridge from message requests to registered message producers.
//!
//! The engine posts `{"description": ..., "providerStates": [...]}` to the
//! message path and expects the produced payload back. Metadata travels as
//! base64 encoded JSON in [`METADATA_HEADER`].

use std::convert::Infallible;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode, header};
use axum::response::IntoResponse;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use futures::future::BoxFuture;
use tower::{Layer, Service};

use super::{ProxyRequest, ProxyResponse};
use crate::handler::MessageHandlers;
use crate::models::{MESSAGES_PATH, Message, MessageBody, MessageRequest};

/// Response header carrying message metadata.
pub const METADATA_HEADER: HeaderName = HeaderName::from_static("pact-message-metadata");

/// Answers `POST` requests on the message path from a [`MessageHandlers`] registry.
#[derive(Debug, Clone)]
pub struct MessageHandlerLayer {
    handlers: MessageHandlers,
}

impl MessageHandlerLayer {
    /// Creates the layer.
    #[must_use]
    pub const fn new(handlers: MessageHandlers) -> Self {
        Self { handlers }
    }
}

impl<S> Layer<S> for MessageHandlerLayer {
    type Service = MessageHandlerService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MessageHandlerService {
            inner,
            handlers: self.handlers.clone(),
        }
    }
}

/// Service produced by [`MessageHandlerLayer`].
#[derive(Debug, Clone)]
pub struct MessageHandlerService<S> {
    inner: S,
    handlers: MessageHandlers,
}

impl<S> Service<ProxyRequest> for MessageHandlerService<S>
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
        if req.method() != Method::POST || req.uri().path() != MESSAGES_PATH {
            let clone = self.inner.clone();
            let mut inner = std::mem::replace(&mut self.inner, clone);
            return Box::pin(async move { inner.call(req).await });
        }

        let handlers = self.handlers.clone();
        Box::pin(async move { Ok(handle_message(&handlers, req).await) })
    }
}

async fn handle_message(handlers: &MessageHandlers, req: ProxyRequest) -> ProxyResponse {
    let raw = match axum::body::to_bytes(req.into_body(), usize::MAX).await {
        Ok(raw) => raw,
        Err(err) => {
            tracing::error!(error = %err, "unable to read message request body");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let message_request: MessageRequest = match serde_json::from_slice(&raw) {
        Ok(message_request) => message_request,
        Err(err) => {
            tracing::error!(error = %err, "unable to decode message request");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let Some(handler) = handlers.get(&message_request.description) else {
        tracing::error!(
            description = %message_request.description,
            "no message handler found for message description"
        );
        return StatusCode::NOT_FOUND.into_response();
    };

    match handler.produce(&message_request.states).await {
        Ok(message) => message_response(&message),
        Err(err) => {
            tracing::error!(
                description = %message_request.description,
                error = %err,
                "message handler failed"
            );
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

fn message_response(message: &Message) -> ProxyResponse {
    let body = match &message.body {
        MessageBody::Json(value) => match serde_json::to_vec(value) {
            Ok(body) => Body::from(body),
            Err(err) => {
                tracing::error!(error = %err, "unable to encode message body");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        },
        MessageBody::Binary { bytes, .. } => Body::from(bytes.clone()),
    };

    let mut response = (StatusCode::OK, body).into_response();
    let headers = response.headers_mut();

    match HeaderValue::from_str(message.content_type()) {
        Ok(value) => {
            headers.insert(header::CONTENT_TYPE, value);
        }
        Err(err) => tracing::warn!(error = %err, "ignoring invalid message content type"),
    }

    if !message.metadata.is_empty() {
        let encoded = match serde_json::to_vec(&message.metadata) {
            Ok(json) => STANDARD.encode(json),
            Err(err) => {
                tracing::error!(error = %err, "unable to encode message metadata");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };
        // base64 output is always a valid header value
        if let Ok(value) = HeaderValue::from_str(&encoded) {
            headers.insert(METADATA_HEADER, value);
        }
    }

    response
}
