//! Request interceptors wrapped around the verification proxy.
//!
//! A [`Middleware`] turns an inner [`ProxyService`] into an outer one. A list
//! of middleware is composed with [`chain`] so that the first entry is the
//! outermost. The verifier registers them in this order:
//!
//! 1. before-each hook (setup path only, checked before anything else runs)
//! 2. after-each hook (every other path, after the whole chain returns)
//! 3. state-handler bridge (answers the setup path itself)
//! 4. message-handler bridge (answers the message path itself)
//! 5. user request filter
//!
//! Every service has `Error = Infallible`: failures become status codes.

pub mod hooks;
pub mod logging;
pub mod message;
pub mod state;

use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;

use tower::util::BoxCloneService;
use tower::{Layer, Service, ServiceExt};

pub use hooks::{AfterEachLayer, BeforeEachLayer};
pub use logging::{RequestLoggingLayer, TracingLayer};
pub use message::MessageHandlerLayer;
pub use state::StateHandlerLayer;

use crate::models::PROVIDER_STATES_SETUP_PATH;

/// Request type flowing through the proxy.
pub type ProxyRequest = axum::extract::Request;

/// Response type flowing through the proxy.
pub type ProxyResponse = axum::response::Response;

/// Type-erased handler at any point of the chain.
pub type ProxyService = BoxCloneService<ProxyRequest, ProxyResponse, Infallible>;

/// Wraps an inner handler into an outer handler.
#[derive(Clone)]
pub struct Middleware {
    wrap: Arc<dyn Fn(ProxyService) -> ProxyService + Send + Sync>,
}

impl Middleware {
    /// Middleware from a wrapping function.
    pub fn new<F>(wrap: F) -> Self
    where
        F: Fn(ProxyService) -> ProxyService + Send + Sync + 'static,
    {
        Self {
            wrap: Arc::new(wrap),
        }
    }

    /// Middleware from a tower layer.
    pub fn from_layer<L>(layer: L) -> Self
    where
        L: Layer<ProxyService> + Send + Sync + 'static,
        L::Service: Service<ProxyRequest, Response = ProxyResponse, Error = Infallible>
            + Clone
            + Send
            + 'static,
        <L::Service as Service<ProxyRequest>>::Future: Send + 'static,
    {
        Self::new(move |inner| BoxCloneService::new(layer.layer(inner)))
    }

    /// Request filter that edits each request before passing it on.
    pub fn map_request<F>(filter: F) -> Self
    where
        F: Fn(&mut ProxyRequest) + Send + Sync + 'static,
    {
        let filter = Arc::new(filter);
        Self::new(move |inner| {
            let filter = Arc::clone(&filter);
            BoxCloneService::new(inner.map_request(move |mut request: ProxyRequest| {
                filter(&mut request);
                request
            }))
        })
    }

    /// Wrap `inner`.
    #[must_use]
    pub fn wrap(&self, inner: ProxyService) -> ProxyService {
        (self.wrap)(inner)
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Middleware")
    }
}

/// Compose `middleware` around `terminal`, first entry outermost.
#[must_use]
pub fn chain(middleware: &[Middleware], terminal: ProxyService) -> ProxyService {
    middleware
        .iter()
        .rev()
        .fold(terminal, |inner, m| m.wrap(inner))
}

pub(crate) fn is_setup_path(request: &ProxyRequest) -> bool {
    request.uri().path() == PROVIDER_STATES_SETUP_PATH
}
