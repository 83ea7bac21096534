//! User-supplied capabilities invoked from inside the proxy.
//!
//! Each capability is a trait with a blanket implementation for plain
//! closures, so callers can register either a struct or a function.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BoxError;
use crate::models::{Message, ProviderState, ProviderStateResponse};

/// A before/after interaction hook.
#[async_trait]
pub trait Hook: Send + Sync {
    /// Run the hook.
    async fn call(&self) -> Result<(), BoxError>;
}

#[async_trait]
impl<F> Hook for F
where
    F: Fn() -> Result<(), BoxError> + Send + Sync,
{
    async fn call(&self) -> Result<(), BoxError> {
        self()
    }
}

/// Prepares or tears down a named provider state.
#[async_trait]
pub trait StateHandler: Send + Sync {
    /// Handle a state change; `setup` is false on teardown.
    ///
    /// Returned values are sent back to the engine as a JSON object.
    async fn handle(
        &self,
        setup: bool,
        state: &ProviderState,
    ) -> Result<Option<ProviderStateResponse>, BoxError>;
}

#[async_trait]
impl<F> StateHandler for F
where
    F: Fn(bool, &ProviderState) -> Result<Option<ProviderStateResponse>, BoxError> + Send + Sync,
{
    async fn handle(
        &self,
        setup: bool,
        state: &ProviderState,
    ) -> Result<Option<ProviderStateResponse>, BoxError> {
        self(setup, state)
    }
}

/// Produces the message for a message description.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Produce the message under the given states.
    async fn produce(&self, states: &[ProviderState]) -> Result<Message, BoxError>;
}

#[async_trait]
impl<F> MessageHandler for F
where
    F: Fn(&[ProviderState]) -> Result<Message, BoxError> + Send + Sync,
{
    async fn produce(&self, states: &[ProviderState]) -> Result<Message, BoxError> {
        self(states)
    }
}

/// Immutable name-to-handler mapping shared by reference with the proxy.
pub struct HandlerRegistry<H: ?Sized> {
    handlers: Arc<HashMap<String, Arc<H>>>,
}

/// State name to state handler.
pub type StateHandlers = HandlerRegistry<dyn StateHandler>;

/// Message description to message handler.
pub type MessageHandlers = HandlerRegistry<dyn MessageHandler>;

impl<H: ?Sized> HandlerRegistry<H> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(HashMap::new()),
        }
    }

    /// Register (or replace) a handler.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, handler: Arc<H>) -> Self {
        Arc::make_mut(&mut self.handlers).insert(name.into(), handler);
        self
    }

    /// Look up a handler.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<H>> {
        self.handlers.get(name)
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl StateHandlers {
    /// Register a state handler.
    #[must_use]
    pub fn with_handler(self, state: impl Into<String>, handler: impl StateHandler + 'static) -> Self {
        self.with(state, Arc::new(handler))
    }

    /// Register a closure as a state handler.
    #[must_use]
    pub fn with_fn<F>(self, state: impl Into<String>, handler: F) -> Self
    where
        F: Fn(bool, &ProviderState) -> Result<Option<ProviderStateResponse>, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.with_handler(state, handler)
    }
}

impl MessageHandlers {
    /// Register a message handler.
    #[must_use]
    pub fn with_handler(
        self,
        description: impl Into<String>,
        handler: impl MessageHandler + 'static,
    ) -> Self {
        self.with(description, Arc::new(handler))
    }

    /// Register a closure as a message handler.
    #[must_use]
    pub fn with_fn<F>(self, description: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&[ProviderState]) -> Result<Message, BoxError> + Send + Sync + 'static,
    {
        self.with_handler(description, handler)
    }
}

impl<H: ?Sized> Default for HandlerRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: ?Sized> Clone for HandlerRegistry<H> {
    fn clone(&self) -> Self {
        Self {
            handlers: Arc::clone(&self.handlers),
        }
    }
}

impl<H: ?Sized> fmt::Debug for HandlerRegistry<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("names", &self.names())
            .finish()
    }
}
