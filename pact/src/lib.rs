//! Provider verification for consumer-driven contracts.
//!
//! The verifier sits a reverse proxy between an external verification engine
//! and the provider under test. The proxy runs state handlers, message
//! producers, interaction hooks and request filters around every exchange
//! the engine makes.
//!
//! ```no_run
//! use pact_provider::{BoxError, ProviderState, StateHandlers, Verifier, VerifyRequest};
//! # async fn run(engine: impl pact_provider::VerificationEngine) {
//! let handlers = StateHandlers::new().with_fn(
//!     "User foo exists",
//!     |_setup: bool, _state: &ProviderState| -> Result<_, BoxError> { Ok(None) },
//! );
//! let request = VerifyRequest::new("user-service")
//!     .with_provider_base_url("http://localhost:8080")
//!     .with_pact_dir("./pacts")
//!     .with_state_handlers(handlers);
//!
//! Verifier::new(engine).verify_provider(request).await;
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod dummy;
pub mod error;
pub mod handler;
pub mod middleware;
pub mod models;
pub mod port;
pub mod proxy;
pub mod verifier;

pub use config::{ConfigError, DEFAULT_CLIENT_TIMEOUT, DEFAULT_HOSTNAME, VerifierConfig};
pub use dummy::DummyProvider;
pub use error::{BoxError, ErrorCategory, VerifyError, VerifyResult};
pub use handler::{Hook, MessageHandler, MessageHandlers, StateHandler, StateHandlers};
pub use middleware::{Middleware, ProxyRequest, ProxyResponse, ProxyService, chain};
pub use models::{
    MESSAGES_PATH, Message, MessageBody, MessageRequest, PROVIDER_STATES_SETUP_PATH,
    ProviderState, ProviderStateParams, ProviderStateResponse, StateChangeInstruction, Transport,
};
pub use port::wait_for_port;
pub use proxy::{ProxyHandle, ProxyOptions, single_joining_slash, start_reverse_proxy};
pub use verifier::{
    OutputWriter, TracingOutput, VerificationEngine, VerifierPhase, VerifyRequest, Verifier,
    build_middleware,
};
