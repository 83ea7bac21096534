//! Verification error types.
//!
//! Only configuration, resource, readiness and engine failures surface here.
//! Hook and handler failures inside the proxy become HTTP status codes and
//! never reach the caller.

use std::time::Duration;

use rust_common::PlatformError;
use thiserror::Error;

use crate::config::ConfigError;

/// Error type of every user-supplied capability (hooks, handlers, engine).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for verification operations.
pub type VerifyResult<T> = Result<T, VerifyError>;

/// Broad classes of verification failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid request or configuration; verification never started
    Configuration,
    /// A port could not be allocated
    Resource,
    /// The proxy did not become reachable in time
    Readiness,
    /// The verification engine reported a failure
    Verification,
}

/// Errors returned by the verifier.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum VerifyError {
    /// The verify request is not usable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The provider base URL could not be turned into a proxy target
    #[error("Invalid provider URL '{url}': {reason}")]
    InvalidProviderUrl {
        /// The offending URL
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// No port could be bound
    #[error("unable to allocate a port for verification: {0}")]
    PortAllocation(#[source] std::io::Error),

    /// A port did not accept connections before the deadline
    #[error("expected server to start < {timeout:?}. {message}")]
    PortTimeout {
        /// How long the waiter polled
        timeout: Duration,
        /// Caller-supplied diagnostic
        message: String,
    },

    /// The verification proxy was not reachable before the client timeout
    #[error("verification proxy did not start: {0}")]
    ProxyStartTimeout(#[source] Box<VerifyError>),

    /// Failure reported by the verification engine
    #[error("{0}")]
    Engine(#[source] BoxError),

    /// Environment configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Shared platform error
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

impl VerifyError {
    /// Classify this error.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidConfig(_)
            | Self::InvalidProviderUrl { .. }
            | Self::Config(_)
            | Self::Platform(_) => ErrorCategory::Configuration,
            Self::PortAllocation(_) => ErrorCategory::Resource,
            Self::PortTimeout { .. } | Self::ProxyStartTimeout(_) => ErrorCategory::Readiness,
            Self::Engine(_) => ErrorCategory::Verification,
        }
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create an invalid provider URL error.
    #[must_use]
    pub fn invalid_provider_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidProviderUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }
}
