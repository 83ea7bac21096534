//! Shared library for cross-cutting concerns in the pact provider verifier.
//!
//! This crate provides centralized implementations for:
//! - The platform error type
//! - HTTP client configuration and building (including custom TLS)
//! - Tracing subscriber setup with a reloadable log level

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod http;
pub mod tracing_config;

pub use error::PlatformError;
pub use http::{HttpConfig, build_http_client};
pub use tracing_config::{LogLevel, LogLevelHandle, TracingConfig, build_subscriber, init_tracing};
