//! Centralized HTTP client configuration and building.
//!
//! The verification proxy forwards provider calls through a client built
//! here, so every knob a reverse proxy needs (redirect handling, custom TLS)
//! lives on [`HttpConfig`].

use reqwest::{Client, ClientBuilder, redirect};
use std::sync::Arc;
use std::time::Duration;

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Request timeout (default: 30s)
    pub timeout: Duration,
    /// Connection timeout (default: 10s)
    pub connect_timeout: Duration,
    /// Pool idle timeout (default: 90s)
    pub pool_idle_timeout: Duration,
    /// Maximum idle connections per host (default: 10)
    pub pool_max_idle_per_host: usize,
    /// User agent string, sent only when a request carries none
    pub user_agent: String,
    /// Whether redirects are followed (default: true)
    pub follow_redirects: bool,
    /// Custom TLS client configuration used instead of the built-in roots
    pub tls: Option<Arc<rustls::ClientConfig>>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 10,
            user_agent: concat!("pact-provider/", env!("CARGO_PKG_VERSION")).to_string(),
            follow_redirects: true,
            tls: None,
        }
    }
}

impl HttpConfig {
    /// Create a new HTTP config with custom timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Create a new HTTP config with custom connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Create a new HTTP config with custom user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Create a new HTTP config with custom pool settings.
    #[must_use]
    pub const fn with_pool_config(mut self, idle_timeout: Duration, max_idle: usize) -> Self {
        self.pool_idle_timeout = idle_timeout;
        self.pool_max_idle_per_host = max_idle;
        self
    }

    /// Hand redirects back to the caller instead of following them.
    #[must_use]
    pub const fn without_redirects(mut self) -> Self {
        self.follow_redirects = false;
        self
    }

    /// Use a custom rustls client configuration.
    #[must_use]
    pub fn with_tls_config(mut self, tls: Arc<rustls::ClientConfig>) -> Self {
        self.tls = Some(tls);
        self
    }
}

/// Build a configured HTTP client.
///
/// Creates a reqwest client with rustls TLS, connection pooling, and
/// the specified configuration.
///
/// # Errors
///
/// Returns an error if the client cannot be built (e.g., TLS initialization fails).
///
/// # Examples
///
/// ```
/// use rust_common::{HttpConfig, build_http_client};
/// use std::time::Duration;
///
/// let config = HttpConfig::default()
///     .with_timeout(Duration::from_secs(60));
/// let client = build_http_client(&config).expect("Failed to build client");
/// ```
pub fn build_http_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    let builder = ClientBuilder::new()
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .pool_idle_timeout(config.pool_idle_timeout)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .user_agent(&config.user_agent)
        .redirect(if config.follow_redirects {
            redirect::Policy::default()
        } else {
            redirect::Policy::none()
        });

    let builder = match &config.tls {
        Some(tls) => builder.use_preconfigured_tls(rustls::ClientConfig::clone(tls)),
        None => builder.use_rustls_tls(),
    };

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HttpConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.pool_max_idle_per_host, 10);
        assert!(config.follow_redirects);
        assert!(config.tls.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = HttpConfig::default()
            .with_timeout(Duration::from_secs(60))
            .with_user_agent("test-agent")
            .without_redirects();

        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.user_agent, "test-agent");
        assert!(!config.follow_redirects);
    }

    #[test]
    fn test_build_client() {
        let config = HttpConfig::default();
        let result = build_http_client(&config);
        assert!(result.is_ok());
    }

    #[test]
    fn test_build_client_without_redirects() {
        let config = HttpConfig::default().without_redirects();
        assert!(build_http_client(&config).is_ok());
    }

    #[test]
    fn test_build_client_with_custom_tls() {
        let tls = rustls::ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(rustls::RootCertStore::empty())
        .with_no_client_auth();

        let config = HttpConfig::default().with_tls_config(Arc::new(tls));
        assert!(config.tls.is_some());
        assert!(build_http_client(&config).is_ok());
    }
}
