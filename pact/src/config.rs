//! Verifier configuration with environment variable support.

use std::env;
use std::time::Duration;

use rust_common::{LogLevel, TracingConfig};
use thiserror::Error;

/// Default time to wait for the verification proxy to accept connections.
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default hostname for servers started by the verifier.
pub const DEFAULT_HOSTNAME: &str = "localhost";

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Environment variable parse error
    #[error("Failed to parse environment variable {name}: {reason}")]
    ParseError {
        /// Variable name
        name: String,
        /// Parser message
        reason: String,
    },

    /// Client timeout must be positive
    #[error("Invalid client timeout: must be greater than 0")]
    InvalidTimeout,
}

/// Verifier-wide settings.
///
/// `client_timeout` and `hostname` stay `None` until [`apply_defaults`](Self::apply_defaults)
/// runs; a verify request may override both.
#[derive(Debug, Clone, Default)]
pub struct VerifierConfig {
    /// How long to wait for the proxy to become reachable
    pub client_timeout: Option<Duration>,
    /// Hostname the dummy provider binds to
    pub hostname: Option<String>,
    /// Port for the verification proxy (0 = ephemeral)
    pub proxy_port: u16,
    /// Initial log level
    pub log_level: LogLevel,
}

impl VerifierConfig {
    /// Loads configuration from environment variables with validation.
    ///
    /// Reads `PACT_CLIENT_TIMEOUT` (seconds), `PACT_HOSTNAME`,
    /// `PACT_PROXY_PORT` and `PACT_LOG_LEVEL`, after loading `.env` if present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set but malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let config = Self {
            client_timeout: parse_var(&lookup, "PACT_CLIENT_TIMEOUT")?.map(Duration::from_secs),
            hostname: lookup("PACT_HOSTNAME").filter(|h| !h.trim().is_empty()),
            proxy_port: parse_var(&lookup, "PACT_PROXY_PORT")?.unwrap_or(0),
            log_level: parse_var(&lookup, "PACT_LOG_LEVEL")?.unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.client_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(())
    }

    /// Fill unset values with their defaults.
    pub fn apply_defaults(&mut self) {
        self.client_timeout.get_or_insert(DEFAULT_CLIENT_TIMEOUT);
        self.hostname
            .get_or_insert_with(|| DEFAULT_HOSTNAME.to_string());
    }

    /// Set the client timeout.
    #[must_use]
    pub const fn with_client_timeout(mut self, timeout: Duration) -> Self {
        self.client_timeout = Some(timeout);
        self
    }

    /// Set the hostname.
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Set a fixed proxy port.
    #[must_use]
    pub const fn with_proxy_port(mut self, port: u16) -> Self {
        self.proxy_port = port;
        self
    }

    /// Effective client timeout.
    #[must_use]
    pub fn client_timeout(&self) -> Duration {
        self.client_timeout.unwrap_or(DEFAULT_CLIENT_TIMEOUT)
    }

    /// Effective hostname.
    #[must_use]
    pub fn hostname(&self) -> &str {
        self.hostname.as_deref().unwrap_or(DEFAULT_HOSTNAME)
    }

    /// Subscriber settings at the configured log level.
    #[must_use]
    pub fn tracing_config(&self) -> TracingConfig {
        TracingConfig::default().with_log_level(self.log_level)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(name)
        .map(|val| {
            val.trim().parse().map_err(|e: T::Err| ConfigError::ParseError {
                name: name.to_string(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_applied_lazily() {
        let mut config = VerifierConfig::default();
        assert!(config.client_timeout.is_none());
        assert!(config.hostname.is_none());

        config.apply_defaults();
        assert_eq!(config.client_timeout, Some(Duration::from_secs(10)));
        assert_eq!(config.hostname.as_deref(), Some("localhost"));
    }

    #[test]
    fn test_apply_defaults_keeps_explicit_values() {
        let mut config = VerifierConfig::default()
            .with_client_timeout(Duration::from_secs(3))
            .with_hostname("127.0.0.1");
        config.apply_defaults();
        assert_eq!(config.client_timeout(), Duration::from_secs(3));
        assert_eq!(config.hostname(), "127.0.0.1");
    }

    #[test]
    fn test_from_lookup_reads_all_variables() {
        let config = VerifierConfig::from_lookup(lookup_from(&[
            ("PACT_CLIENT_TIMEOUT", "25"),
            ("PACT_HOSTNAME", "0.0.0.0"),
            ("PACT_PROXY_PORT", "8811"),
            ("PACT_LOG_LEVEL", "debug"),
        ]))
        .unwrap();

        assert_eq!(config.client_timeout, Some(Duration::from_secs(25)));
        assert_eq!(config.hostname(), "0.0.0.0");
        assert_eq!(config.proxy_port, 8811);
        assert_eq!(config.log_level, LogLevel::Debug);
    }

    #[test]
    fn test_tracing_config_uses_log_level() {
        let config = VerifierConfig::from_lookup(lookup_from(&[("PACT_LOG_LEVEL", "WARN")])).unwrap();
        assert_eq!(config.tracing_config().log_level, LogLevel::Warn);
    }

    #[test]
    fn test_from_lookup_empty_environment() {
        let config = VerifierConfig::from_lookup(|_| None).unwrap();
        assert!(config.client_timeout.is_none());
        assert!(config.hostname.is_none());
        assert_eq!(config.proxy_port, 0);
        assert_eq!(config.log_level, LogLevel::Info);
    }

    #[test]
    fn test_blank_hostname_is_unset() {
        let config = VerifierConfig::from_lookup(lookup_from(&[("PACT_HOSTNAME", "  ")])).unwrap();
        assert!(config.hostname.is_none());
    }

    #[test]
    fn test_invalid_port_rejected() {
        let result = VerifierConfig::from_lookup(lookup_from(&[("PACT_PROXY_PORT", "70000")]));
        assert!(matches!(result, Err(ConfigError::ParseError { name, .. }) if name == "PACT_PROXY_PORT"));
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let result = VerifierConfig::from_lookup(lookup_from(&[("PACT_LOG_LEVEL", "LOUD")]));
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = VerifierConfig::from_lookup(lookup_from(&[("PACT_CLIENT_TIMEOUT", "0")]));
        assert!(matches!(result, Err(ConfigError::InvalidTimeout)));
    }
}
