//! Tracing subscriber setup with a reloadable log level.
//!
//! The level filter is owned by the [`LogLevelHandle`] returned from
//! [`init_tracing`]; callers pass that handle to whatever needs to change the
//! level at runtime.

use std::fmt;
use std::str::FromStr;

use tracing::Subscriber;
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, reload};

use crate::PlatformError;

/// Log levels accepted by the verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum LogLevel {
    /// Raw payloads and per-request detail
    Trace,
    /// Lifecycle steps
    Debug,
    /// Normal operation
    #[default]
    Info,
    /// Recoverable oddities
    Warn,
    /// Failures
    Error,
}

impl LogLevel {
    /// All levels, most verbose first.
    pub const ALL: [Self; 5] = [Self::Trace, Self::Debug, Self::Info, Self::Warn, Self::Error];

    /// Upper-case level name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }

    /// Filter directive understood by [`EnvFilter`].
    #[must_use]
    pub const fn directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    fn filter(self) -> EnvFilter {
        EnvFilter::new(self.directive())
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                PlatformError::invalid_input(format!(
                    r#"invalid logLevel '{s}'. Please specify one of "TRACE", "DEBUG", "INFO", "WARN", "ERROR""#
                ))
            })
    }
}

/// Tracing configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Service name for tracing
    pub service_name: String,
    /// Initial log level
    pub log_level: LogLevel,
    /// Whether to output JSON format
    pub json_output: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "pact-provider".to_string(),
            log_level: LogLevel::Info,
            json_output: false,
        }
    }
}

impl TracingConfig {
    /// Create config with custom service name.
    #[must_use]
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Create config with custom log level.
    #[must_use]
    pub const fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Enable JSON output.
    #[must_use]
    pub const fn with_json_output(mut self) -> Self {
        self.json_output = true;
        self
    }
}

/// Changes the level of the subscriber it was created with.
#[derive(Debug, Clone)]
pub struct LogLevelHandle {
    inner: reload::Handle<EnvFilter, Registry>,
}

impl LogLevelHandle {
    /// Replace the active filter with `level`.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Internal`] if the subscriber has been dropped.
    pub fn set_level(&self, level: LogLevel) -> Result<(), PlatformError> {
        self.inner
            .reload(level.filter())
            .map_err(|e| PlatformError::internal(format!("unable to set log level: {e}")))
    }

    /// Current filter as a directive string, if the subscriber is alive.
    #[must_use]
    pub fn current(&self) -> Option<String> {
        self.inner.with_current(ToString::to_string).ok()
    }
}

/// Build a subscriber without installing it.
///
/// `RUST_LOG` overrides the configured level when set.
#[must_use]
pub fn build_subscriber(
    config: &TracingConfig,
) -> (Box<dyn Subscriber + Send + Sync>, LogLevelHandle) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.filter());
    let (filter, handle) = reload::Layer::new(filter);
    let registry = tracing_subscriber::registry().with(filter);

    let subscriber: Box<dyn Subscriber + Send + Sync> = if config.json_output {
        Box::new(registry.with(tracing_subscriber::fmt::layer().json()))
    } else {
        Box::new(registry.with(tracing_subscriber::fmt::layer()))
    };

    (subscriber, LogLevelHandle { inner: handle })
}

/// Initialize tracing with the given configuration.
///
/// Installs the global subscriber; call once at startup.
///
/// # Errors
///
/// Returns [`PlatformError::Internal`] if a global subscriber is already set.
pub fn init_tracing(config: &TracingConfig) -> Result<LogLevelHandle, PlatformError> {
    let (subscriber, handle) = build_subscriber(config);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| PlatformError::internal(format!("unable to install subscriber: {e}")))?;
    tracing::debug!(service = %config.service_name, level = %config.log_level, "initialised logging");
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TracingConfig::default();
        assert_eq!(config.service_name, "pact-provider");
        assert_eq!(config.log_level, LogLevel::Info);
        assert!(!config.json_output);
    }

    #[test]
    fn test_config_builder() {
        let config = TracingConfig::default()
            .with_service_name("my-provider")
            .with_log_level(LogLevel::Debug)
            .with_json_output();

        assert_eq!(config.service_name, "my-provider");
        assert_eq!(config.log_level, LogLevel::Debug);
        assert!(config.json_output);
    }

    #[test]
    fn test_parse_levels() {
        assert_eq!("TRACE".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert_eq!("debug".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!(" Warn ".parse::<LogLevel>().unwrap(), LogLevel::Warn);
    }

    #[test]
    fn test_parse_invalid_level() {
        let err = "VERBOSE".parse::<LogLevel>().unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"Invalid input: invalid logLevel 'VERBOSE'. Please specify one of "TRACE", "DEBUG", "INFO", "WARN", "ERROR""#
        );
    }

    #[test]
    fn test_set_level_on_live_subscriber() {
        let (subscriber, handle) = build_subscriber(&TracingConfig::default());
        tracing::subscriber::with_default(subscriber, || {
            handle.set_level(LogLevel::Error).unwrap();
            assert_eq!(handle.current().as_deref(), Some("error"));
        });
    }

    #[test]
    fn test_set_level_after_subscriber_dropped() {
        let (subscriber, handle) = build_subscriber(&TracingConfig::default());
        drop(subscriber);
        assert!(handle.set_level(LogLevel::Debug).is_err());
    }
}
