//! Verification orchestrator.
//!
//! A run moves through [`VerifierPhase`]s: defaults are applied, a dummy
//! provider is started when no provider URL is given, the request is
//! validated, the proxy is started with the middleware built from the
//! request, and once the proxy accepts connections the engine takes over.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_common::{LogLevel, LogLevelHandle, PlatformError};
use tracing::{debug, error, info};
use url::Url;

use crate::config::{DEFAULT_CLIENT_TIMEOUT, DEFAULT_HOSTNAME, VerifierConfig};
use crate::dummy::DummyProvider;
use crate::error::{BoxError, VerifyError, VerifyResult};
use crate::handler::{Hook, MessageHandlers, StateHandlers};
use crate::middleware::{
    AfterEachLayer, BeforeEachLayer, MessageHandlerLayer, Middleware, StateHandlerLayer,
};
use crate::models::{PROVIDER_STATES_SETUP_PATH, Transport};
use crate::port::wait_for_port;
use crate::proxy::{ProxyHandle, ProxyOptions, start_reverse_proxy};

/// Sink for the engine's human readable output.
pub trait OutputWriter: Send {
    /// Write one line.
    fn log(&mut self, line: &str);
}

/// Forwards engine output to `tracing` at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingOutput;

impl OutputWriter for TracingOutput {
    fn log(&mut self, line: &str) {
        info!(target: "pact_provider::output", "{line}");
    }
}

impl OutputWriter for Vec<String> {
    fn log(&mut self, line: &str) {
        self.push(line.to_string());
    }
}

/// The engine that reads pacts and replays interactions against the proxy.
#[async_trait]
pub trait VerificationEngine: Send + Sync {
    /// Reject a request the engine cannot run.
    ///
    /// # Errors
    ///
    /// Any engine-specific validation failure.
    fn validate(&self, request: &VerifyRequest) -> Result<(), BoxError>;

    /// Run the verification.
    ///
    /// # Errors
    ///
    /// Any engine-specific verification failure.
    async fn run(
        &self,
        request: &VerifyRequest,
        output: &mut dyn OutputWriter,
    ) -> Result<(), BoxError>;
}

/// Everything a single verification needs.
#[derive(Clone, Default)]
pub struct VerifyRequest {
    /// Provider name
    pub provider: String,
    /// Base URL of the real provider; a dummy provider is used when unset
    pub provider_base_url: Option<String>,
    /// Local pact files
    pub pact_files: Vec<PathBuf>,
    /// Directories of pact files
    pub pact_dirs: Vec<PathBuf>,
    /// Pact broker to fetch pacts from
    pub broker_url: Option<String>,
    /// Provider version, required when publishing results
    pub provider_version: Option<String>,
    /// Provider branch
    pub provider_branch: Option<String>,
    /// Publish results to the broker
    pub publish_verification_results: bool,
    /// Fail when no pact is found
    pub fail_if_no_pacts_found: bool,
    /// Legacy provider-states URL; points at the proxy when unset and state handlers exist
    pub provider_states_setup_url: Option<String>,
    /// Hook run before each interaction
    pub before_each: Option<Arc<dyn Hook>>,
    /// Hook run after each interaction
    pub after_each: Option<Arc<dyn Hook>>,
    /// State name to handler
    pub state_handlers: StateHandlers,
    /// Message description to producer
    pub message_handlers: MessageHandlers,
    /// Middleware applied to every proxied request
    pub request_filter: Option<Middleware>,
    /// TLS client configuration for an HTTPS provider
    pub custom_tls_config: Option<Arc<rustls::ClientConfig>>,
    /// Transports registered with the engine
    pub transports: Vec<Transport>,
    /// How long to wait for the proxy (default 10s)
    pub client_timeout: Option<Duration>,
    /// Hostname for servers started by the verifier (default `localhost`)
    pub hostname: Option<String>,
    /// Proxy port, set once the proxy is running
    pub proxy_port: Option<u16>,
}

impl VerifyRequest {
    /// Request for `provider` with nothing else set.
    #[must_use]
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            ..Self::default()
        }
    }

    /// Set the provider base URL.
    #[must_use]
    pub fn with_provider_base_url(mut self, url: impl Into<String>) -> Self {
        self.provider_base_url = Some(url.into());
        self
    }

    /// Add a pact file.
    #[must_use]
    pub fn with_pact_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.pact_files.push(path.into());
        self
    }

    /// Add a directory of pact files.
    #[must_use]
    pub fn with_pact_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.pact_dirs.push(path.into());
        self
    }

    /// Fetch pacts from a broker.
    #[must_use]
    pub fn with_broker_url(mut self, url: impl Into<String>) -> Self {
        self.broker_url = Some(url.into());
        self
    }

    /// Set the provider version.
    #[must_use]
    pub fn with_provider_version(mut self, version: impl Into<String>) -> Self {
        self.provider_version = Some(version.into());
        self
    }

    /// Set the provider branch.
    #[must_use]
    pub fn with_provider_branch(mut self, branch: impl Into<String>) -> Self {
        self.provider_branch = Some(branch.into());
        self
    }

    /// Publish verification results.
    #[must_use]
    pub const fn publish_verification_results(mut self, publish: bool) -> Self {
        self.publish_verification_results = publish;
        self
    }

    /// Fail when no pact is found.
    #[must_use]
    pub const fn fail_if_no_pacts_found(mut self, fail: bool) -> Self {
        self.fail_if_no_pacts_found = fail;
        self
    }

    /// Set the legacy provider-states URL.
    #[must_use]
    pub fn with_provider_states_setup_url(mut self, url: impl Into<String>) -> Self {
        self.provider_states_setup_url = Some(url.into());
        self
    }

    /// Run `hook` before each interaction.
    #[must_use]
    pub fn with_before_each(mut self, hook: impl Hook + 'static) -> Self {
        self.before_each = Some(Arc::new(hook));
        self
    }

    /// Run `hook` after each interaction.
    #[must_use]
    pub fn with_after_each(mut self, hook: impl Hook + 'static) -> Self {
        self.after_each = Some(Arc::new(hook));
        self
    }

    /// Set the state handlers.
    #[must_use]
    pub fn with_state_handlers(mut self, handlers: StateHandlers) -> Self {
        self.state_handlers = handlers;
        self
    }

    /// Set the message handlers.
    #[must_use]
    pub fn with_message_handlers(mut self, handlers: MessageHandlers) -> Self {
        self.message_handlers = handlers;
        self
    }

    /// Set the request filter.
    #[must_use]
    pub fn with_request_filter(mut self, filter: Middleware) -> Self {
        self.request_filter = Some(filter);
        self
    }

    /// Use a custom TLS client configuration towards the provider.
    #[must_use]
    pub fn with_custom_tls_config(mut self, tls: Arc<rustls::ClientConfig>) -> Self {
        self.custom_tls_config = Some(tls);
        self
    }

    /// Register an extra transport.
    #[must_use]
    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transports.push(transport);
        self
    }

    /// Override the client timeout.
    #[must_use]
    pub const fn with_client_timeout(mut self, timeout: Duration) -> Self {
        self.client_timeout = Some(timeout);
        self
    }

    /// Override the hostname.
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
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

    /// Base URL the engine should send provider calls to, once the proxy runs.
    #[must_use]
    pub fn proxy_base_url(&self) -> Option<String> {
        self.proxy_port
            .map(|port| format!("http://{}:{port}", self.hostname()))
    }

    /// The provider base URL, parsed.
    ///
    /// # Errors
    ///
    /// Fails when the URL is missing, unparseable, or lacks a host or port.
    pub fn provider_url(&self) -> VerifyResult<Url> {
        let raw = self
            .provider_base_url
            .as_deref()
            .ok_or_else(|| VerifyError::invalid_config("no provider base URL"))?;
        let url =
            Url::parse(raw).map_err(|e| VerifyError::invalid_provider_url(raw, e.to_string()))?;
        if url.host_str().is_none() {
            return Err(VerifyError::invalid_provider_url(raw, "missing host"));
        }
        if url.port_or_known_default().is_none() {
            return Err(VerifyError::invalid_provider_url(raw, "missing port"));
        }
        Ok(url)
    }

    /// Local checks followed by the engine's own validation.
    ///
    /// # Errors
    ///
    /// [`VerifyError::InvalidConfig`] or [`VerifyError::InvalidProviderUrl`]
    /// for local problems, [`VerifyError::Engine`] for engine rejections.
    pub fn validate(&self, engine: &dyn VerificationEngine) -> VerifyResult<()> {
        if self.pact_files.is_empty() && self.pact_dirs.is_empty() && self.broker_url.is_none() {
            return Err(VerifyError::invalid_config(
                "one of pact files, pact directories or a broker URL is required",
            ));
        }
        self.provider_url()?;
        if self.publish_verification_results && self.provider_version.is_none() {
            return Err(VerifyError::invalid_config(
                "a provider version is required to publish verification results",
            ));
        }
        engine.validate(self).map_err(VerifyError::Engine)
    }

    /// Add the message transport when message handlers are registered.
    pub fn register_transports(&mut self, proxy_port: u16) {
        if !self.message_handlers.is_empty() {
            self.transports.push(Transport::message(proxy_port));
        }
    }
}

impl fmt::Debug for VerifyRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifyRequest")
            .field("provider", &self.provider)
            .field("provider_base_url", &self.provider_base_url)
            .field("pact_files", &self.pact_files)
            .field("pact_dirs", &self.pact_dirs)
            .field("broker_url", &self.broker_url)
            .field("provider_version", &self.provider_version)
            .field("provider_branch", &self.provider_branch)
            .field("publish_verification_results", &self.publish_verification_results)
            .field("provider_states_setup_url", &self.provider_states_setup_url)
            .field("before_each", &self.before_each.is_some())
            .field("after_each", &self.after_each.is_some())
            .field("state_handlers", &self.state_handlers)
            .field("message_handlers", &self.message_handlers)
            .field("request_filter", &self.request_filter.is_some())
            .field("transports", &self.transports)
            .field("client_timeout", &self.client_timeout)
            .field("hostname", &self.hostname)
            .field("proxy_port", &self.proxy_port)
            .finish_non_exhaustive()
    }
}

/// Middleware for `request`, outermost first.
///
/// Order: before hook, after hook, state handlers, message handlers,
/// request filter. Absent pieces are skipped.
#[must_use]
pub fn build_middleware(request: &VerifyRequest) -> Vec<Middleware> {
    let mut middleware = Vec::new();
    if let Some(hook) = &request.before_each {
        middleware.push(Middleware::from_layer(BeforeEachLayer::new(Arc::clone(hook))));
    }
    if let Some(hook) = &request.after_each {
        middleware.push(Middleware::from_layer(AfterEachLayer::new(Arc::clone(hook))));
    }
    if !request.state_handlers.is_empty() {
        middleware.push(Middleware::from_layer(StateHandlerLayer::new(
            request.state_handlers.clone(),
        )));
    }
    if !request.message_handlers.is_empty() {
        middleware.push(Middleware::from_layer(MessageHandlerLayer::new(
            request.message_handlers.clone(),
        )));
    }
    if let Some(filter) = &request.request_filter {
        middleware.push(filter.clone());
    }
    middleware
}

/// Where a verification run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerifierPhase {
    /// Not started
    #[default]
    Init,
    /// Defaults applied, dummy provider and validation pending
    Configuring,
    /// Starting the proxy
    ProxyStarting,
    /// Proxy accepts connections
    ProxyReady,
    /// Engine running
    Verifying,
    /// Finished successfully
    Done,
    /// Stopped on an error
    Failed,
}

/// Servers owned by one run.
#[derive(Default)]
struct RunResources {
    dummy: Option<DummyProvider>,
    proxy: Option<ProxyHandle>,
}

impl RunResources {
    async fn shutdown(self) {
        if let Some(proxy) = self.proxy {
            proxy.shutdown().await;
        }
        if let Some(dummy) = self.dummy {
            dummy.shutdown().await;
        }
    }
}

/// Runs provider verifications through an engine.
pub struct Verifier<E> {
    engine: E,
    config: VerifierConfig,
    log_handle: Option<LogLevelHandle>,
    phase: VerifierPhase,
}

impl<E: VerificationEngine> Verifier<E> {
    /// Verifier with default configuration.
    pub fn new(engine: E) -> Self {
        Self::with_config(engine, VerifierConfig::default())
    }

    /// Verifier with explicit configuration.
    pub fn with_config(engine: E, mut config: VerifierConfig) -> Self {
        config.apply_defaults();
        Self {
            engine,
            config,
            log_handle: None,
            phase: VerifierPhase::Init,
        }
    }

    /// Verifier configured from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Config`] for malformed variables.
    pub fn from_env(engine: E) -> VerifyResult<Self> {
        Ok(Self::with_config(engine, VerifierConfig::from_env()?))
    }

    /// Let this verifier change the log level of the installed subscriber.
    #[must_use]
    pub fn with_log_handle(mut self, handle: LogLevelHandle) -> Self {
        self.log_handle = Some(handle);
        self
    }

    /// Change the log level.
    ///
    /// # Errors
    ///
    /// Fails when no log handle was given or the filter cannot be reloaded.
    pub fn set_log_level(&self, level: LogLevel) -> VerifyResult<()> {
        let handle = self
            .log_handle
            .as_ref()
            .ok_or_else(|| PlatformError::invalid_input("no log level handle installed"))?;
        handle.set_level(level)?;
        Ok(())
    }

    /// The engine.
    pub const fn engine(&self) -> &E {
        &self.engine
    }

    /// Effective configuration.
    pub const fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Phase the last run reached.
    pub const fn phase(&self) -> VerifierPhase {
        self.phase
    }

    fn enter(&mut self, next: VerifierPhase) {
        debug!(from = ?self.phase, to = ?next, "verifier phase change");
        self.phase = next;
    }

    /// Verify the provider, returning the engine's result.
    ///
    /// The dummy provider and the proxy are stopped before this returns.
    ///
    /// # Errors
    ///
    /// Any [`VerifyError`]; engine failures come back as [`VerifyError::Engine`].
    pub async fn verify_provider_raw(
        &mut self,
        mut request: VerifyRequest,
        output: &mut dyn OutputWriter,
    ) -> VerifyResult<()> {
        self.phase = VerifierPhase::Init;
        let mut resources = RunResources::default();

        let result = self.run(&mut request, output, &mut resources).await;
        resources.shutdown().await;

        match &result {
            Ok(()) => self.enter(VerifierPhase::Done),
            Err(err) => {
                error!(provider = %request.provider, error = %err, "provider verification failed");
                self.enter(VerifierPhase::Failed);
            }
        }
        result
    }

    /// Verify the provider inside a test.
    ///
    /// # Panics
    ///
    /// Panics when verification fails, failing the calling test.
    pub async fn verify_provider(&mut self, request: VerifyRequest) {
        let mut output = TracingOutput;
        if let Err(err) = self.verify_provider_raw(request, &mut output).await {
            panic!("provider verification failed: {err}");
        }
    }

    async fn run(
        &mut self,
        request: &mut VerifyRequest,
        output: &mut dyn OutputWriter,
        resources: &mut RunResources,
    ) -> VerifyResult<()> {
        self.enter(VerifierPhase::Configuring);
        request
            .client_timeout
            .get_or_insert(self.config.client_timeout());
        if request.hostname.is_none() {
            request.hostname = Some(self.config.hostname().to_string());
        }

        if request
            .provider_base_url
            .as_deref()
            .is_none_or(|url| url.trim().is_empty())
        {
            let dummy = DummyProvider::start(request.hostname()).await?;
            request.provider_base_url = Some(dummy.base_url().to_string());
            resources.dummy = Some(dummy);
        }
        request.validate(&self.engine)?;

        self.enter(VerifierPhase::ProxyStarting);
        let mut options = ProxyOptions::for_target(&request.provider_url()?)?;
        options.proxy_port = self.config.proxy_port;
        options.middleware = build_middleware(request);
        options.custom_tls_config.clone_from(&request.custom_tls_config);

        let proxy = start_reverse_proxy(options).await?;
        let port = proxy.port();
        resources.proxy = Some(proxy);

        request.register_transports(port);
        if request.provider_states_setup_url.is_none() && !request.state_handlers.is_empty() {
            request.provider_states_setup_url =
                Some(format!("http://localhost:{port}{PROVIDER_STATES_SETUP_PATH}"));
        }
        request.proxy_port = Some(port);

        wait_for_port(
            port,
            "tcp",
            "localhost",
            request.client_timeout(),
            &format!("Timed out waiting for http verification proxy on port {port} - check for errors"),
        )
        .await
        .map_err(|e| VerifyError::ProxyStartTimeout(Box::new(e)))?;
        self.enter(VerifierPhase::ProxyReady);

        self.enter(VerifierPhase::Verifying);
        self.engine
            .run(request, output)
            .await
            .map_err(VerifyError::Engine)
    }
}

impl<E> fmt::Debug for Verifier<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Verifier")
            .field("config", &self.config)
            .field("log_handle", &self.log_handle.is_some())
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::models::{Message, ProviderState, ProviderStateResponse};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Engine that records what it saw and optionally fails.
    #[derive(Default)]
    struct RecordingEngine {
        runs: AtomicUsize,
        seen: Mutex<Option<VerifyRequest>>,
        reject: bool,
        fail: bool,
    }

    #[async_trait]
    impl VerificationEngine for RecordingEngine {
        fn validate(&self, _request: &VerifyRequest) -> Result<(), BoxError> {
            if self.reject { Err("engine rejected the request".into()) } else { Ok(()) }
        }

        async fn run(
            &self,
            request: &VerifyRequest,
            output: &mut dyn OutputWriter,
        ) -> Result<(), BoxError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            *self.seen.lock().unwrap() = Some(request.clone());
            output.log("1 interaction, 0 failures");
            if self.fail { Err("1 interaction failed".into()) } else { Ok(()) }
        }
    }

    fn request() -> VerifyRequest {
        VerifyRequest::new("user-service").with_pact_file("pacts/web-user-service.json")
    }

    fn no_state(_setup: bool, _state: &ProviderState) -> Result<Option<ProviderStateResponse>, BoxError> {
        Ok(None)
    }

    #[tokio::test]
    async fn test_run_with_dummy_provider() {
        let mut verifier = Verifier::new(RecordingEngine::default());
        let mut output: Vec<String> = Vec::new();

        verifier.verify_provider_raw(request(), &mut output).await.unwrap();

        assert_eq!(verifier.phase(), VerifierPhase::Done);
        assert_eq!(output, vec!["1 interaction, 0 failures".to_string()]);
        let seen = verifier.engine().seen.lock().unwrap().clone().unwrap();
        assert!(seen.provider_base_url.unwrap().starts_with("http://localhost:"));
        assert!(seen.proxy_port.is_some());
        assert_eq!(seen.client_timeout, Some(DEFAULT_CLIENT_TIMEOUT));
        assert_eq!(seen.hostname.as_deref(), Some("localhost"));
        assert!(seen.transports.is_empty());
        assert!(seen.provider_states_setup_url.is_none());
    }

    #[tokio::test]
    async fn test_blank_provider_url_starts_dummy() {
        let mut verifier = Verifier::new(RecordingEngine::default());

        verifier
            .verify_provider_raw(request().with_provider_base_url(""), &mut Vec::<String>::new())
            .await
            .unwrap();

        let seen = verifier.engine().seen.lock().unwrap().clone().unwrap();
        assert!(seen.provider_base_url.unwrap().starts_with("http://localhost:"));
    }

    #[tokio::test]
    async fn test_huge_client_timeout_runs_engine() {
        let mut verifier = Verifier::new(RecordingEngine::default());
        let request = request().with_client_timeout(Duration::from_secs(u64::MAX));

        verifier.verify_provider_raw(request, &mut Vec::<String>::new()).await.unwrap();

        assert_eq!(verifier.engine().runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_custom_tls_config_reaches_engine() {
        let tls = rustls::ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(rustls::RootCertStore::empty())
        .with_no_client_auth();
        let tls = Arc::new(tls);
        let mut verifier = Verifier::new(RecordingEngine::default());

        verifier
            .verify_provider_raw(
                request().with_custom_tls_config(Arc::clone(&tls)),
                &mut Vec::<String>::new(),
            )
            .await
            .unwrap();

        let seen = verifier.engine().seen.lock().unwrap().clone().unwrap();
        assert!(Arc::ptr_eq(&seen.custom_tls_config.unwrap(), &tls));
    }

    #[tokio::test]
    async fn test_handlers_register_transport_and_setup_url() {
        let mut verifier = Verifier::new(RecordingEngine::default());
        let request = request()
            .with_state_handlers(StateHandlers::new().with_fn("a user exists", no_state))
            .with_message_handlers(MessageHandlers::new().with_fn(
                "a user event",
                |_states: &[ProviderState]| -> Result<Message, BoxError> {
                    Ok(Message::json(serde_json::json!({})))
                },
            ));

        verifier.verify_provider_raw(request, &mut Vec::<String>::new()).await.unwrap();

        let seen = verifier.engine().seen.lock().unwrap().clone().unwrap();
        let port = seen.proxy_port.unwrap();
        assert_eq!(seen.transports, vec![Transport::message(port)]);
        assert_eq!(
            seen.provider_states_setup_url,
            Some(format!("http://localhost:{port}/__setup"))
        );
    }

    #[tokio::test]
    async fn test_explicit_setup_url_is_kept() {
        let mut verifier = Verifier::new(RecordingEngine::default());
        let request = request()
            .with_provider_states_setup_url("http://localhost:9999/custom")
            .with_state_handlers(StateHandlers::new().with_fn("a user exists", no_state));

        verifier.verify_provider_raw(request, &mut Vec::<String>::new()).await.unwrap();

        let seen = verifier.engine().seen.lock().unwrap().clone().unwrap();
        assert_eq!(
            seen.provider_states_setup_url.as_deref(),
            Some("http://localhost:9999/custom")
        );
    }

    #[tokio::test]
    async fn test_missing_pact_source_fails_before_proxy() {
        let mut verifier = Verifier::new(RecordingEngine::default());

        let err = verifier
            .verify_provider_raw(VerifyRequest::new("user-service"), &mut Vec::<String>::new())
            .await
            .unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert_eq!(verifier.phase(), VerifierPhase::Failed);
        assert_eq!(verifier.engine().runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_engine_rejection_is_returned() {
        let engine = RecordingEngine {
            reject: true,
            ..RecordingEngine::default()
        };
        let mut verifier = Verifier::new(engine);

        let err = verifier
            .verify_provider_raw(request(), &mut Vec::<String>::new())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "engine rejected the request");
        assert_eq!(verifier.engine().runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_engine_failure_is_verbatim() {
        let engine = RecordingEngine {
            fail: true,
            ..RecordingEngine::default()
        };
        let mut verifier = Verifier::new(engine);

        let err = verifier
            .verify_provider_raw(request(), &mut Vec::<String>::new())
            .await
            .unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Verification);
        assert_eq!(err.to_string(), "1 interaction failed");
    }

    #[tokio::test]
    async fn test_readiness_timeout_never_runs_engine() {
        let mut verifier = Verifier::new(RecordingEngine::default());
        let request = request().with_client_timeout(Duration::from_millis(1));

        let err = verifier
            .verify_provider_raw(request, &mut Vec::<String>::new())
            .await
            .unwrap_err();

        assert!(matches!(err, VerifyError::ProxyStartTimeout(_)));
        assert_eq!(err.category(), ErrorCategory::Readiness);
        assert_eq!(verifier.engine().runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    #[should_panic(expected = "provider verification failed")]
    async fn test_verify_provider_panics_on_failure() {
        let engine = RecordingEngine {
            fail: true,
            ..RecordingEngine::default()
        };
        Verifier::new(engine).verify_provider(request()).await;
    }

    #[test]
    fn test_validate_rules() {
        let engine = RecordingEngine::default();

        let bad_url = request().with_provider_base_url("not a url");
        assert!(matches!(
            bad_url.validate(&engine),
            Err(VerifyError::InvalidProviderUrl { .. })
        ));

        let unpublishable = request()
            .with_provider_base_url("http://localhost:8080")
            .publish_verification_results(true);
        assert!(matches!(
            unpublishable.validate(&engine),
            Err(VerifyError::InvalidConfig(_))
        ));

        let ok = unpublishable.with_provider_version("1.0.0");
        assert!(ok.validate(&engine).is_ok());
    }

    #[test]
    fn test_build_middleware_skips_absent_pieces() {
        assert!(build_middleware(&request()).is_empty());

        let full = request()
            .with_before_each(|| -> Result<(), BoxError> { Ok(()) })
            .with_after_each(|| -> Result<(), BoxError> { Ok(()) })
            .with_state_handlers(StateHandlers::new().with_fn("s", no_state))
            .with_request_filter(Middleware::map_request(|_req| {}));
        assert_eq!(build_middleware(&full).len(), 4);
    }

    #[test]
    fn test_proxy_base_url() {
        let mut request = request().with_hostname("127.0.0.1");
        assert_eq!(request.proxy_base_url(), None);
        request.proxy_port = Some(4321);
        assert_eq!(request.proxy_base_url().as_deref(), Some("http://127.0.0.1:4321"));
    }

    #[test]
    fn test_set_log_level_without_handle() {
        let verifier = Verifier::new(RecordingEngine::default());
        let err = verifier.set_log_level(LogLevel::Debug).unwrap_err();
        assert!(matches!(err, VerifyError::Platform(PlatformError::InvalidInput(_))));
    }
}
