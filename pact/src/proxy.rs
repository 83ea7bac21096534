//! Reverse proxy between the verification engine and the provider.
//!
//! Every exchange runs through the middleware chain. Whatever the chain does
//! not answer itself is forwarded to the upstream target with `reqwest`.

use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::IntoResponse;
use rust_common::{HttpConfig, PlatformError, build_http_client};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower::Layer;
use tower::util::BoxCloneService;
use tracing::{debug, error, info};
use url::Url;

use crate::error::{VerifyError, VerifyResult};
use crate::middleware::{
    Middleware, ProxyRequest, ProxyResponse, ProxyService, RequestLoggingLayer, TracingLayer, chain,
};
use crate::models::PROVIDER_STATES_SETUP_PATH;

/// Headers that only apply to a single connection.
const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Settings for [`start_reverse_proxy`].
#[derive(Clone)]
pub struct ProxyOptions {
    /// Upstream `host:port`
    pub target_address: String,
    /// Upstream scheme, `http` or `https`
    pub target_scheme: String,
    /// Path every forwarded request path is appended to
    pub target_path: String,
    /// Query merged into every forwarded request
    pub target_query: String,
    /// Port to listen on, `0` for an ephemeral one
    pub proxy_port: u16,
    /// Interface to listen on
    pub bind_host: String,
    /// Requests under this prefix keep their path when forwarded
    pub internal_request_path_prefix: String,
    /// Middleware, first entry outermost
    pub middleware: Vec<Middleware>,
    /// TLS client configuration for an HTTPS provider
    pub custom_tls_config: Option<Arc<rustls::ClientConfig>>,
    /// Upstream client settings
    pub http: HttpConfig,
}

impl Default for ProxyOptions {
    fn default() -> Self {
        Self {
            target_address: String::new(),
            target_scheme: "http".to_string(),
            target_path: String::new(),
            target_query: String::new(),
            proxy_port: 0,
            bind_host: "0.0.0.0".to_string(),
            internal_request_path_prefix: PROVIDER_STATES_SETUP_PATH.to_string(),
            middleware: Vec::new(),
            custom_tls_config: None,
            http: HttpConfig::default(),
        }
    }
}

impl ProxyOptions {
    /// Options proxying to the provider at `url`.
    ///
    /// # Errors
    ///
    /// Fails when the URL has no host or no known port.
    pub fn for_target(url: &Url) -> VerifyResult<Self> {
        let host = url
            .host_str()
            .ok_or_else(|| VerifyError::invalid_provider_url(url.as_str(), "missing host"))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| VerifyError::invalid_provider_url(url.as_str(), "missing port"))?;

        Ok(Self {
            target_address: format!("{host}:{port}"),
            target_scheme: url.scheme().to_string(),
            target_path: url.path().to_string(),
            target_query: url.query().unwrap_or_default().to_string(),
            ..Self::default()
        })
    }
}

impl fmt::Debug for ProxyOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyOptions")
            .field("target_address", &self.target_address)
            .field("target_scheme", &self.target_scheme)
            .field("target_path", &self.target_path)
            .field("target_query", &self.target_query)
            .field("proxy_port", &self.proxy_port)
            .field("bind_host", &self.bind_host)
            .field("internal_request_path_prefix", &self.internal_request_path_prefix)
            .field("middleware", &self.middleware.len())
            .field("custom_tls_config", &self.custom_tls_config.is_some())
            .finish_non_exhaustive()
    }
}

/// Join two path segments with exactly one `/` between them.
#[must_use]
pub fn single_joining_slash(a: &str, b: &str) -> String {
    match (a.ends_with('/'), b.starts_with('/')) {
        (true, true) => format!("{a}{}", &b[1..]),
        (false, false) => format!("{a}/{b}"),
        _ => format!("{a}{b}"),
    }
}

/// Where forwarded requests go.
#[derive(Debug, Clone)]
struct UpstreamTarget {
    scheme: String,
    address: String,
    path: String,
    query: String,
    internal_prefix: String,
}

impl UpstreamTarget {
    fn from_options(options: &ProxyOptions) -> Self {
        Self {
            scheme: options.target_scheme.clone(),
            address: options.target_address.clone(),
            path: options.target_path.clone(),
            query: options.target_query.clone(),
            internal_prefix: options.internal_request_path_prefix.clone(),
        }
    }

    fn url_for(&self, uri: &Uri) -> String {
        let request_path = uri.path();
        let path = if !self.internal_prefix.is_empty() && request_path.starts_with(&self.internal_prefix) {
            request_path.to_string()
        } else {
            single_joining_slash(&self.path, request_path)
        };

        let request_query = uri.query().unwrap_or_default();
        let query = match (self.query.is_empty(), request_query.is_empty()) {
            (true, _) => request_query.to_string(),
            (false, true) => self.query.clone(),
            (false, false) => format!("{}&{request_query}", self.query),
        };

        if query.is_empty() {
            format!("{}://{}{path}", self.scheme, self.address)
        } else {
            format!("{}://{}{path}?{query}", self.scheme, self.address)
        }
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();
    for name in listed {
        headers.remove(name.as_str());
    }
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }
}

fn bad_gateway() -> ProxyResponse {
    StatusCode::BAD_GATEWAY.into_response()
}

async fn forward(client: &reqwest::Client, target: &UpstreamTarget, req: ProxyRequest) -> ProxyResponse {
    let url = target.url_for(req.uri());
    let (parts, body) = req.into_parts();

    let body = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(body) => body,
        Err(err) => {
            error!(error = %err, "unable to read request body");
            return bad_gateway();
        }
    };

    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);

    let upstream = match client
        .request(parts.method, &url)
        .headers(headers)
        .body(body)
        .send()
        .await
    {
        Ok(upstream) => upstream,
        Err(err) => {
            error!(%url, error = %err, "upstream request failed");
            return bad_gateway();
        }
    };

    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    strip_hop_by_hop(&mut headers);

    let body = match upstream.bytes().await {
        Ok(body) => body,
        Err(err) => {
            error!(%url, error = %err, "unable to read upstream response");
            return bad_gateway();
        }
    };

    let mut response = Body::from(body).into_response();
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

fn forwarding_service(client: reqwest::Client, target: UpstreamTarget) -> ProxyService {
    let target = Arc::new(target);
    BoxCloneService::new(tower::service_fn(move |req: ProxyRequest| {
        let client = client.clone();
        let target = Arc::clone(&target);
        async move { Ok::<_, Infallible>(forward(&client, &target, req).await) }
    }))
}

/// A running reverse proxy, stopped when dropped.
#[derive(Debug)]
pub struct ProxyHandle {
    port: u16,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ProxyHandle {
    /// Port the proxy listens on.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Stop accepting connections and wait for in-flight exchanges.
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ProxyHandle {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

/// Bind the proxy and serve it in the background.
///
/// The listener is bound before this returns, so [`ProxyHandle::port`] is
/// final even when `proxy_port` is `0`.
///
/// # Errors
///
/// Returns [`VerifyError::PortAllocation`] if the port cannot be bound, or a
/// platform error if the upstream client cannot be built.
pub async fn start_reverse_proxy(options: ProxyOptions) -> VerifyResult<ProxyHandle> {
    let mut http = options.http.clone().without_redirects();
    if let Some(tls) = &options.custom_tls_config {
        http = http.with_tls_config(Arc::clone(tls));
    }
    let client = build_http_client(&http).map_err(PlatformError::from)?;

    let target = UpstreamTarget::from_options(&options);
    let mut middleware = options.middleware;
    middleware.push(Middleware::from_layer(RequestLoggingLayer));
    let service = TracingLayer::new("pact-provider-proxy")
        .layer(chain(&middleware, forwarding_service(client, target)));

    let listener = TcpListener::bind((options.bind_host.as_str(), options.proxy_port))
        .await
        .map_err(VerifyError::PortAllocation)?;
    let port = listener
        .local_addr()
        .map_err(VerifyError::PortAllocation)?
        .port();

    let app = Router::new().fallback_service(service);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let task = tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });
        if let Err(e) = server.await {
            error!(error = %e, "verification proxy stopped");
        }
    });

    info!(
        port,
        target = %format!("{}://{}{}", options.target_scheme, options.target_address, options.target_path),
        "started verification proxy"
    );
    debug!(middleware = middleware.len(), "proxy middleware installed");

    Ok(ProxyHandle {
        port,
        shutdown: Some(shutdown_tx),
        task: Some(task),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(path: &str, query: &str) -> UpstreamTarget {
        UpstreamTarget {
            scheme: "http".into(),
            address: "localhost:8080".into(),
            path: path.into(),
            query: query.into(),
            internal_prefix: "/__setup".into(),
        }
    }

    #[test]
    fn test_single_joining_slash() {
        assert_eq!(single_joining_slash("/api/", "/users"), "/api/users");
        assert_eq!(single_joining_slash("/api", "users"), "/api/users");
        assert_eq!(single_joining_slash("/api", "/users"), "/api/users");
        assert_eq!(single_joining_slash("/", "/users"), "/users");
        assert_eq!(single_joining_slash("", "/users"), "/users");
    }

    #[test]
    fn test_url_joins_target_path() {
        let uri: Uri = "/users/1?active=true".parse().unwrap();
        assert_eq!(
            target("/api", "").url_for(&uri),
            "http://localhost:8080/api/users/1?active=true"
        );
    }

    #[test]
    fn test_url_merges_queries() {
        let uri: Uri = "/users?page=2".parse().unwrap();
        assert_eq!(
            target("/", "key=abc").url_for(&uri),
            "http://localhost:8080/users?key=abc&page=2"
        );
        let uri: Uri = "/users".parse().unwrap();
        assert_eq!(
            target("/", "key=abc").url_for(&uri),
            "http://localhost:8080/users?key=abc"
        );
    }

    #[test]
    fn test_internal_prefix_keeps_path() {
        let uri: Uri = "/__setup".parse().unwrap();
        assert_eq!(target("/api", "").url_for(&uri), "http://localhost:8080/__setup");
    }

    #[test]
    fn test_for_target() {
        let url = Url::parse("https://provider.test/base?x=1").unwrap();
        let options = ProxyOptions::for_target(&url).unwrap();
        assert_eq!(options.target_address, "provider.test:443");
        assert_eq!(options.target_scheme, "https");
        assert_eq!(options.target_path, "/base");
        assert_eq!(options.target_query, "x=1");
        assert_eq!(options.internal_request_path_prefix, "/__setup");
        assert_eq!(options.proxy_port, 0);
    }

    #[test]
    fn test_for_target_rejects_unknown_port() {
        let url = Url::parse("custom://provider.test/base").unwrap();
        let err = ProxyOptions::for_target(&url).unwrap_err();
        assert!(matches!(err, VerifyError::InvalidProviderUrl { .. }));
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, "close, x-session".parse().unwrap());
        headers.insert("x-session", "abc".parse().unwrap());
        headers.insert(header::TRANSFER_ENCODING, "chunked".parse().unwrap());
        headers.insert(header::AUTHORIZATION, "Bearer t".parse().unwrap());

        strip_hop_by_hop(&mut headers);

        assert!(headers.get(header::CONNECTION).is_none());
        assert!(headers.get("x-session").is_none());
        assert!(headers.get(header::TRANSFER_ENCODING).is_none());
        assert_eq!(headers.get(header::AUTHORIZATION).unwrap(), "Bearer t");
    }
}
