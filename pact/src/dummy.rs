//! Stand-in provider for runs that have no real provider URL.
//!
//! The server answers every request with `404`; it exists so the proxy
//! always has a live upstream.

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::{VerifyError, VerifyResult};

/// A running dummy provider, stopped when dropped.
#[derive(Debug)]
pub struct DummyProvider {
    base_url: String,
    port: u16,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl DummyProvider {
    /// Bind a free port on `hostname` and serve in the background.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::PortAllocation`] if no port can be bound.
    pub async fn start(hostname: &str) -> VerifyResult<Self> {
        let listener = TcpListener::bind((hostname, 0))
            .await
            .map_err(VerifyError::PortAllocation)?;
        let port = listener
            .local_addr()
            .map_err(VerifyError::PortAllocation)?
            .port();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let server = axum::serve(listener, Router::new()).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = server.await {
                error!(error = %e, "dummy provider stopped");
            }
        });

        let base_url = format!("http://{hostname}:{port}");
        debug!(%base_url, "started dummy provider");

        Ok(Self {
            base_url,
            port,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    /// URL to use as the provider base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Bound port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Stop the server and wait for it to finish.
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for DummyProvider {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}
