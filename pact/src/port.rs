//! Waiting for a TCP port to accept connections.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::{Instant, sleep, sleep_until, timeout_at};
use tracing::{debug, error};

use crate::error::{VerifyError, VerifyResult};

/// Delay between connection attempts.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Deadline used when `now + timeout` does not fit in an [`Instant`].
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Block until `address:port` accepts a TCP connection or `timeout` elapses.
///
/// The first attempt is made one [`POLL_INTERVAL`] after the call. There is
/// no cancellation other than the timeout.
///
/// # Errors
///
/// Returns [`VerifyError::PortTimeout`] carrying `message` when the deadline
/// passes, or [`VerifyError::InvalidConfig`] for a network other than `tcp`.
pub async fn wait_for_port(
    port: u16,
    network: &str,
    address: &str,
    timeout: Duration,
    message: &str,
) -> VerifyResult<()> {
    if network != "tcp" {
        return Err(VerifyError::invalid_config(format!(
            "unsupported network '{network}', only tcp can be waited on"
        )));
    }

    debug!(port, address, "waiting for port to become available");
    let now = Instant::now();
    let deadline = now
        .checked_add(timeout)
        .unwrap_or_else(|| now + FAR_FUTURE);

    loop {
        tokio::select! {
            biased;
            () = sleep_until(deadline) => {
                error!(?timeout, port, "expected server to start. {message}");
                return Err(VerifyError::PortTimeout {
                    timeout,
                    message: message.to_string(),
                });
            }
            () = sleep(POLL_INTERVAL) => {
                if let Ok(Ok(_)) = timeout_at(deadline, TcpStream::connect((address, port))).await {
                    debug!(port, "port is available");
                    return Ok(());
                }
            }
        }
    }
}
