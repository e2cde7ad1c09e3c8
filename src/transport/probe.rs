//! TCP reachability probing used to detect when a droplet's SSH daemon is up.

use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::{Instant, sleep_until, timeout};
use tracing::debug;

use super::TransportError;

/// Upper bound for a single connection attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Future returned by [`ReachabilityProbe::wait_until_open`].
pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>>;

/// Waits for a TCP port to accept connections.
pub trait ReachabilityProbe {
    /// Polls `host:port` every `poll_interval` until a connection succeeds or
    /// `limit` elapses. Implementations must not wait past `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Unreachable`] when the port stays closed for
    /// the whole window.
    fn wait_until_open(
        &self,
        host: IpAddr,
        port: u16,
        poll_interval: Duration,
        limit: Duration,
    ) -> ProbeFuture<'_>;
}

/// Probe backed by real `TcpStream::connect` attempts.
#[derive(Clone, Copy, Debug)]
pub struct TcpProbe {
    connect_timeout: Duration,
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
        }
    }
}

impl TcpProbe {
    /// Creates a probe with the default per-attempt connect timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the per-attempt connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

impl ReachabilityProbe for TcpProbe {
    fn wait_until_open(
        &self,
        host: IpAddr,
        port: u16,
        poll_interval: Duration,
        limit: Duration,
    ) -> ProbeFuture<'_> {
        Box::pin(async move {
            let deadline = Instant::now() + limit;
            let mut attempt: u32 = 0;
            loop {
                attempt += 1;
                let attempt_started = Instant::now();
                let budget = self
                    .connect_timeout
                    .min(deadline.saturating_duration_since(attempt_started));
                let connect = timeout(budget, TcpStream::connect((host, port))).await;
                if matches!(connect, Ok(Ok(_))) {
                    debug!(%host, port, attempt, "port accepted connection");
                    return Ok(());
                }
                if Instant::now() >= deadline {
                    break;
                }
                // Attempts start one interval apart; a slow attempt eats into the wait.
                sleep_until((attempt_started + poll_interval).min(deadline)).await;
                if Instant::now() >= deadline {
                    break;
                }
            }

            Err(TransportError::Unreachable {
                host,
                port,
                waited_secs: limit.as_secs(),
            })
        })
    }
}
