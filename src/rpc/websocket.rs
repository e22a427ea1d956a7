//! `newHeads` subscription over WebSocket.
//!
//! One `eth_subscribe("newHeads")` request is made per connection. The Alloy
//! pubsub layer matches the subscribe acknowledgment to its request id and
//! routes later `eth_subscription` notifications by subscription id, so this
//! module only sees decoded headers.
//!
//! Only the initial connection is retried ([`ReconnectingWebSocket`]). A
//! stream that ends after subscribing is handed back to the caller as ended:
//! headers announced while disconnected would never be reconciled.

use std::time::{Duration, Instant};

use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::transports::BoxTransport;
use eyre::WrapErr;
use futures_util::stream::{Stream, StreamExt};
use tracing::{debug, info, instrument, warn};

use super::http::redact_url;
use crate::chain::HeaderEvent;
use crate::error::{CanaryError, CanaryResult};

/// Live WebSocket connection to a node.
pub struct WebSocketProvider {
    provider: RootProvider<BoxTransport>,
    url: String,
}

impl std::fmt::Debug for WebSocketProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketProvider")
            .field("url", &redact_url(&self.url))
            .finish_non_exhaustive()
    }
}

impl WebSocketProvider {
    /// Open a connection to `ws_url`.
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid or the handshake fails.
    #[instrument(
        skip(ws_url),
        fields(ws_host = redact_url(&ws_url), duration_ms = tracing::field::Empty)
    )]
    pub async fn connect(ws_url: String) -> eyre::Result<Self> {
        let start = Instant::now();

        let provider = ProviderBuilder::new()
            .on_builtin(&ws_url)
            .await
            .wrap_err_with(|| format!("WebSocket handshake with {} failed", redact_url(&ws_url)))?;

        let elapsed_ms = start.elapsed().as_millis() as u64;
        tracing::Span::current().record("duration_ms", elapsed_ms);
        info!(duration_ms = elapsed_ms, "WebSocket connected");

        Ok(Self {
            provider,
            url: ws_url,
        })
    }

    /// Subscribe to `newHeads`.
    ///
    /// Yields one [`HeaderEvent`] per notification in arrival order and ends
    /// when the connection drops. `self` must outlive the stream.
    ///
    /// # Errors
    ///
    /// Returns error if the node rejects the subscription.
    #[instrument(skip(self))]
    pub async fn subscribe_heads(&self) -> CanaryResult<impl Stream<Item = HeaderEvent>> {
        let subscription = self.provider.subscribe_blocks().await.map_err(|e| {
            CanaryError::websocket_subscription("newHeads subscription failed", Some(Box::new(e)))
        })?;

        info!("Subscribed to newHeads");
        Ok(subscription.into_stream().map(HeaderEvent::from))
    }
}

/// Exponential delay schedule for connection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectBackoff {
    /// Connection attempts before giving up
    pub max_attempts: u32,
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Upper bound on any delay, before jitter
    pub max_delay: Duration,
}

impl Default for ConnectBackoff {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl ConnectBackoff {
    /// Delay after `failures` failed attempts, scaled by `jitter` in
    /// `[-0.125, 0.125]`.
    #[must_use]
    pub fn delay(&self, failures: u32, jitter: f64) -> Duration {
        let doubled = self
            .initial_delay
            .saturating_mul(1_u32 << failures.saturating_sub(1).min(16));
        let base = doubled.min(self.max_delay);
        base.mul_f64((1.0 + jitter).max(0.0))
    }
}

/// Connects to a WebSocket endpoint, retrying failed handshakes.
#[derive(Debug, Clone)]
pub struct ReconnectingWebSocket {
    url: String,
    backoff: ConnectBackoff,
}

impl ReconnectingWebSocket {
    /// Connector with [`ConnectBackoff::default`]: 10 attempts, 1 s doubling
    /// to 60 s, ±12.5% jitter.
    pub fn new(url: String) -> Self {
        Self::with_backoff(url, ConnectBackoff::default())
    }

    /// Connector with a custom schedule.
    pub const fn with_backoff(url: String, backoff: ConnectBackoff) -> Self {
        Self { url, backoff }
    }

    /// Connect, sleeping between failed attempts per the backoff schedule.
    ///
    /// # Errors
    ///
    /// Returns [`CanaryError::MaxReconnectAttemptsExceeded`] once every
    /// attempt has failed.
    pub async fn connect(&self) -> CanaryResult<WebSocketProvider> {
        let max_attempts = self.backoff.max_attempts.max(1);
        let mut failures = 0;

        loop {
            let err = match WebSocketProvider::connect(self.url.clone()).await {
                Ok(provider) => return Ok(provider),
                Err(e) => CanaryError::from(e),
            };
            failures += 1;

            if failures >= max_attempts {
                return Err(CanaryError::max_reconnect_exceeded(failures, err.to_string()));
            }

            let jitter = (rand::random::<f64>() - 0.5) * 0.25;
            let delay = self.backoff.delay(failures, jitter);
            warn!(
                attempt = failures,
                max_attempts,
                retry_in_ms = delay.as_millis() as u64,
                error = %err,
                "WebSocket connection failed"
            );
            tokio::time::sleep(delay).await;
            debug!(attempt = failures + 1, "Retrying WebSocket connection");
        }
    }
}
