//! Error types for the consistency canary.
//!
//! This module provides a unified error type [`CanaryError`] covering every
//! failure the canary can hit while watching the chain head, fetching blocks
//! and receipts, and persisting evidence.
//!
//! # Design
//!
//! The error hierarchy is organized by layer:
//! - [`CanaryError::ConfigError`]: Configuration and environment issues
//! - [`CanaryError::RpcError`]: Remote call transport failures
//! - [`CanaryError::DecodingError`]: Malformed or partial node responses
//! - [`CanaryError::EvidenceError`]: Evidence persistence failures
//! - [`CanaryError::Exhausted`]: Inconsistency outlived the retry budget
//!
//! None of these are retried by the reconciliation loop. Only an observed
//! inconsistency is retried, and it is not an error until the budget runs out.
//!
//! # Example
//!
//! ```
//! use eth_consistency_canary::error::{CanaryError, CanaryResult};
//!
//! fn validate_attempts(max_attempts: u32) -> CanaryResult<()> {
//!     if max_attempts == 0 {
//!         return Err(CanaryError::config("MAX_ATTEMPTS must be at least 1", None));
//!     }
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::time::Duration;

use alloy::primitives::B256;

use crate::chain::HeaderEvent;

/// Result type alias using [`CanaryError`].
pub type CanaryResult<T> = Result<T, CanaryError>;

/// Boxed source error carried by most variants.
pub type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Diagnostic context attached to an exhausted reconciliation.
///
/// Carries everything an operator needs to act without re-querying the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExhaustionReport {
    /// Header that triggered the reconciliation
    pub header: HeaderEvent,
    /// Number of fetch attempts made
    pub attempts: u32,
    /// Hash of the block returned by the last attempt
    pub last_block_hash: B256,
    /// Number of the block returned by the last attempt
    pub last_block_number: u64,
    /// Inconsistent pairs observed on the last attempt
    pub inconsistent_transactions: usize,
    /// Wall time spent on the reconciliation
    pub elapsed: Duration,
}

/// Unified error type for the consistency canary.
#[derive(Debug)]
pub enum CanaryError {
    /// Configuration or environment variable errors.
    ///
    /// Variants include:
    /// - Invalid endpoint URLs
    /// - Non-numeric attempt counts or delays
    ConfigError {
        /// What failed
        message: String,
        /// Underlying cause, if any
        source: Option<BoxedSource>,
    },

    /// Remote call transport errors.
    ///
    /// Variants include:
    /// - Failed to reach the node
    /// - JSON-RPC error responses
    RpcError {
        /// What failed
        message: String,
        /// Underlying cause, if any
        source: Option<BoxedSource>,
    },

    /// Malformed or partial responses.
    ///
    /// Variants include:
    /// - Block not found for a number the node just announced
    /// - Missing receipt for a transaction in the block
    /// - Receipt returned for a different transaction
    DecodingError {
        /// What failed
        message: String,
        /// Underlying cause, if any
        source: Option<BoxedSource>,
    },

    /// Evidence persistence errors.
    EvidenceError {
        /// What failed
        message: String,
        /// Underlying cause, if any
        source: Option<BoxedSource>,
    },

    /// WebSocket connection errors.
    WebSocketConnectionError {
        /// What failed
        message: String,
        /// Underlying cause, if any
        source: Option<BoxedSource>,
    },

    /// WebSocket subscription errors.
    WebSocketSubscriptionError {
        /// What failed
        message: String,
        /// Underlying cause, if any
        source: Option<BoxedSource>,
    },

    /// The header stream ended.
    ///
    /// Missed headers are never replayed, so this is fatal for the process.
    WebSocketDisconnected {
        /// What failed
        message: String,
    },

    /// Max reconnection attempts exceeded.
    MaxReconnectAttemptsExceeded {
        /// Number of attempts made
        attempts: u32,
        /// Last error encountered
        last_error: String,
    },

    /// A reconciliation task panicked or was cancelled.
    TaskError {
        /// What failed
        message: String,
        /// Underlying cause, if any
        source: Option<BoxedSource>,
    },

    /// Inconsistency persisted through every allowed attempt.
    Exhausted(Box<ExhaustionReport>),
}

impl CanaryError {
    /// Create a new configuration error.
    ///
    /// # Example
    ///
    /// ```
    /// use eth_consistency_canary::error::CanaryError;
    ///
    /// let err = CanaryError::config("RPC_HTTP_URL is not an http(s) URL", None);
    /// assert!(matches!(err, CanaryError::ConfigError { .. }));
    /// ```
    #[must_use]
    pub fn config(message: impl Into<String>, source: Option<BoxedSource>) -> Self {
        Self::ConfigError {
            message: message.into(),
            source,
        }
    }

    /// Create a new RPC error.
    #[must_use]
    pub fn rpc(message: impl Into<String>, source: Option<BoxedSource>) -> Self {
        Self::RpcError {
            message: message.into(),
            source,
        }
    }

    /// Create a new decoding error.
    #[must_use]
    pub fn decoding(message: impl Into<String>, source: Option<BoxedSource>) -> Self {
        Self::DecodingError {
            message: message.into(),
            source,
        }
    }

    /// Create a new evidence persistence error.
    ///
    /// # Example
    ///
    /// ```
    /// use eth_consistency_canary::error::CanaryError;
    ///
    /// let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
    /// let err = CanaryError::evidence("failed to write attempt-001.json", Some(Box::new(io)));
    /// assert!(matches!(err, CanaryError::EvidenceError { .. }));
    /// ```
    #[must_use]
    pub fn evidence(message: impl Into<String>, source: Option<BoxedSource>) -> Self {
        Self::EvidenceError {
            message: message.into(),
            source,
        }
    }

    /// Create a new WebSocket connection error.
    #[must_use]
    pub fn websocket_connection(message: impl Into<String>, source: Option<BoxedSource>) -> Self {
        Self::WebSocketConnectionError {
            message: message.into(),
            source,
        }
    }

    /// Create a new WebSocket subscription error.
    #[must_use]
    pub fn websocket_subscription(
        message: impl Into<String>,
        source: Option<BoxedSource>,
    ) -> Self {
        Self::WebSocketSubscriptionError {
            message: message.into(),
            source,
        }
    }

    /// Create a new WebSocket disconnection error.
    ///
    /// # Example
    ///
    /// ```
    /// use eth_consistency_canary::error::CanaryError;
    ///
    /// let err = CanaryError::websocket_disconnected("newHeads stream ended");
    /// assert!(matches!(err, CanaryError::WebSocketDisconnected { .. }));
    /// ```
    #[must_use]
    pub fn websocket_disconnected(message: impl Into<String>) -> Self {
        Self::WebSocketDisconnected {
            message: message.into(),
        }
    }

    /// Create a max reconnect attempts exceeded error.
    #[must_use]
    pub fn max_reconnect_exceeded(attempts: u32, last_error: impl Into<String>) -> Self {
        Self::MaxReconnectAttemptsExceeded {
            attempts,
            last_error: last_error.into(),
        }
    }

    /// Create a new task error.
    #[must_use]
    pub fn task(message: impl Into<String>, source: Option<BoxedSource>) -> Self {
        Self::TaskError {
            message: message.into(),
            source,
        }
    }

    /// Create an exhaustion error from its diagnostic report.
    #[must_use]
    pub fn exhausted(report: ExhaustionReport) -> Self {
        Self::Exhausted(Box::new(report))
    }

    /// Returns the exhaustion report if this is an [`CanaryError::Exhausted`].
    #[must_use]
    pub fn exhaustion_report(&self) -> Option<&ExhaustionReport> {
        match self {
            Self::Exhausted(report) => Some(report),
            _ => None,
        }
    }
}

impl fmt::Display for CanaryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigError { message, .. } => write!(f, "Configuration error: {message}"),
            Self::RpcError { message, .. } => write!(f, "RPC error: {message}"),
            Self::DecodingError { message, .. } => write!(f, "Decoding error: {message}"),
            Self::EvidenceError { message, .. } => write!(f, "Evidence error: {message}"),
            Self::WebSocketConnectionError { message, .. } => {
                write!(f, "WebSocket connection error: {message}")
            }
            Self::WebSocketSubscriptionError { message, .. } => {
                write!(f, "WebSocket subscription error: {message}")
            }
            Self::WebSocketDisconnected { message } => {
                write!(f, "WebSocket disconnected: {message}")
            }
            Self::MaxReconnectAttemptsExceeded {
                attempts,
                last_error,
            } => {
                write!(
                    f,
                    "Max reconnection attempts ({attempts}) exceeded. Last error: {last_error}"
                )
            }
            Self::TaskError { message, .. } => write!(f, "Task error: {message}"),
            Self::Exhausted(report) => write!(
                f,
                "failed to get consistent block data for block {} ({}) after {} attempts: \
                 {} inconsistent transaction(s) in block {} ({}) after {:?}",
                report.header.number,
                report.header.hash,
                report.attempts,
                report.inconsistent_transactions,
                report.last_block_number,
                report.last_block_hash,
                report.elapsed,
            ),
        }
    }
}

impl std::error::Error for CanaryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ConfigError { source, .. }
            | Self::RpcError { source, .. }
            | Self::DecodingError { source, .. }
            | Self::EvidenceError { source, .. }
            | Self::WebSocketConnectionError { source, .. }
            | Self::WebSocketSubscriptionError { source, .. }
            | Self::TaskError { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &dyn std::error::Error),
            Self::WebSocketDisconnected { .. }
            | Self::MaxReconnectAttemptsExceeded { .. }
            | Self::Exhausted(_) => None,
        }
    }
}

/// Convert from `eyre::Report` to `CanaryError`.
///
/// Used by the WebSocket provider, which reports through `eyre`.
impl From<eyre::Report> for CanaryError {
    fn from(err: eyre::Report) -> Self {
        Self::websocket_connection(format!("{err:#}"), None)
    }
}
