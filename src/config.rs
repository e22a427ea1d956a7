//! Configuration management for the consistency canary.
//!
//! Configuration is loaded from environment variables (with `.env` support
//! through `dotenvy`) and can then be overridden from the command line.
//! Precedence is: command line, environment, defaults. Values are validated
//! once, after every layer has been applied.
//!
//! ## Environment Variables
//!
//! All optional:
//! - `RPC_HTTP_URL`: JSON-RPC HTTP endpoint (default: `http://127.0.0.1:8545`)
//! - `RPC_WS_URL`: JSON-RPC WebSocket endpoint (default: `ws://127.0.0.1:8546`)
//! - `EVIDENCE_DIR`: Evidence root directory (default: `reorgs`)
//! - `MAX_ATTEMPTS`: Fetch attempts per header (default: 100)
//! - `RETRY_DELAY_MS`: Flat delay between attempts (default: 750)
//! - `SEED_BASELINE`: Fetch the chain head at startup (default: true)
//! - `RUST_LOG`: Logging level (default: "info")
//!
//! ## Example
//!
//! ```no_run
//! use eth_consistency_canary::config::Config;
//! use eth_consistency_canary::error::CanaryResult;
//!
//! # fn main() -> CanaryResult<()> {
//! let config = Config::load_env()?
//!     .with_http_url(Some("http://10.0.0.2:8545".into()))
//!     .validated()?;
//! println!("RPC URL: {}", config.http_url());
//! # Ok(())
//! # }
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CanaryError, CanaryResult};
use crate::evidence::DEFAULT_EVIDENCE_DIR;
use crate::reconcile::{RetryPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};
use crate::rpc::http::redact_url;

/// Default HTTP endpoint.
pub const DEFAULT_HTTP_URL: &str = "http://127.0.0.1:8545";

/// Default WebSocket endpoint.
pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8546";

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// JSON-RPC HTTP endpoint
    http_url: String,

    /// JSON-RPC WebSocket endpoint
    ws_url: String,

    /// Evidence root directory
    evidence_dir: PathBuf,

    /// Fetch attempts per header
    max_attempts: u32,

    /// Delay between attempts
    retry_delay: Duration,

    /// Fetch the chain head at startup as the head tracker baseline
    seed_baseline: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_url: DEFAULT_HTTP_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            evidence_dir: PathBuf::from(DEFAULT_EVIDENCE_DIR),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            seed_baseline: true,
        }
    }
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an invalid value.
    pub fn from_env() -> CanaryResult<Self> {
        Self::load_env()?.validated()
    }

    /// Read environment variables without validating the result.
    ///
    /// Apply overrides, then finish with [`Config::validated`].
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric or boolean variable does not parse.
    pub fn load_env() -> CanaryResult<Self> {
        // Load .env file if present (ignore error if file doesn't exist)
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let http_url = env::var("RPC_HTTP_URL").unwrap_or(defaults.http_url);
        let ws_url = env::var("RPC_WS_URL").unwrap_or(defaults.ws_url);
        let evidence_dir = env::var("EVIDENCE_DIR").map_or(defaults.evidence_dir, PathBuf::from);

        let max_attempts = env::var("MAX_ATTEMPTS")
            .unwrap_or_else(|_| DEFAULT_MAX_ATTEMPTS.to_string())
            .parse::<u32>()
            .map_err(|e| {
                CanaryError::config("MAX_ATTEMPTS must be a valid number", Some(Box::new(e)))
            })?;

        let retry_delay_ms = env::var("RETRY_DELAY_MS")
            .unwrap_or_else(|_| DEFAULT_RETRY_DELAY.as_millis().to_string())
            .parse::<u64>()
            .map_err(|e| {
                CanaryError::config("RETRY_DELAY_MS must be a valid number", Some(Box::new(e)))
            })?;

        let seed_baseline = env::var("SEED_BASELINE")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .map_err(|e| {
                CanaryError::config("SEED_BASELINE must be 'true' or 'false'", Some(Box::new(e)))
            })?;

        Ok(Self {
            http_url,
            ws_url,
            evidence_dir,
            max_attempts,
            retry_delay: Duration::from_millis(retry_delay_ms),
            seed_baseline,
        })
    }

    /// Override the HTTP endpoint.
    #[must_use]
    pub fn with_http_url(mut self, url: Option<String>) -> Self {
        if let Some(url) = url {
            self.http_url = url;
        }
        self
    }

    /// Override the WebSocket endpoint.
    #[must_use]
    pub fn with_ws_url(mut self, url: Option<String>) -> Self {
        if let Some(url) = url {
            self.ws_url = url;
        }
        self
    }

    /// Override the evidence directory.
    #[must_use]
    pub fn with_evidence_dir(mut self, dir: Option<PathBuf>) -> Self {
        if let Some(dir) = dir {
            self.evidence_dir = dir;
        }
        self
    }

    /// Override the attempt ceiling.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        if let Some(max_attempts) = max_attempts {
            self.max_attempts = max_attempts;
        }
        self
    }

    /// Override the retry delay.
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Option<Duration>) -> Self {
        if let Some(delay) = delay {
            self.retry_delay = delay;
        }
        self
    }

    /// Disable baseline seeding when `disable` is set.
    #[must_use]
    pub const fn without_baseline(mut self, disable: bool) -> Self {
        if disable {
            self.seed_baseline = false;
        }
        self
    }

    /// Check the fully layered configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if an endpoint has the wrong scheme or
    /// `max_attempts` is zero. URLs in messages are cut at the first path
    /// segment, where providers put API keys.
    pub fn validated(self) -> CanaryResult<Self> {
        if !(self.http_url.starts_with("http://") || self.http_url.starts_with("https://")) {
            return Err(CanaryError::config(
                format!(
                    "RPC HTTP URL must start with http:// or https://, got: {}",
                    redact_url(&self.http_url)
                ),
                None,
            ));
        }

        if !(self.ws_url.starts_with("ws://") || self.ws_url.starts_with("wss://")) {
            return Err(CanaryError::config(
                format!(
                    "RPC WebSocket URL must start with ws:// or wss://, got: {}",
                    redact_url(&self.ws_url)
                ),
                None,
            ));
        }

        if self.max_attempts == 0 {
            return Err(CanaryError::config("MAX_ATTEMPTS must be at least 1", None));
        }

        Ok(self)
    }

    /// Get the HTTP endpoint.
    #[must_use]
    pub fn http_url(&self) -> &str {
        &self.http_url
    }

    /// Get the WebSocket endpoint.
    #[must_use]
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Get the evidence directory.
    #[must_use]
    pub fn evidence_dir(&self) -> &Path {
        &self.evidence_dir
    }

    /// Get the attempt ceiling.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Get the retry delay.
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Check if baseline seeding is enabled.
    #[must_use]
    pub const fn seed_baseline(&self) -> bool {
        self.seed_baseline
    }

    /// Retry policy for the reconciliation loop.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            delay: self.retry_delay,
        }
    }
}
