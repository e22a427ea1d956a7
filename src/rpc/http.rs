//! HTTP remote calls against the node.
//!
//! [`HttpChainSource`] implements [`ChainSource`] with plain JSON-RPC calls
//! through an Alloy HTTP provider. Request ids are allocated by the
//! provider's client, which owns one monotonically increasing counter for the
//! lifetime of the process.
//!
//! ## Example
//!
//! ```no_run
//! use eth_consistency_canary::rpc::{create_provider, HttpChainSource};
//! use eth_consistency_canary::error::CanaryResult;
//!
//! # async fn example() -> CanaryResult<()> {
//! let provider = create_provider("http://127.0.0.1:8545").await?;
//! let source = HttpChainSource::new(provider);
//! # Ok(())
//! # }
//! ```

use alloy::eips::BlockNumberOrTag;
use alloy::primitives::B256;
use alloy::providers::{Provider as AlloyProvider, ProviderBuilder, RootProvider};
use alloy::transports::http::{Client, Http};
use tracing::{debug, info, instrument};

use crate::chain::{Block, Receipt};
use crate::error::{CanaryError, CanaryResult};
use crate::fetcher::ChainSource;

/// Type alias for the HTTP provider.
pub type Provider = RootProvider<Http<Client>>;

/// Create a new Ethereum RPC provider connected via HTTP.
///
/// # Errors
///
/// Returns an error if the URL cannot be parsed.
#[allow(clippy::unused_async)]
#[instrument(skip(rpc_url), fields(rpc_host = tracing::field::Empty))]
pub async fn create_provider(rpc_url: &str) -> CanaryResult<Provider> {
    info!("Initializing RPC provider");

    // Log the scheme and authority only; paths often carry API keys
    let host = redact_url(rpc_url);
    tracing::Span::current().record("rpc_host", host);
    debug!(rpc_host = host, "Creating HTTP provider");

    let url = rpc_url.parse().map_err(|e| {
        CanaryError::rpc(
            format!("Failed to parse RPC URL: '{host}'. Expected e.g. 'http://127.0.0.1:8545'"),
            Some(Box::new(e)),
        )
    })?;

    let provider = ProviderBuilder::new().on_http(url);

    info!("RPC provider initialized successfully");

    Ok(provider)
}

/// Everything before the first path segment of a URL.
pub(crate) fn redact_url(url: &str) -> &str {
    let after_scheme = url.find("://").map_or(0, |i| i + 3);
    url[after_scheme..]
        .find('/')
        .map_or(url, |i| &url[..after_scheme + i])
}

/// [`ChainSource`] backed by JSON-RPC over HTTP.
#[derive(Debug, Clone)]
pub struct HttpChainSource {
    provider: Provider,
}

impl HttpChainSource {
    /// Wrap an HTTP provider.
    #[must_use]
    pub const fn new(provider: Provider) -> Self {
        Self { provider }
    }
}

impl ChainSource for HttpChainSource {
    #[instrument(skip(self), fields(duration_ms = tracing::field::Empty))]
    async fn block_by_number(&self, number: BlockNumberOrTag) -> CanaryResult<Option<Block>> {
        let start = std::time::Instant::now();

        let block: Option<Block> = self
            .provider
            .raw_request("eth_getBlockByNumber".into(), (number, true))
            .await
            .map_err(|e| {
                CanaryError::rpc(format!("Failed to fetch block {number}"), Some(Box::new(e)))
            })?;

        tracing::Span::current().record("duration_ms", start.elapsed().as_millis() as u64);
        Ok(block)
    }

    #[instrument(skip(self), fields(duration_ms = tracing::field::Empty))]
    async fn receipt_by_hash(&self, hash: B256) -> CanaryResult<Option<Receipt>> {
        let start = std::time::Instant::now();

        let receipt: Option<Receipt> = self
            .provider
            .raw_request("eth_getTransactionReceipt".into(), (hash,))
            .await
            .map_err(|e| {
                CanaryError::rpc(format!("Failed to fetch receipt {hash}"), Some(Box::new(e)))
            })?;

        tracing::Span::current().record("duration_ms", start.elapsed().as_millis() as u64);
        Ok(receipt)
    }
}
