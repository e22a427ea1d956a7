//! # Ethereum Node Consistency Canary
//!
//! Watches an Ethereum node for new heads and verifies, for every head, that
//! the node serves internally consistent data: each transaction in the block
//! must report the same block hash as its receipt. Built on
//! [Alloy](https://github.com/alloy-rs/alloy).
//!
//! A node behind a load balancer, or one that is mid-reorg, can briefly answer
//! `eth_getBlockByNumber` from one fork and `eth_getTransactionReceipt` from
//! another. The canary re-fetches until the answers agree, writes a JSON
//! evidence record for every disagreeing attempt, and fails loudly if a block
//! never settles.
//!
//! ## Architecture
//!
//! ```text
//!   newHeads ──▶ HeadTracker ──▶ Reconciler (one task per header)
//!                 (reorg flag)      │  fetch block + receipts
//!                                   │  check tx/receipt block hashes
//!                                   ├─ consistent ──▶ accept
//!                                   └─ inconsistent ─▶ evidence, wait, retry
//! ```
//!
//! 1. **Chain Layer** ([`chain`]) - Header, block, transaction and receipt data
//! 2. **RPC Layer** ([`rpc`]) - HTTP calls and the WebSocket head subscription
//! 3. **Fetch Layer** ([`fetcher`]) - Block and concurrent receipt retrieval
//! 4. **Check Layer** ([`consistency`]) - Transaction/receipt comparison
//! 5. **Reconcile Layer** ([`reconcile`], [`evidence`]) - Retry loop and records
//! 6. **Watch Layer** ([`watch`], [`reorg`]) - Head ordering and task fan-out
//!
//! ## Quick Start
//!
//! ```bash
//! # Watch a local node
//! cargo run --release -- watch
//!
//! # Check the latest block once
//! cargo run --release -- check --block latest
//! ```
//!
//! ## Using as a Library
//!
//! ```rust,no_run
//! use eth_consistency_canary::{
//!     evidence::EvidenceStore,
//!     reconcile::{Reconciler, RetryPolicy},
//!     reorg::HeadTracker,
//!     rpc::{create_provider, HttpChainSource},
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = create_provider("http://127.0.0.1:8545").await?;
//!     let reconciler = Reconciler::new(
//!         HttpChainSource::new(provider),
//!         EvidenceStore::new("reorgs"),
//!         RetryPolicy::default(),
//!     );
//!
//!     let latest = HeadTracker::seed(reconciler.source()).await?;
//!     let header = latest.previous().copied().ok_or("no baseline")?;
//!     let observation = HeadTracker::new().observe(header);
//!
//!     let outcome = reconciler.reconcile(0, header, observation).await?;
//!     println!("block {} consistent after {} attempt(s)", header.number, outcome.attempts);
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`error::CanaryResult<T>`](error::CanaryResult):
//!
//! ```rust
//! use eth_consistency_canary::error::{CanaryError, CanaryResult};
//!
//! fn example() -> CanaryResult<()> {
//!     Err(CanaryError::config("MAX_ATTEMPTS must be at least 1", None))
//! }
//! assert!(example().is_err());
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod chain;
pub mod cli;
pub mod config;
pub mod consistency;
pub mod error;
pub mod evidence;
pub mod fetcher;
pub mod observability;
pub mod reconcile;
pub mod reorg;
pub mod rpc;
pub mod watch;
