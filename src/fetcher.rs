//! Block and receipt fetching.
//!
//! [`ChainSource`] is the seam to the remote call transport: one method per
//! JSON-RPC call the canary makes. [`fetch_block_with_receipts`] drives one
//! fetch attempt on top of it, fanning the receipt lookups out concurrently
//! and failing the whole attempt if any single lookup fails.

use std::future::Future;

use alloy::eips::BlockNumberOrTag;
use alloy::primitives::B256;
use futures_util::future::try_join_all;
use tracing::{debug, instrument};

use crate::chain::{Block, Receipt};
use crate::error::{CanaryError, CanaryResult};

/// Request/response access to a node.
///
/// Implemented over HTTP by [`crate::rpc::HttpChainSource`]; tests provide
/// scripted in-memory implementations.
pub trait ChainSource: Send + Sync {
    /// `eth_getBlockByNumber(number, true)`: the block with full transaction
    /// objects, or `None` if the node does not know it.
    fn block_by_number(
        &self,
        number: BlockNumberOrTag,
    ) -> impl Future<Output = CanaryResult<Option<Block>>> + Send;

    /// `eth_getTransactionReceipt(hash)`, or `None` if the node has no receipt.
    fn receipt_by_hash(
        &self,
        hash: B256,
    ) -> impl Future<Output = CanaryResult<Option<Receipt>>> + Send;
}

/// A block together with the receipts of its transactions.
///
/// `receipts[i]` is the receipt fetched for `block.transactions[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedBlock {
    /// The block, with full transactions
    pub block: Block,
    /// One receipt per transaction, in block order
    pub receipts: Vec<Receipt>,
}

/// Fetch a block, failing if the node has none at that number.
///
/// # Errors
///
/// Returns an error if the call fails or the node returns `null`.
pub async fn fetch_block<S: ChainSource>(
    source: &S,
    number: BlockNumberOrTag,
) -> CanaryResult<Block> {
    source
        .block_by_number(number)
        .await?
        .ok_or_else(|| CanaryError::decoding(format!("block {number} not found"), None))
}

/// Fetch a receipt and verify it answers for the requested transaction.
///
/// # Errors
///
/// Returns an error if the call fails, the node returns `null`, or the
/// receipt names a different transaction hash.
pub async fn fetch_receipt<S: ChainSource>(source: &S, hash: B256) -> CanaryResult<Receipt> {
    let receipt = source
        .receipt_by_hash(hash)
        .await?
        .ok_or_else(|| CanaryError::decoding(format!("receipt for {hash} not found"), None))?;

    match receipt.transaction_hash {
        Some(answered) if answered != hash => Err(CanaryError::decoding(
            format!("requested receipt for {hash}, node answered for {answered}"),
            None,
        )),
        _ => Ok(receipt),
    }
}

/// Run one fetch attempt: the block at `number`, then every receipt.
///
/// Receipt requests are issued concurrently and all are awaited before
/// returning. The first failure aborts the attempt.
///
/// # Errors
///
/// Returns the first block or receipt fetch error.
#[instrument(
    skip(source),
    fields(txs = tracing::field::Empty, duration_ms = tracing::field::Empty)
)]
pub async fn fetch_block_with_receipts<S: ChainSource>(
    source: &S,
    number: u64,
) -> CanaryResult<FetchedBlock> {
    let start = std::time::Instant::now();

    let block = fetch_block(source, BlockNumberOrTag::Number(number)).await?;
    tracing::Span::current().record("txs", block.transactions.len());

    // One receipt per transaction, in block order; fetch_receipt rejects
    // null and mismatched-hash answers
    let receipts = try_join_all(
        block
            .transactions
            .iter()
            .map(|tx| fetch_receipt(source, tx.hash)),
    )
    .await?;

    let duration = start.elapsed();
    tracing::Span::current().record("duration_ms", duration.as_millis() as u64);
    debug!(
        block = number,
        receipts = receipts.len(),
        duration_ms = duration.as_millis(),
        "Block and receipts fetched"
    );

    Ok(FetchedBlock { block, receipts })
}
