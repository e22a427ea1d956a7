//! Receipt/block consistency check.
//!
//! A block is consistent when every transaction's embedded `blockHash` equals
//! the `blockHash` its own receipt reports. Nothing is compared against the
//! header hash.

use serde::{Deserialize, Serialize};

use crate::chain::{Receipt, Transaction};
use crate::fetcher::FetchedBlock;

/// A transaction and its receipt disagreeing about which block they are in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InconsistentPair {
    /// Position of the transaction in the block
    pub index: usize,
    /// Transaction as embedded in the block
    #[serde(rename = "tx")]
    pub transaction: Transaction,
    /// Receipt fetched for the transaction
    pub receipt: Receipt,
}

/// Return every transaction whose receipt reports a different block hash,
/// in block order.
///
/// An empty result means the block is internally consistent.
#[must_use]
pub fn check(fetched: &FetchedBlock) -> Vec<InconsistentPair> {
    fetched
        .block
        .transactions
        .iter()
        .zip(&fetched.receipts)
        .enumerate()
        .filter(|(_, (tx, receipt))| tx.block_hash != receipt.block_hash)
        .map(|(index, (tx, receipt))| InconsistentPair {
            index,
            transaction: tx.clone(),
            receipt: receipt.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Block;
    use alloy::primitives::{b256, B256};

    const AA: B256 = b256!("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
    const BB: B256 = b256!("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb");

    fn tx_hash(i: u8) -> B256 {
        B256::repeat_byte(i)
    }

    fn fetched(tx_block_hashes: &[B256], receipt_block_hashes: &[B256]) -> FetchedBlock {
        let transactions = tx_block_hashes
            .iter()
            .enumerate()
            .map(|(i, h)| Transaction::new(tx_hash(i as u8 + 1), Some(*h)))
            .collect();
        let receipts = receipt_block_hashes
            .iter()
            .enumerate()
            .map(|(i, h)| Receipt::new(tx_hash(i as u8 + 1), Some(*h)))
            .collect();

        FetchedBlock {
            block: Block::new(100, AA, B256::ZERO, 0, transactions),
            receipts,
        }
    }

    #[test]
    fn test_consistent_block_has_no_pairs() {
        assert!(check(&fetched(&[AA, AA], &[AA, AA])).is_empty());
    }

    #[test]
    fn test_empty_block_is_consistent() {
        assert!(check(&fetched(&[], &[])).is_empty());
    }

    #[test]
    fn test_mismatches_keep_their_positions() {
        let pairs = check(&fetched(&[AA, AA, AA, AA], &[AA, BB, AA, BB]));

        let indexes: Vec<_> = pairs.iter().map(|p| p.index).collect();
        assert_eq!(indexes, vec![1, 3]);
        assert_eq!(pairs[0].transaction.hash, tx_hash(2));
        assert_eq!(pairs[0].receipt.block_hash, Some(BB));
        assert_eq!(pairs[1].transaction.hash, tx_hash(4));
    }

    #[test]
    fn test_header_hash_is_not_consulted() {
        // tx and receipt agree with each other but not with the block hash
        assert!(check(&fetched(&[BB], &[BB])).is_empty());
    }

    #[test]
    fn test_null_receipt_block_hash_is_a_mismatch() {
        let mut block = fetched(&[AA], &[AA]);
        block.receipts[0].block_hash = None;

        let pairs = check(&block);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].index, 0);
    }

    #[test]
    fn test_pair_serializes_like_the_evidence_format() {
        let pairs = check(&fetched(&[AA], &[BB]));
        let json = serde_json::to_value(&pairs[0]).unwrap();

        assert_eq!(json["index"], 0);
        assert!(json["tx"]["blockHash"].is_string());
        assert!(json["receipt"]["blockHash"].is_string());
    }
}
