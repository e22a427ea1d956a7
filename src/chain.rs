//! Chain data as the canary sees it.
//!
//! Blocks, transactions and receipts are decoded only as far as the
//! consistency check needs. Every other field the node returns is kept in a
//! flattened map so evidence records carry the node's answer verbatim.

use alloy::primitives::{B256, U64};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A chain-head update delivered by the `newHeads` subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderEvent {
    /// Block number
    pub number: u64,

    /// Block hash
    pub hash: B256,

    /// Parent block hash
    pub parent_hash: B256,

    /// Block timestamp (Unix epoch seconds)
    pub timestamp: u64,
}

impl HeaderEvent {
    /// Create a new header event manually (useful for testing).
    #[must_use]
    pub const fn new(number: u64, hash: B256, parent_hash: B256, timestamp: u64) -> Self {
        Self {
            number,
            hash,
            parent_hash,
            timestamp,
        }
    }

    /// Wall-clock date of the header's timestamp.
    #[must_use]
    pub fn date(&self) -> Option<DateTime<Utc>> {
        unix_date(self.timestamp)
    }
}

impl From<alloy::rpc::types::Header> for HeaderEvent {
    fn from(header: alloy::rpc::types::Header) -> Self {
        Self {
            number: header.number,
            hash: header.hash,
            parent_hash: header.parent_hash,
            timestamp: header.timestamp,
        }
    }
}

/// A transaction embedded in a full block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Transaction hash
    pub hash: B256,

    /// Hash of the block the transaction claims to belong to
    pub block_hash: Option<B256>,

    /// Remaining fields, passed through untouched
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl Transaction {
    /// Create a transaction with no extra fields.
    #[must_use]
    pub fn new(hash: B256, block_hash: Option<B256>) -> Self {
        Self {
            hash,
            block_hash,
            other: Map::new(),
        }
    }
}

/// A transaction receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    /// Hash of the transaction this receipt belongs to
    #[serde(default)]
    pub transaction_hash: Option<B256>,

    /// Hash of the block the receipt reports
    pub block_hash: Option<B256>,

    /// Remaining fields, passed through untouched
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl Receipt {
    /// Create a receipt with no extra fields.
    #[must_use]
    pub fn new(transaction_hash: B256, block_hash: Option<B256>) -> Self {
        Self {
            transaction_hash: Some(transaction_hash),
            block_hash,
            other: Map::new(),
        }
    }
}

/// A block fetched with full transaction objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Block number (hex quantity on the wire)
    pub number: U64,

    /// Block hash
    pub hash: B256,

    /// Parent block hash
    pub parent_hash: B256,

    /// Block timestamp (hex quantity on the wire)
    pub timestamp: U64,

    /// Transactions in block order
    #[serde(default)]
    pub transactions: Vec<Transaction>,

    /// Remaining fields, passed through untouched
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl Block {
    /// Create a block with no extra fields.
    #[must_use]
    pub fn new(
        number: u64,
        hash: B256,
        parent_hash: B256,
        timestamp: u64,
        transactions: Vec<Transaction>,
    ) -> Self {
        Self {
            number: U64::from(number),
            hash,
            parent_hash,
            timestamp: U64::from(timestamp),
            transactions,
            other: Map::new(),
        }
    }

    /// Block number as a `u64`.
    #[must_use]
    pub fn number_u64(&self) -> u64 {
        self.number.to::<u64>()
    }

    /// Block timestamp as a `u64`.
    #[must_use]
    pub fn timestamp_u64(&self) -> u64 {
        self.timestamp.to::<u64>()
    }

    /// Wall-clock date of the block's timestamp.
    #[must_use]
    pub fn date(&self) -> Option<DateTime<Utc>> {
        unix_date(self.timestamp_u64())
    }

    /// Identifying summary of this block.
    #[must_use]
    pub fn header_event(&self) -> HeaderEvent {
        HeaderEvent::new(
            self.number_u64(),
            self.hash,
            self.parent_hash,
            self.timestamp_u64(),
        )
    }
}

fn unix_date(secs: u64) -> Option<DateTime<Utc>> {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}
