//! Scripted chain source shared by the integration tests.
//!
//! Each block number has a list of rounds. The first fetch of a block is
//! answered from round 0, the second from round 1, and so on; the last
//! round repeats forever. Receipt lookups answer from the round of the
//! block fetch that most recently happened for the block holding the
//! transaction.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use alloy::eips::BlockNumberOrTag;
use alloy::primitives::B256;
use eth_consistency_canary::chain::{Block, HeaderEvent, Receipt, Transaction};
use eth_consistency_canary::error::{CanaryError, CanaryResult};
use eth_consistency_canary::fetcher::ChainSource;
use tokio::sync::Semaphore;

pub const TIMESTAMP: u64 = 1_700_000_000;

/// Block hash used for block `number`.
pub fn block_hash(number: u64) -> B256 {
    let mut bytes = [0xaa; 32];
    bytes[24..].copy_from_slice(&number.to_be_bytes());
    B256::from(bytes)
}

/// Transaction hash for position `index` of block `number`.
pub fn tx_hash(number: u64, index: usize) -> B256 {
    let mut bytes = [0x77; 32];
    bytes[16..24].copy_from_slice(&number.to_be_bytes());
    bytes[24..].copy_from_slice(&(index as u64).to_be_bytes());
    B256::from(bytes)
}

/// Header announcing block `number`.
pub fn header(number: u64) -> HeaderEvent {
    HeaderEvent::new(
        number,
        block_hash(number),
        block_hash(number.saturating_sub(1)),
        TIMESTAMP + number * 12,
    )
}

/// One answer for a block and the receipts of its transactions.
#[derive(Debug, Clone)]
pub struct Round {
    pub block: Block,
    pub receipts: HashMap<B256, Receipt>,
}

impl Round {
    /// Every receipt agrees with its transaction.
    pub fn consistent(number: u64, tx_count: usize) -> Self {
        Self::with_receipt_hashes(number, tx_count, |_| block_hash(number))
    }

    /// Receipt `stale_index` reports `stale` instead of the block hash.
    pub fn stale(number: u64, tx_count: usize, stale_index: usize, stale: B256) -> Self {
        Self::with_receipt_hashes(number, tx_count, |i| {
            if i == stale_index {
                stale
            } else {
                block_hash(number)
            }
        })
    }

    fn with_receipt_hashes(number: u64, tx_count: usize, hash_for: impl Fn(usize) -> B256) -> Self {
        let hash = block_hash(number);
        let transactions = (0..tx_count)
            .map(|i| Transaction::new(tx_hash(number, i), Some(hash)))
            .collect();
        let receipts = (0..tx_count)
            .map(|i| {
                let tx = tx_hash(number, i);
                (tx, Receipt::new(tx, Some(hash_for(i))))
            })
            .collect();

        let h = header(number);
        Self {
            block: Block::new(number, hash, h.parent_hash, h.timestamp, transactions),
            receipts,
        }
    }

    /// Drop the receipt for `index`, so the node answers `null` for it.
    pub fn without_receipt(mut self, index: usize) -> Self {
        let tx = self.block.transactions[index].hash;
        self.receipts.remove(&tx);
        self
    }
}

/// Holds receipt lookups for one block until another block is fetched.
#[derive(Debug)]
struct Gate {
    held: u64,
    released_by: u64,
    permits: Semaphore,
}

/// In-memory [`ChainSource`] that replays scripted rounds.
#[derive(Debug, Default)]
pub struct ScriptedChain {
    rounds: HashMap<u64, Vec<Round>>,
    tx_blocks: HashMap<B256, u64>,
    failing: Vec<u64>,
    gate: Option<Gate>,
    block_fetches: Mutex<HashMap<u64, u32>>,
    receipt_fetches: AtomicU32,
}

impl ScriptedChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the answers for block `number`.
    pub fn with_rounds(mut self, number: u64, rounds: Vec<Round>) -> Self {
        assert!(!rounds.is_empty(), "at least one round per block");
        for round in &rounds {
            for tx in &round.block.transactions {
                self.tx_blocks.insert(tx.hash, number);
            }
        }
        self.rounds.insert(number, rounds);
        self
    }

    /// Block fetches for `number` fail with an RPC error.
    pub fn failing(mut self, number: u64) -> Self {
        self.failing.push(number);
        self
    }

    /// Receipt lookups for `held` wait until `released_by` has been fetched.
    pub fn gated(mut self, held: u64, released_by: u64) -> Self {
        self.gate = Some(Gate {
            held,
            released_by,
            permits: Semaphore::new(0),
        });
        self
    }

    /// How many times block `number` was fetched.
    pub fn block_fetches(&self, number: u64) -> u32 {
        self.block_fetches
            .lock()
            .unwrap()
            .get(&number)
            .copied()
            .unwrap_or(0)
    }

    /// Receipt lookups across all blocks.
    pub fn receipt_fetches(&self) -> u32 {
        self.receipt_fetches.load(Ordering::SeqCst)
    }

    fn round(&self, number: u64) -> Option<&Round> {
        let rounds = self.rounds.get(&number)?;
        let fetches = self.block_fetches(number).max(1) as usize;
        rounds.get(fetches - 1).or_else(|| rounds.last())
    }
}

impl ChainSource for ScriptedChain {
    async fn block_by_number(&self, number: BlockNumberOrTag) -> CanaryResult<Option<Block>> {
        let number = match number {
            BlockNumberOrTag::Number(n) => n,
            BlockNumberOrTag::Latest => match self.rounds.keys().max() {
                Some(&n) => n,
                None => return Ok(None),
            },
            other => {
                return Err(CanaryError::rpc(format!("unsupported block tag {other}"), None))
            }
        };

        if self.failing.contains(&number) {
            return Err(CanaryError::rpc(
                format!("block {number}: connection reset"),
                None,
            ));
        }
        if !self.rounds.contains_key(&number) {
            return Ok(None);
        }

        *self
            .block_fetches
            .lock()
            .unwrap()
            .entry(number)
            .or_insert(0) += 1;

        if let Some(gate) = &self.gate {
            if gate.released_by == number {
                gate.permits.add_permits(1);
            }
        }

        Ok(self.round(number).map(|round| round.block.clone()))
    }

    async fn receipt_by_hash(&self, hash: B256) -> CanaryResult<Option<Receipt>> {
        self.receipt_fetches.fetch_add(1, Ordering::SeqCst);

        let Some(&number) = self.tx_blocks.get(&hash) else {
            return Ok(None);
        };

        if let Some(gate) = &self.gate {
            if gate.held == number {
                let _permit = gate
                    .permits
                    .acquire()
                    .await
                    .map_err(|e| CanaryError::rpc("gate closed", Some(Box::new(e))))?;
            }
        }

        Ok(self
            .round(number)
            .and_then(|round| round.receipts.get(&hash).cloned()))
    }
}

/// Sorted file names under `dir`.
pub fn file_names(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
