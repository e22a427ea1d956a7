//! The reconciliation loop.
//!
//! For one header, re-fetch the block at `header.number` together with every
//! receipt, check that each receipt agrees with its transaction about the
//! block hash, and retry on disagreement until the block is consistent or the
//! attempt budget runs out.
//!
//! # State Machine
//!
//! ```text
//!            ┌──────────────────────────────┐
//!            ▼                              │ delay, attempt += 1
//!       FETCHING ──▶ CHECKING ──▶ BACKOFF ──┘
//!            │            │          │
//!   transport error       ▼          ▼ attempt == max
//!       (fatal)       ACCEPTED   EXHAUSTED (fatal)
//! ```
//!
//! Every inconsistent attempt writes one evidence record before the budget is
//! consulted, so a mismatch that never clears leaves exactly `max_attempts`
//! records behind, all on the one evidence trail the run claimed. Transport
//! and persistence failures are never retried here.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use alloy::primitives::B256;
use chrono::Utc;
use tracing::{debug, instrument};

use crate::chain::HeaderEvent;
use crate::consistency::{check, InconsistentPair};
use crate::error::{CanaryError, CanaryResult, ExhaustionReport};
use crate::evidence::{EvidenceRecord, EvidenceStore, EvidenceTrail};
use crate::fetcher::{fetch_block_with_receipts, ChainSource, FetchedBlock};
use crate::observability::{ReconcileEvent, ReconcileEventKind, ShortHash};
use crate::reorg::HeadObservation;

/// Default attempt ceiling per header.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 100;

/// Default flat delay between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(750);

/// Retry budget and flat backoff for one header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Fetch attempts allowed before giving up (at least 1)
    pub max_attempts: u32,
    /// Delay between an inconsistent attempt and the next fetch
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Successful end of a reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Header that was reconciled
    pub header: HeaderEvent,
    /// Hash of the block accepted on the last attempt
    pub block_hash: B256,
    /// Attempt on which the block was found consistent
    pub attempts: u32,
    /// Evidence written along the way, in attempt order
    pub evidence: Vec<PathBuf>,
    /// Wall time spent on the reconciliation
    pub elapsed: Duration,
}

/// Per-header mutable state.
#[derive(Debug)]
struct ReconciliationState {
    attempt: u32,
    observation: HeadObservation,
    trail: EvidenceTrail,
    evidence: Vec<PathBuf>,
    started: Instant,
}

enum Phase {
    Fetching,
    Checking(FetchedBlock),
    Backoff {
        fetched: FetchedBlock,
        inconsistent: Vec<InconsistentPair>,
    },
    Accepted(FetchedBlock),
    Exhausted {
        fetched: FetchedBlock,
        inconsistent: Vec<InconsistentPair>,
    },
}

/// Drives header reconciliations against one chain source.
///
/// Holds no per-header state, so one instance can serve any number of
/// concurrent reconciliations.
#[derive(Debug)]
pub struct Reconciler<S> {
    source: S,
    evidence: EvidenceStore,
    policy: RetryPolicy,
}

impl<S: ChainSource> Reconciler<S> {
    /// Create a reconciler. A `max_attempts` of zero is treated as one.
    pub fn new(source: S, evidence: EvidenceStore, policy: RetryPolicy) -> Self {
        let policy = RetryPolicy {
            max_attempts: policy.max_attempts.max(1),
            ..policy
        };
        Self {
            source,
            evidence,
            policy,
        }
    }

    /// The chain source used for fetches.
    pub const fn source(&self) -> &S {
        &self.source
    }

    /// The evidence store used for inconsistent attempts.
    pub const fn evidence(&self) -> &EvidenceStore {
        &self.evidence
    }

    /// The retry policy in effect.
    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Reconcile one header to a terminal outcome.
    ///
    /// # Errors
    ///
    /// - [`CanaryError::Exhausted`] if the block never became consistent
    /// - the fetch error, if any block or receipt fetch failed
    /// - [`CanaryError::EvidenceError`] if an evidence record could not be written
    #[instrument(skip(self, header, observation), fields(block = header.number))]
    pub async fn reconcile(
        &self,
        run_id: u64,
        header: HeaderEvent,
        observation: HeadObservation,
    ) -> CanaryResult<ReconcileOutcome> {
        let mut state = ReconciliationState {
            attempt: 1,
            observation,
            trail: EvidenceTrail::new(),
            evidence: Vec::new(),
            started: Instant::now(),
        };

        ReconcileEvent::new(ReconcileEventKind::NewHead, run_id, header).emit();
        if observation.is_reorg {
            let mut event = ReconcileEvent::new(ReconcileEventKind::ApparentReorg, run_id, header);
            if let Some(previous) = observation.previous {
                event = event.detail(format!(
                    "previous head {} {}",
                    previous.number,
                    ShortHash(previous.hash)
                ));
            }
            event.emit();
        }

        let result = self.run(run_id, header, &mut state).await;
        if let Err(ref e) = result {
            if e.exhaustion_report().is_none() {
                ReconcileEvent::new(ReconcileEventKind::Failed, run_id, header)
                    .attempt(state.attempt)
                    .elapsed(state.started.elapsed())
                    .detail(e.to_string())
                    .emit();
            }
        }
        result
    }

    async fn run(
        &self,
        run_id: u64,
        header: HeaderEvent,
        state: &mut ReconciliationState,
    ) -> CanaryResult<ReconcileOutcome> {
        let mut phase = Phase::Fetching;

        loop {
            phase = match phase {
                Phase::Fetching => {
                    debug!(block = header.number, attempt = state.attempt, "Fetching block");
                    Phase::Checking(fetch_block_with_receipts(&self.source, header.number).await?)
                }

                Phase::Checking(fetched) => {
                    let inconsistent = check(&fetched);
                    if inconsistent.is_empty() {
                        Phase::Accepted(fetched)
                    } else {
                        Phase::Backoff {
                            fetched,
                            inconsistent,
                        }
                    }
                }

                Phase::Backoff {
                    fetched,
                    inconsistent,
                } => {
                    let record = EvidenceRecord {
                        timestamp: Utc::now(),
                        block_number: header.number,
                        attempt: state.attempt,
                        run_id,
                        header_timestamp: header.date(),
                        block_timestamp: fetched.block.date(),
                        apparent_reorg: state.observation.is_reorg,
                        previous_header: state.observation.previous,
                        inconsistent_transactions: inconsistent,
                        header,
                        block: fetched.block,
                    };
                    let path = self.evidence.record(&mut state.trail, &record).await?;

                    ReconcileEvent::new(ReconcileEventKind::InconsistentBlock, run_id, header)
                        .attempt(state.attempt)
                        .block(record.block.number_u64(), record.block.hash)
                        .inconsistent(record.inconsistent_transactions.len())
                        .elapsed(state.started.elapsed())
                        .detail(path.display().to_string())
                        .emit();
                    state.evidence.push(path);

                    let fetched = FetchedBlock {
                        block: record.block,
                        receipts: fetched.receipts,
                    };
                    if state.attempt >= self.policy.max_attempts {
                        Phase::Exhausted {
                            fetched,
                            inconsistent: record.inconsistent_transactions,
                        }
                    } else {
                        tokio::time::sleep(self.policy.delay).await;
                        state.attempt += 1;
                        Phase::Fetching
                    }
                }

                Phase::Accepted(fetched) => {
                    let elapsed = state.started.elapsed();
                    ReconcileEvent::new(ReconcileEventKind::BlockOk, run_id, header)
                        .attempt(state.attempt)
                        .block(fetched.block.number_u64(), fetched.block.hash)
                        .elapsed(elapsed)
                        .emit();

                    return Ok(ReconcileOutcome {
                        header,
                        block_hash: fetched.block.hash,
                        attempts: state.attempt,
                        evidence: std::mem::take(&mut state.evidence),
                        elapsed,
                    });
                }

                Phase::Exhausted {
                    fetched,
                    inconsistent,
                } => {
                    let elapsed = state.started.elapsed();
                    ReconcileEvent::new(ReconcileEventKind::Exhausted, run_id, header)
                        .attempt(state.attempt)
                        .block(fetched.block.number_u64(), fetched.block.hash)
                        .inconsistent(inconsistent.len())
                        .elapsed(elapsed)
                        .emit();

                    return Err(CanaryError::exhausted(ExhaustionReport {
                        header,
                        attempts: state.attempt,
                        last_block_hash: fetched.block.hash,
                        last_block_number: fetched.block.number_u64(),
                        inconsistent_transactions: inconsistent.len(),
                        elapsed,
                    }));
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{Block, Receipt, Transaction};
    use alloy::eips::BlockNumberOrTag;
    use std::sync::atomic::{AtomicU32, Ordering};

    const AA: B256 = B256::repeat_byte(0xaa);
    const BB: B256 = B256::repeat_byte(0xbb);
    const TX: B256 = B256::repeat_byte(0x01);

    /// Receipt reports `BB` until `heal_on` block fetches have happened.
    struct HealsAfter {
        heal_on: u32,
        block_fetches: AtomicU32,
    }

    impl ChainSource for HealsAfter {
        async fn block_by_number(&self, _number: BlockNumberOrTag) -> CanaryResult<Option<Block>> {
            self.block_fetches.fetch_add(1, Ordering::SeqCst);
            Ok(Some(Block::new(
                100,
                AA,
                B256::ZERO,
                1_700_000_000,
                vec![Transaction::new(TX, Some(AA))],
            )))
        }

        async fn receipt_by_hash(&self, hash: B256) -> CanaryResult<Option<Receipt>> {
            let fetches = self.block_fetches.load(Ordering::SeqCst);
            let reported = if fetches >= self.heal_on { AA } else { BB };
            Ok(Some(Receipt::new(hash, Some(reported))))
        }
    }

    fn reconciler(
        heal_on: u32,
        max_attempts: u32,
        dir: &std::path::Path,
    ) -> Reconciler<HealsAfter> {
        Reconciler::new(
            HealsAfter {
                heal_on,
                block_fetches: AtomicU32::new(0),
            },
            EvidenceStore::new(dir),
            RetryPolicy {
                max_attempts,
                delay: Duration::from_millis(1),
            },
        )
    }

    fn header() -> HeaderEvent {
        HeaderEvent::new(100, AA, B256::ZERO, 1_700_000_000)
    }

    fn fresh() -> HeadObservation {
        HeadObservation {
            is_reorg: false,
            previous: None,
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 100);
        assert_eq!(policy.delay, Duration::from_millis(750));
    }

    #[test]
    fn test_zero_max_attempts_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(reconciler(1, 0, dir.path()).policy().max_attempts, 1);
    }

    #[tokio::test]
    async fn test_heals_on_third_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let reconciler = reconciler(3, 10, dir.path());

        let outcome = reconciler.reconcile(0, header(), fresh()).await.unwrap();
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.evidence.len(), 2);
        assert!(outcome.evidence[0].ends_with("block-100/attempt-001.json"));
        assert!(outcome.evidence[1].ends_with("block-100/attempt-002.json"));
    }

    #[tokio::test]
    async fn test_budget_of_one_exhausts_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let reconciler = reconciler(u32::MAX, 1, dir.path());

        let err = reconciler.reconcile(0, header(), fresh()).await.unwrap_err();
        let report = err.exhaustion_report().unwrap();
        assert_eq!(report.attempts, 1);
        assert_eq!(report.inconsistent_transactions, 1);
        assert_eq!(reconciler.source().block_fetches.load(Ordering::SeqCst), 1);
        assert!(reconciler.evidence().record_path(100, 1).exists());
    }

    #[tokio::test]
    async fn test_evidence_carries_reorg_context() {
        let dir = tempfile::tempdir().unwrap();
        let reconciler = reconciler(2, 10, dir.path());
        let previous = HeaderEvent::new(100, BB, B256::ZERO, 1_699_999_988);
        let observation = HeadObservation {
            is_reorg: true,
            previous: Some(previous),
        };

        let outcome = reconciler.reconcile(9, header(), observation).await.unwrap();
        let raw = std::fs::read_to_string(&outcome.evidence[0]).unwrap();
        let record: EvidenceRecord = serde_json::from_str(&raw).unwrap();

        assert!(record.apparent_reorg);
        assert_eq!(record.previous_header, Some(previous));
        assert_eq!(record.run_id, 9);
        assert_eq!(record.inconsistent_transactions[0].receipt.block_hash, Some(BB));
    }
}
