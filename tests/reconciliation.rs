//! Reconciliation scenarios against a scripted node.

mod common;

use std::time::Duration;

use alloy::primitives::B256;
use common::{block_hash, file_names, header, tx_hash, Round, ScriptedChain};
use eth_consistency_canary::error::CanaryError;
use eth_consistency_canary::evidence::{EvidenceRecord, EvidenceStore};
use eth_consistency_canary::reconcile::{Reconciler, RetryPolicy};
use eth_consistency_canary::reorg::{HeadObservation, HeadTracker};

const STALE: B256 = B256::repeat_byte(0xbb);

fn reconciler(
    chain: ScriptedChain,
    dir: &std::path::Path,
    max_attempts: u32,
) -> Reconciler<ScriptedChain> {
    Reconciler::new(
        chain,
        EvidenceStore::new(dir),
        RetryPolicy {
            max_attempts,
            delay: Duration::from_millis(1),
        },
    )
}

fn first_head() -> HeadObservation {
    HeadTracker::new().observe(header(100))
}

#[tokio::test]
async fn test_consistent_block_accepted_first_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let chain = ScriptedChain::new().with_rounds(100, vec![Round::consistent(100, 3)]);
    let reconciler = reconciler(chain, dir.path(), 100);

    let outcome = reconciler
        .reconcile(0, header(100), first_head())
        .await
        .unwrap();

    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.block_hash, block_hash(100));
    assert!(outcome.evidence.is_empty());
    assert_eq!(reconciler.source().block_fetches(100), 1);
    assert_eq!(reconciler.source().receipt_fetches(), 3);
    assert!(!dir.path().join("block-100").exists());
}

#[tokio::test]
async fn test_empty_block_is_consistent() {
    let dir = tempfile::tempdir().unwrap();
    let chain = ScriptedChain::new().with_rounds(100, vec![Round::consistent(100, 0)]);
    let reconciler = reconciler(chain, dir.path(), 100);

    let outcome = reconciler
        .reconcile(0, header(100), first_head())
        .await
        .unwrap();

    assert_eq!(outcome.attempts, 1);
    assert_eq!(reconciler.source().receipt_fetches(), 0);
}

#[tokio::test]
async fn test_stale_receipt_retried_once() {
    let dir = tempfile::tempdir().unwrap();
    let chain = ScriptedChain::new().with_rounds(
        100,
        vec![Round::stale(100, 3, 1, STALE), Round::consistent(100, 3)],
    );
    let reconciler = reconciler(chain, dir.path(), 100);

    let outcome = reconciler
        .reconcile(4, header(100), first_head())
        .await
        .unwrap();

    assert_eq!(outcome.attempts, 2);
    assert_eq!(reconciler.source().block_fetches(100), 2);
    assert_eq!(file_names(&dir.path().join("block-100")), ["attempt-001.json"]);

    let raw = std::fs::read_to_string(&outcome.evidence[0]).unwrap();
    let record: EvidenceRecord = serde_json::from_str(&raw).unwrap();
    assert_eq!(record.block_number, 100);
    assert_eq!(record.attempt, 1);
    assert_eq!(record.run_id, 4);
    assert!(!record.apparent_reorg);
    assert_eq!(record.block.transactions.len(), 3);
    assert_eq!(record.inconsistent_transactions.len(), 1);

    let pair = &record.inconsistent_transactions[0];
    assert_eq!(pair.index, 1);
    assert_eq!(pair.transaction.hash, tx_hash(100, 1));
    assert_eq!(pair.transaction.block_hash, Some(block_hash(100)));
    assert_eq!(pair.receipt.block_hash, Some(STALE));
}

#[tokio::test]
async fn test_never_consistent_exhausts_after_budget() {
    let dir = tempfile::tempdir().unwrap();
    let chain = ScriptedChain::new().with_rounds(100, vec![Round::stale(100, 2, 0, STALE)]);
    let reconciler = Reconciler::new(
        chain,
        EvidenceStore::new(dir.path()),
        RetryPolicy {
            max_attempts: 100,
            delay: Duration::ZERO,
        },
    );

    let err = reconciler
        .reconcile(0, header(100), first_head())
        .await
        .unwrap_err();

    let report = err.exhaustion_report().expect("exhaustion error");
    assert_eq!(report.attempts, 100);
    assert_eq!(report.header.number, 100);
    assert_eq!(report.last_block_hash, block_hash(100));
    assert_eq!(report.inconsistent_transactions, 1);
    assert!(err.to_string().contains("after 100 attempts"));

    assert_eq!(reconciler.source().block_fetches(100), 100);

    let expected: Vec<String> = (1..=100).map(|i| format!("attempt-{i:03}.json")).collect();
    assert_eq!(file_names(&dir.path().join("block-100")), expected);
}

#[tokio::test]
async fn test_fetch_error_is_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let chain = ScriptedChain::new().failing(100);
    let reconciler = reconciler(chain, dir.path(), 100);

    let err = reconciler
        .reconcile(0, header(100), first_head())
        .await
        .unwrap_err();

    assert!(matches!(err, CanaryError::RpcError { .. }));
    assert!(err.exhaustion_report().is_none());
    assert!(!dir.path().join("block-100").exists());
}

#[tokio::test]
async fn test_missing_block_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let reconciler = reconciler(ScriptedChain::new(), dir.path(), 100);

    let err = reconciler
        .reconcile(0, header(100), first_head())
        .await
        .unwrap_err();

    assert!(matches!(err, CanaryError::DecodingError { .. }));
}

#[tokio::test]
async fn test_missing_receipt_aborts_reconciliation() {
    let dir = tempfile::tempdir().unwrap();
    let chain =
        ScriptedChain::new().with_rounds(100, vec![Round::consistent(100, 3).without_receipt(2)]);
    let reconciler = reconciler(chain, dir.path(), 100);

    let err = reconciler
        .reconcile(0, header(100), first_head())
        .await
        .unwrap_err();

    assert!(matches!(err, CanaryError::DecodingError { .. }));
    assert_eq!(reconciler.source().block_fetches(100), 1);
}

#[tokio::test]
async fn test_concurrent_runs_for_same_block_keep_all_evidence() {
    let dir = tempfile::tempdir().unwrap();
    let chain = ScriptedChain::new().with_rounds(100, vec![Round::stale(100, 1, 0, STALE)]);
    let reconciler = reconciler(chain, dir.path(), 2);

    let (a, b) = tokio::join!(
        reconciler.reconcile(1, header(100), first_head()),
        reconciler.reconcile(2, header(100), first_head()),
    );
    assert!(a.unwrap_err().exhaustion_report().is_some());
    assert!(b.unwrap_err().exhaustion_report().is_some());

    // Two runs, two attempts each, no record overwritten
    assert_eq!(file_names(&dir.path().join("block-100")).len(), 4);
}

#[tokio::test]
async fn test_repeated_runs_with_same_run_id_keep_separate_trails() {
    let dir = tempfile::tempdir().unwrap();
    let heals_on_third = || {
        ScriptedChain::new().with_rounds(
            100,
            vec![
                Round::stale(100, 1, 0, STALE),
                Round::stale(100, 1, 0, STALE),
                Round::consistent(100, 1),
            ],
        )
    };

    // Three one-shot checks of the same block, each a fresh process with run id 0
    let mut trails = Vec::new();
    for _ in 0..3 {
        let outcome = reconciler(heals_on_third(), dir.path(), 100)
            .reconcile(0, header(100), first_head())
            .await
            .unwrap();
        assert_eq!(outcome.attempts, 3);
        let names: Vec<String> = outcome
            .evidence
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        trails.push(names);
    }

    assert_eq!(trails[0], ["attempt-001.json", "attempt-002.json"]);
    assert_eq!(trails[1], ["attempt-001-run-0.json", "attempt-002-run-0.json"]);
    assert_eq!(trails[2], ["attempt-001-run-0-2.json", "attempt-002-run-0-2.json"]);
    assert_eq!(file_names(&dir.path().join("block-100")).len(), 6);
}

#[tokio::test]
async fn test_second_run_never_joins_the_plain_trail() {
    let dir = tempfile::tempdir().unwrap();
    let chain = ScriptedChain::new().with_rounds(100, vec![Round::stale(100, 1, 0, STALE)]);

    // An earlier run left only attempt-001.json behind
    let err = reconciler(chain, dir.path(), 1)
        .reconcile(0, header(100), first_head())
        .await
        .unwrap_err();
    assert!(err.exhaustion_report().is_some());

    let chain = ScriptedChain::new().with_rounds(100, vec![Round::stale(100, 1, 0, STALE)]);
    let err = reconciler(chain, dir.path(), 3)
        .reconcile(2, header(100), first_head())
        .await
        .unwrap_err();
    assert!(err.exhaustion_report().is_some());

    assert_eq!(
        file_names(&dir.path().join("block-100")),
        [
            "attempt-001-run-2.json",
            "attempt-001.json",
            "attempt-002-run-2.json",
            "attempt-003-run-2.json",
        ]
    );
}

#[tokio::test]
async fn test_apparent_reorg_recorded_in_evidence() {
    let dir = tempfile::tempdir().unwrap();
    let chain = ScriptedChain::new().with_rounds(
        100,
        vec![Round::stale(100, 1, 0, STALE), Round::consistent(100, 1)],
    );
    let reconciler = reconciler(chain, dir.path(), 100);

    let mut tracker = HeadTracker::with_baseline(header(101));
    let observation = tracker.observe(header(100));
    assert!(observation.is_reorg);

    let outcome = reconciler
        .reconcile(0, header(100), observation)
        .await
        .unwrap();

    let raw = std::fs::read_to_string(&outcome.evidence[0]).unwrap();
    let record: EvidenceRecord = serde_json::from_str(&raw).unwrap();
    assert!(record.apparent_reorg);
    assert_eq!(record.previous_header, Some(header(101)));
}
