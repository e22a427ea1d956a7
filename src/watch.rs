//! Head watching: one reconciliation task per delivered header.
//!
//! Headers are consumed in arrival order. Each one is first passed through
//! the [`HeadTracker`] (so the previous-header comparison follows delivery
//! order) and then handed to its own task. Tasks for different headers run
//! concurrently and are never deduplicated.
//!
//! The watch ends when:
//! - a reconciliation fails (exhaustion, fetch or evidence error),
//! - the header stream ends (the subscription dropped), or
//! - the shutdown future resolves.
//!
//! In every case, reconciliations already in flight are awaited to their
//! terminal state before returning.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::stream::{Stream, StreamExt};
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};

use crate::chain::HeaderEvent;
use crate::error::{CanaryError, CanaryResult};
use crate::fetcher::ChainSource;
use crate::reconcile::{ReconcileOutcome, Reconciler};
use crate::reorg::HeadTracker;

/// Process-wide sequence of reconciliation run ids.
#[derive(Debug, Default)]
pub struct RunIds(AtomicU64);

impl RunIds {
    /// Start a sequence at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Allocate the next id.
    pub fn next_id(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// Counters for a finished watch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchSummary {
    /// Headers received
    pub headers: u64,
    /// Reconciliations accepted
    pub accepted: u64,
    /// Reconciliations that needed more than one attempt
    pub retried: u64,
    /// Headers flagged as apparent reorgs
    pub apparent_reorgs: u64,
}

impl WatchSummary {
    fn absorb(
        &mut self,
        joined: Result<CanaryResult<ReconcileOutcome>, JoinError>,
    ) -> CanaryResult<()> {
        let outcome = joined.map_err(|e| {
            CanaryError::task("reconciliation task did not complete", Some(Box::new(e)))
        })??;

        self.accepted += 1;
        if outcome.attempts > 1 {
            self.retried += 1;
        }
        Ok(())
    }
}

/// Reconcile every header from `headers` until failure, disconnect or shutdown.
///
/// # Errors
///
/// - the first reconciliation error, if any reconciliation failed
/// - [`CanaryError::WebSocketDisconnected`] if the stream ended
pub async fn watch<S, H, F>(
    reconciler: Arc<Reconciler<S>>,
    mut tracker: HeadTracker,
    headers: H,
    shutdown: F,
) -> CanaryResult<WatchSummary>
where
    S: ChainSource + 'static,
    H: Stream<Item = HeaderEvent>,
    F: Future<Output = ()>,
{
    let run_ids = RunIds::new();
    let mut tasks = JoinSet::new();
    let mut summary = WatchSummary::default();
    let mut failure: Option<CanaryError> = None;
    let mut stream_ended = false;

    tokio::pin!(headers);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!(
                    in_flight = tasks.len(),
                    "Shutdown signal received, finishing in-flight blocks"
                );
                break;
            }

            next = headers.next() => {
                let Some(header) = next else {
                    warn!("Header subscription ended");
                    stream_ended = true;
                    break;
                };

                let observation = tracker.observe(header);
                let run_id = run_ids.next_id();
                let reconciler = Arc::clone(&reconciler);
                tasks.spawn(async move { reconciler.reconcile(run_id, header, observation).await });
                summary.headers += 1;
            }

            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = summary.absorb(joined) {
                    error!(error = %e, "Reconciliation failed, no longer accepting headers");
                    failure = Some(e);
                    break;
                }
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = summary.absorb(joined) {
            error!(error = %e, "Reconciliation failed");
            failure.get_or_insert(e);
        }
    }
    summary.apparent_reorgs = tracker.reorg_count();

    info!(
        headers = summary.headers,
        accepted = summary.accepted,
        retried = summary.retried,
        apparent_reorgs = summary.apparent_reorgs,
        "Watch finished"
    );

    match failure {
        Some(e) => Err(e),
        None if stream_ended => Err(CanaryError::websocket_disconnected(
            "newHeads subscription stream ended",
        )),
        None => Ok(summary),
    }
}
