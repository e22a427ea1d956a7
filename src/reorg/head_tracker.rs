//! Head tracker implementation.

use alloy::eips::BlockNumberOrTag;
use tracing::{debug, info, instrument, warn};

use crate::chain::HeaderEvent;
use crate::error::CanaryResult;
use crate::fetcher::{fetch_block, ChainSource};

/// Result of observing one header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadObservation {
    /// `true` iff a previous header exists and this one does not advance past it
    pub is_reorg: bool,
    /// Header observed immediately before this one
    pub previous: Option<HeaderEvent>,
}

/// Most recently observed chain head.
///
/// Owned by the single consumer of the header stream. [`observe`] swaps the
/// new header in and hands back the old one in one step, so the previous
/// header seen by each reconciliation follows delivery order no matter how
/// long earlier reconciliations take.
///
/// [`observe`]: HeadTracker::observe
#[derive(Debug, Clone, Default)]
pub struct HeadTracker {
    /// Last observed header
    previous: Option<HeaderEvent>,

    /// Apparent reorgs flagged so far
    reorg_count: u64,
}

impl HeadTracker {
    /// Create a tracker with no baseline; the first header is never a reorg.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            previous: None,
            reorg_count: 0,
        }
    }

    /// Create a tracker with an explicit baseline header.
    #[must_use]
    pub const fn with_baseline(header: HeaderEvent) -> Self {
        Self {
            previous: Some(header),
            reorg_count: 0,
        }
    }

    /// Create a tracker seeded from the node's current head.
    ///
    /// # Errors
    ///
    /// Returns error if the latest block cannot be fetched.
    #[instrument(skip(source))]
    pub async fn seed<S: ChainSource>(source: &S) -> CanaryResult<Self> {
        let latest = fetch_block(source, BlockNumberOrTag::Latest).await?;
        let baseline = latest.header_event();

        info!(
            block = baseline.number,
            hash = %baseline.hash,
            "Head tracker seeded from latest block"
        );

        Ok(Self::with_baseline(baseline))
    }

    /// Record `header` as the new head and compare it with the previous one.
    pub fn observe(&mut self, header: HeaderEvent) -> HeadObservation {
        let previous = self.previous.replace(header);
        let is_reorg = previous.is_some_and(|prev| header.number <= prev.number);

        if is_reorg {
            self.reorg_count += 1;
            warn!(
                block = header.number,
                previous = previous.map(|p| p.number),
                "Header does not advance past previous head"
            );
        } else {
            debug!(block = header.number, "Tracking head");
        }

        HeadObservation { is_reorg, previous }
    }

    /// Get the last observed header.
    #[must_use]
    pub const fn previous(&self) -> Option<&HeaderEvent> {
        self.previous.as_ref()
    }

    /// Get the number of apparent reorgs flagged so far.
    #[must_use]
    pub const fn reorg_count(&self) -> u64 {
        self.reorg_count
    }
}
