//! Apparent chain reorganization tracking.
//!
//! The canary does not resolve reorgs. It only flags a header that fails to
//! advance past the one delivered before it, so reconciliation logs and
//! evidence can say "this arrived while the head was moving backwards".
//!
//! ## How It Works
//!
//! 1. **Baseline**: At startup the current chain head is fetched once and
//!    becomes the previous header (optional, see [`HeadTracker::seed`])
//! 2. **Observe**: Each delivered header is swapped in as the new previous
//!    header, returning the one it replaced
//! 3. **Flag**: The header is an apparent reorg iff its number is not strictly
//!    greater than the replaced header's number. Hashes are not compared.
//!
//! ## Example
//!
//! ```
//! use eth_consistency_canary::chain::HeaderEvent;
//! use eth_consistency_canary::reorg::HeadTracker;
//! use alloy::primitives::B256;
//!
//! let mut tracker = HeadTracker::new();
//! let first = tracker.observe(HeaderEvent::new(100, B256::ZERO, B256::ZERO, 0));
//! assert!(!first.is_reorg);
//!
//! let second = tracker.observe(HeaderEvent::new(100, B256::ZERO, B256::ZERO, 0));
//! assert!(second.is_reorg);
//! ```

pub mod head_tracker;

pub use head_tracker::{HeadObservation, HeadTracker};
