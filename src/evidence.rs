//! Inconsistency evidence persistence.
//!
//! Every inconsistent reconciliation attempt leaves one pretty-printed JSON
//! file behind:
//!
//! ```text
//! <root>/block-<number>/attempt-<NNN>.json
//! ```
//!
//! Attempt ordinals are zero-padded to three digits so a directory listing
//! reads as the ordered retry trail for that height. Records are never
//! overwritten. Each reconciliation owns one [`EvidenceTrail`], claimed with
//! its first record: the plain names above if `attempt-001.json` is free,
//! otherwise the first free suffix of `-run-<run>`, `-run-<run>-2`,
//! `-run-<run>-3`, ... Every later attempt of that reconciliation reuses the
//! same suffix, so trails from different runs (including earlier processes,
//! whose run ids also started at 0) never interleave.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use crate::chain::{Block, HeaderEvent};
use crate::consistency::InconsistentPair;
use crate::error::{CanaryError, CanaryResult};

/// Default evidence root, relative to the working directory.
pub const DEFAULT_EVIDENCE_DIR: &str = "reorgs";

/// Upper bound on suffixed trails tried for one run id at one height.
const MAX_TRAILS_PER_RUN: u32 = 10_000;

/// Snapshot of one inconsistent reconciliation attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceRecord {
    /// When the inconsistency was observed
    pub timestamp: DateTime<Utc>,
    /// Block number being reconciled
    pub block_number: u64,
    /// Attempt ordinal, starting at 1
    pub attempt: u32,
    /// Reconciliation run that produced this record
    pub run_id: u64,
    /// Date of the header's timestamp
    pub header_timestamp: Option<DateTime<Utc>>,
    /// Date of the fetched block's timestamp
    pub block_timestamp: Option<DateTime<Utc>>,
    /// Whether the header did not advance past the previous one
    pub apparent_reorg: bool,
    /// Header observed just before this one
    pub previous_header: Option<HeaderEvent>,
    /// Every mismatched transaction/receipt pair of the attempt
    pub inconsistent_transactions: Vec<InconsistentPair>,
    /// Header that triggered the reconciliation
    pub header: HeaderEvent,
    /// Block as fetched on this attempt
    pub block: Block,
}

/// File names owned by one reconciliation.
///
/// Starts unclaimed. The first [`EvidenceStore::record`] call claims a suffix
/// by creating that attempt's file exclusively, and every later call writes
/// under the same suffix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvidenceTrail {
    suffix: Option<String>,
}

impl EvidenceTrail {
    /// An unclaimed trail.
    #[must_use]
    pub const fn new() -> Self {
        Self { suffix: None }
    }

    /// Claimed suffix: `Some("")` for the plain names, `None` before the
    /// first record.
    #[must_use]
    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }
}

/// File-backed evidence store.
#[derive(Debug, Clone)]
pub struct EvidenceStore {
    root: PathBuf,
}

impl EvidenceStore {
    /// Create a store rooted at `root`. Directories are created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding every record for `block_number`.
    #[must_use]
    pub fn block_dir(&self, block_number: u64) -> PathBuf {
        self.root.join(format!("block-{block_number}"))
    }

    /// Path of the record for `(block_number, attempt)` on the plain trail.
    #[must_use]
    pub fn record_path(&self, block_number: u64, attempt: u32) -> PathBuf {
        trail_path(&self.block_dir(block_number), attempt, "")
    }

    /// Persist one record on `trail` and return the path it was written to.
    ///
    /// An unclaimed trail is claimed here; a claimed one keeps its suffix.
    ///
    /// # Errors
    ///
    /// Returns an [`CanaryError::EvidenceError`] if the record cannot be
    /// serialized or written, or if a claimed trail's file already exists.
    /// Nothing is retried.
    #[instrument(
        skip(self, trail, record),
        fields(block = record.block_number, attempt = record.attempt)
    )]
    pub async fn record(
        &self,
        trail: &mut EvidenceTrail,
        record: &EvidenceRecord,
    ) -> CanaryResult<PathBuf> {
        let json = serde_json::to_vec_pretty(record).map_err(|e| {
            CanaryError::evidence("Failed to serialize evidence record", Some(Box::new(e)))
        })?;

        let dir = self.block_dir(record.block_number);
        fs::create_dir_all(&dir).await.map_err(|e| {
            CanaryError::evidence(
                format!("Failed to create evidence directory {}", dir.display()),
                Some(Box::new(e)),
            )
        })?;

        let path = match trail.suffix() {
            Some(suffix) => {
                let path = trail_path(&dir, record.attempt, suffix);
                write_new(&path, &json)
                    .await
                    .map_err(|e| write_error(&path, e))?;
                path
            }
            None => {
                let (suffix, path) = claim_trail(&dir, record, &json).await?;
                if !suffix.is_empty() {
                    debug!(suffix = %suffix, "Plain evidence trail taken, using suffixed trail");
                }
                trail.suffix = Some(suffix);
                path
            }
        };

        debug!(path = %path.display(), bytes = json.len(), "Evidence record written");
        Ok(path)
    }
}

/// Write `json` under the first free trail suffix for `record.run_id`.
async fn claim_trail(
    dir: &Path,
    record: &EvidenceRecord,
    json: &[u8],
) -> CanaryResult<(String, PathBuf)> {
    let run = record.run_id;
    let candidates = std::iter::once(String::new())
        .chain(std::iter::once(format!("-run-{run}")))
        .chain((2..=MAX_TRAILS_PER_RUN).map(|k| format!("-run-{run}-{k}")));

    for suffix in candidates {
        let path = trail_path(dir, record.attempt, &suffix);
        match write_new(&path, json).await {
            Ok(()) => return Ok((suffix, path)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => return Err(write_error(&path, e)),
        }
    }

    Err(CanaryError::evidence(
        format!(
            "No free evidence trail for block {} run {run} in {}",
            record.block_number,
            dir.display()
        ),
        None,
    ))
}

fn trail_path(dir: &Path, attempt: u32, suffix: &str) -> PathBuf {
    dir.join(format!("attempt-{attempt:03}{suffix}.json"))
}

async fn write_new(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(contents).await?;
    file.sync_all().await
}

fn write_error(path: &Path, e: std::io::Error) -> CanaryError {
    CanaryError::evidence(
        format!("Failed to write evidence record {}", path.display()),
        Some(Box::new(e)),
    )
}
