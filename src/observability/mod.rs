//! Observability and structured logging infrastructure.
//!
//! Logging goes through the `tracing` framework. Reconciliation lifecycle
//! events are emitted as [`ReconcileEvent`] records with machine-readable
//! fields; how they are rendered is up to the subscriber.
//!
//! # Usage
//!
//! ```no_run
//! use eth_consistency_canary::observability;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Pretty console output, info level. Keep the guard alive.
//!     let _guard = observability::init_tracing(None, None, false)?;
//!     Ok(())
//! }
//! ```
//!
//! # Environment Configuration
//!
//! ```bash
//! RUST_LOG=debug cargo run -- watch
//! RUST_LOG=eth_consistency_canary=trace,alloy=warn cargo run -- watch
//! LOG_JSON=true LOG_FILE=./logs/canary.log cargo run -- watch
//! ```

use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use alloy::primitives::B256;
use chrono::Utc;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt as tfmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

use crate::chain::HeaderEvent;

/// Initialize the tracing subscriber with configurable output formats.
///
/// # Arguments
///
/// * `log_level` - Optional level override (e.g., "debug"). `RUST_LOG` wins.
/// * `log_file` - Optional file path; enables daily-rotated JSON file output.
/// * `json_output` - JSON console output instead of pretty-printed.
///
/// # Defaults
///
/// - Level: `info` for this crate, `warn` for dependencies
/// - Format: Pretty-printed with colors and timestamps
/// - Output: Console only
///
/// Returns the file appender's worker guard when file logging is enabled.
/// Dropping it stops the background writer, so hold it for the process
/// lifetime.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created or a global
/// subscriber is already installed.
pub fn init_tracing(
    log_level: Option<String>,
    log_file: Option<PathBuf>,
    json_output: bool,
) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error>> {
    let env_filter = if let Ok(filter) = std::env::var("RUST_LOG") {
        EnvFilter::new(filter)
    } else if let Some(level) = log_level {
        EnvFilter::new(level)
    } else {
        EnvFilter::new("eth_consistency_canary=info,warn")
    };

    let console_layer = if json_output {
        tfmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    } else {
        tfmt::layer()
            .pretty()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(ref path) = log_file {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file_appender = tracing_appender::rolling::daily(
            path.parent().unwrap_or_else(|| Path::new(".")),
            path.file_name().unwrap_or_else(|| OsStr::new("canary.log")),
        );
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        // File always uses JSON for structured log analysis
        let layer = tfmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    info!(
        json_output,
        file_logging = log_file.is_some(),
        "Tracing initialized successfully"
    );

    Ok(guard)
}

/// Compact display of a hash: `0x` plus the first 8 hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortHash(pub B256);

impl fmt::Display for ShortHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for byte in &self.0[..4] {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Kind of a reconciliation lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileEventKind {
    /// A header arrived and reconciliation started
    NewHead,
    /// The header did not advance past the previous one
    ApparentReorg,
    /// An attempt found inconsistent receipts
    InconsistentBlock,
    /// The block was accepted
    BlockOk,
    /// The attempt budget ran out
    Exhausted,
    /// A transport or persistence failure ended the reconciliation
    Failed,
}

impl ReconcileEventKind {
    /// Stable name used as the `event` field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NewHead => "new_head",
            Self::ApparentReorg => "apparent_reorg",
            Self::InconsistentBlock => "inconsistent_block",
            Self::BlockOk => "block_ok",
            Self::Exhausted => "reconcile_exhausted",
            Self::Failed => "reconcile_failed",
        }
    }
}

impl fmt::Display for ReconcileEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured record of one reconciliation lifecycle event.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileEvent {
    /// What happened
    pub kind: ReconcileEventKind,
    /// Reconciliation run id
    pub run_id: u64,
    /// Header being reconciled
    pub header: HeaderEvent,
    /// Attempt ordinal, if the event belongs to an attempt
    pub attempt: Option<u32>,
    /// Fetched block number and hash, if a block was fetched
    pub block: Option<(u64, B256)>,
    /// Inconsistent pairs on this attempt
    pub inconsistent: usize,
    /// Time since the reconciliation started
    pub elapsed: Option<Duration>,
    /// Free-form detail (evidence path, error text)
    pub detail: Option<String>,
}

impl ReconcileEvent {
    /// Start an event for `header` in run `run_id`.
    #[must_use]
    pub const fn new(kind: ReconcileEventKind, run_id: u64, header: HeaderEvent) -> Self {
        Self {
            kind,
            run_id,
            header,
            attempt: None,
            block: None,
            inconsistent: 0,
            elapsed: None,
            detail: None,
        }
    }

    /// Attach the attempt ordinal.
    #[must_use]
    pub const fn attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    /// Attach the fetched block's identity.
    #[must_use]
    pub const fn block(mut self, number: u64, hash: B256) -> Self {
        self.block = Some((number, hash));
        self
    }

    /// Attach the inconsistent pair count.
    #[must_use]
    pub const fn inconsistent(mut self, count: usize) -> Self {
        self.inconsistent = count;
        self
    }

    /// Attach the elapsed time.
    #[must_use]
    pub const fn elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = Some(elapsed);
        self
    }

    /// Attach free-form detail.
    #[must_use]
    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Seconds between the header's timestamp and now.
    #[must_use]
    pub fn header_age_secs(&self) -> i64 {
        self.header
            .date()
            .map_or(0, |date| (Utc::now() - date).num_seconds())
    }

    /// Emit the event through `tracing` at the level matching its kind.
    pub fn emit(&self) {
        let event = self.kind.as_str();
        let block = self.header.number;
        let hash = ShortHash(self.header.hash).to_string();
        let parent = ShortHash(self.header.parent_hash).to_string();
        let header_date = self.header.date().map(|d| d.to_rfc3339()).unwrap_or_default();
        let age_secs = self.header_age_secs();
        let attempt = self.attempt.unwrap_or(0);
        let fetched_block = self.block.map_or(0, |(n, _)| n);
        let fetched_hash = self
            .block
            .map(|(_, h)| ShortHash(h).to_string())
            .unwrap_or_default();
        let elapsed_ms = self.elapsed.map_or(0, |e| e.as_millis() as u64);
        let detail = self.detail.as_deref().unwrap_or("");

        macro_rules! emit_at {
            ($level:ident, $msg:literal) => {
                $level!(
                    event,
                    run_id = self.run_id,
                    block,
                    hash = %hash,
                    parent_hash = %parent,
                    header_date = %header_date,
                    age_secs,
                    attempt,
                    fetched_block,
                    fetched_hash = %fetched_hash,
                    inconsistent = self.inconsistent,
                    elapsed_ms,
                    detail,
                    $msg
                )
            };
        }

        match self.kind {
            ReconcileEventKind::NewHead => emit_at!(info, "new block"),
            ReconcileEventKind::BlockOk => emit_at!(info, "block ok"),
            ReconcileEventKind::ApparentReorg => emit_at!(warn, "header did not advance"),
            ReconcileEventKind::InconsistentBlock => emit_at!(warn, "inconsistent block data"),
            ReconcileEventKind::Exhausted => {
                emit_at!(error, "failed to get consistent block data")
            }
            ReconcileEventKind::Failed => emit_at!(error, "reconciliation failed"),
        }
    }
}

/// Initialize tracing for tests; output goes to the test harness.
#[cfg(test)]
pub fn init_test_tracing() {
    use tracing_subscriber::fmt::format::FmtSpan;

    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .with_span_events(FmtSpan::CLOSE)
        .pretty()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::b256;

    #[test]
    fn test_short_hash() {
        let hash = b256!("0xdeadbeef00000000000000000000000000000000000000000000000000000001");
        assert_eq!(ShortHash(hash).to_string(), "0xdeadbeef");
    }

    #[test]
    fn test_event_kind_names() {
        assert_eq!(ReconcileEventKind::BlockOk.as_str(), "block_ok");
        assert_eq!(ReconcileEventKind::Exhausted.to_string(), "reconcile_exhausted");
    }

    #[test]
    fn test_event_builder_and_emit() {
        init_test_tracing();
        let header = HeaderEvent::new(100, B256::repeat_byte(0xaa), B256::ZERO, 1_700_000_000);

        let event = ReconcileEvent::new(ReconcileEventKind::InconsistentBlock, 3, header)
            .attempt(2)
            .block(100, B256::repeat_byte(0xaa))
            .inconsistent(1)
            .elapsed(Duration::from_millis(800))
            .detail("reorgs/block-100/attempt-002.json");

        assert_eq!(event.attempt, Some(2));
        assert_eq!(event.inconsistent, 1);
        assert!(event.header_age_secs() > 0);
        event.emit();
    }

    #[test]
    fn test_init_tracing_twice_fails_cleanly() {
        init_test_tracing();
        // A global subscriber is already installed by the test helper
        assert!(init_tracing(None, None, false).is_err());
    }
}
