//! CLI entry point for the consistency canary.
//!
//! ```text
//! main.rs (runtime + tracing)
//!     ↓
//! CLI Layer (src/cli.rs)
//!     ↓
//! 1. Config      → environment + flags
//! 2. RPC         → HTTP provider, WebSocket subscription
//! 3. Watch       → one reconciliation per header
//! 4. Reconcile   → fetch, check, record evidence, retry
//! ```

use eth_consistency_canary::{cli, observability};
use tracing::error;

#[tokio::main]
async fn main() {
    // RUST_LOG, LOG_FILE and LOG_JSON control output, e.g.
    //   RUST_LOG=eth_consistency_canary=debug cargo run -- watch
    //   LOG_JSON=true LOG_FILE=./logs/canary.log cargo run -- watch
    let log_level = std::env::var("RUST_LOG").ok();
    let log_file = std::env::var("LOG_FILE").ok().map(std::path::PathBuf::from);
    let json_output = std::env::var("LOG_JSON")
        .unwrap_or_else(|_| "false".to_string())
        .parse::<bool>()
        .unwrap_or(false);

    // Flushes the file writer on drop
    let guard = match observability::init_tracing(log_level, log_file, json_output) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize tracing: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = cli::run().await {
        error!(error = %e, "Canary stopped");
        eprintln!("Error: {e}");
        drop(guard);
        std::process::exit(1);
    }
}
