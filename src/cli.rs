//! Command-line interface for the consistency canary.
//!
//! # Commands
//!
//! - `watch`: Subscribe to new heads and reconcile every block until stopped
//! - `check`: Reconcile a single block once
//!
//! # Example
//!
//! ```bash
//! # Watch a local node
//! eth-consistency-canary watch
//!
//! # Check one block against a remote node, three attempts at most
//! eth-consistency-canary --rpc-http-url https://node.example --max-attempts 3 \
//!     check --block 19000000
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use alloy::eips::BlockNumberOrTag;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{error, info};

use crate::config::Config;
use crate::error::{CanaryError, CanaryResult};
use crate::evidence::EvidenceStore;
use crate::fetcher::fetch_block;
use crate::reconcile::{ReconcileOutcome, Reconciler};
use crate::reorg::HeadTracker;
use crate::rpc::{create_provider, HttpChainSource, ReconnectingWebSocket};
use crate::watch::{watch, WatchSummary};

/// Ethereum node consistency canary
#[derive(Parser, Debug)]
#[command(name = "eth-consistency-canary")]
#[command(
    about = "Checks that a node serves matching block and receipt data for every new head",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// JSON-RPC HTTP endpoint (overrides RPC_HTTP_URL)
    #[arg(long, global = true)]
    rpc_http_url: Option<String>,

    /// JSON-RPC WebSocket endpoint (overrides RPC_WS_URL)
    #[arg(long, global = true)]
    rpc_ws_url: Option<String>,

    /// Directory for evidence records (overrides EVIDENCE_DIR)
    #[arg(long, global = true)]
    evidence_dir: Option<PathBuf>,

    /// Fetch attempts per header (overrides MAX_ATTEMPTS)
    #[arg(long, global = true)]
    max_attempts: Option<u32>,

    /// Delay between attempts in milliseconds (overrides RETRY_DELAY_MS)
    #[arg(long, global = true)]
    retry_delay_ms: Option<u64>,

    /// Do not seed the head tracker from the latest block at startup
    #[arg(long, global = true)]
    no_baseline: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconcile every new head until interrupted
    Watch,

    /// Reconcile one block
    Check {
        /// Block number, or "latest"
        #[arg(short, long, default_value = "latest", value_parser = parse_block_target)]
        block: BlockNumberOrTag,
    },
}

fn parse_block_target(value: &str) -> Result<BlockNumberOrTag, String> {
    if value.eq_ignore_ascii_case("latest") {
        return Ok(BlockNumberOrTag::Latest);
    }

    let number = match value.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse::<u64>(),
    };
    number
        .map(BlockNumberOrTag::Number)
        .map_err(|e| format!("expected a block number or 'latest', got '{value}': {e}"))
}

impl Cli {
    fn config(&self) -> CanaryResult<Config> {
        Config::load_env()?
            .with_http_url(self.rpc_http_url.clone())
            .with_ws_url(self.rpc_ws_url.clone())
            .with_max_attempts(self.max_attempts)
            .with_evidence_dir(self.evidence_dir.clone())
            .with_retry_delay(self.retry_delay_ms.map(Duration::from_millis))
            .without_baseline(self.no_baseline)
            .validated()
    }
}

/// Parse CLI arguments and execute the appropriate command.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration loading fails
/// - The node cannot be reached
/// - A block never becomes consistent within the attempt budget
/// - The head subscription ends
pub async fn run() -> CanaryResult<()> {
    let cli = Cli::parse();
    let config = cli.config()?;

    print_banner(&config);

    let provider = create_provider(config.http_url()).await?;
    let reconciler = Arc::new(Reconciler::new(
        HttpChainSource::new(provider),
        EvidenceStore::new(config.evidence_dir()),
        config.retry_policy(),
    ));

    match cli.command {
        Commands::Watch => run_watch_command(&config, reconciler).await,
        Commands::Check { block } => run_check_command(&reconciler, block).await,
    }
}

/// Execute the watch command (runs until Ctrl-C or failure).
async fn run_watch_command(
    config: &Config,
    reconciler: Arc<Reconciler<HttpChainSource>>,
) -> CanaryResult<()> {
    let tracker = if config.seed_baseline() {
        HeadTracker::seed(reconciler.source()).await?
    } else {
        HeadTracker::new()
    };

    let ws = ReconnectingWebSocket::new(config.ws_url().to_string())
        .connect()
        .await?;
    let heads = ws.subscribe_heads().await?;

    println!("{}", "🔍 Watching for new heads...".cyan().bold());
    println!();

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C, running until failure");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
        println!();
        println!("{}", "🛑 Shutting down, finishing in-flight blocks...".yellow().bold());
    };

    match watch(reconciler, tracker, heads, shutdown).await {
        Ok(summary) => {
            print_summary(&summary);
            println!("{}", "👋 Shutdown complete".green().bold());
            Ok(())
        }
        Err(e) => {
            print_failure(&e);
            Err(e)
        }
    }
}

/// Execute the check command (one reconciliation).
async fn run_check_command(
    reconciler: &Reconciler<HttpChainSource>,
    target: BlockNumberOrTag,
) -> CanaryResult<()> {
    let header = fetch_block(reconciler.source(), target).await?.header_event();
    let observation = HeadTracker::new().observe(header);

    match reconciler.reconcile(0, header, observation).await {
        Ok(outcome) => {
            print_outcome(&outcome);
            Ok(())
        }
        Err(e) => {
            print_failure(&e);
            Err(e)
        }
    }
}

fn print_banner(config: &Config) {
    println!(
        "{} HTTP: {} | WS: {} | evidence: {}",
        "⛓".cyan(),
        config.http_url().blue(),
        config.ws_url().blue(),
        config.evidence_dir().display().to_string().magenta()
    );
    println!(
        "{} max attempts: {} | retry delay: {:?}",
        "⚙".cyan(),
        config.max_attempts().to_string().yellow(),
        config.retry_delay()
    );
}

fn print_outcome(outcome: &ReconcileOutcome) {
    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    let status = if outcome.attempts > 1 {
        format!("consistent after {} attempts", outcome.attempts)
            .yellow()
            .bold()
    } else {
        "consistent".green().bold()
    };

    println!(
        "{} {} Block: {} | Hash: {} | {} | evidence records: {} | {:?}",
        "✅".green(),
        timestamp.to_string().dimmed(),
        outcome.header.number.to_string().yellow(),
        outcome.block_hash,
        status,
        outcome.evidence.len(),
        outcome.elapsed
    );
}

fn print_summary(summary: &WatchSummary) {
    println!(
        "{} headers: {} | accepted: {} | retried: {} | apparent reorgs: {}",
        "📊".cyan(),
        summary.headers.to_string().yellow(),
        summary.accepted.to_string().green(),
        summary.retried.to_string().yellow(),
        summary.apparent_reorgs.to_string().red()
    );
}

fn print_failure(err: &CanaryError) {
    match err.exhaustion_report() {
        Some(report) => println!(
            "{} Block {} never became consistent after {} attempts; see evidence records",
            "❌".red(),
            report.header.number.to_string().yellow(),
            report.attempts
        ),
        None => println!("{} {}", "⚠️  Error:".red().bold(), err),
    }
}
