//! xdomain-watcher - follow cross-domain messages from one rollup layer to the other
//!
//! Takes origin transactions (already submitted hashes or raw signed
//! transactions to broadcast), waits for each to be mined, and prints the
//! destination transaction that relayed its message as one JSON line.

use anyhow::{bail, Context, Result};
use clap::Parser;
use ethers::types::{Bytes, H256};
use futures::future::join_all;
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

use xdomain_watcher::chain::ChainManager;
use xdomain_watcher::config::Settings;
use xdomain_watcher::metrics::MetricsServer;
use xdomain_watcher::{CorrelatedPair, CrossDomainCorrelator, Direction, Layer, MessageSelector};

#[derive(Debug, Parser)]
#[command(name = "xdomain-watcher", version, about)]
struct Cli {
    /// Origin transaction hashes to follow
    #[arg(value_name = "TX_HASH")]
    tx_hashes: Vec<H256>,

    /// Raw signed origin transactions to broadcast and follow
    #[arg(long = "raw", value_name = "HEX")]
    raw_transactions: Vec<Bytes>,

    /// Message direction: l1-to-l2 (deposit) or l2-to-l1 (withdrawal)
    #[arg(short, long, default_value = "l1-to-l2")]
    direction: Direction,

    /// Follow the message at this position instead of the first one
    #[arg(long, conflicts_with = "all")]
    index: Option<usize>,

    /// Follow every message the origin transaction emitted
    #[arg(long)]
    all: bool,

    /// Override the configured deadline, in seconds
    #[arg(long)]
    deadline_secs: Option<u64>,

    /// Configuration file
    #[arg(short, long, env = "XDOMAIN_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

enum Submission {
    Hash(H256),
    Raw(Bytes),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.json_logs);

    info!("Starting xdomain-watcher v{}", env!("CARGO_PKG_VERSION"));

    if cli.tx_hashes.is_empty() && cli.raw_transactions.is_empty() {
        bail!("Nothing to follow: pass origin transaction hashes or --raw transactions");
    }

    // Load configuration
    let settings = Settings::load(cli.config.as_deref())?;
    info!(
        "Loaded configuration for chains {} ({}) and {} ({})",
        settings.l1.name, settings.l1.chain_id, settings.l2.name, settings.l2.chain_id
    );

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {:#}", e);
            }
        }))
    } else {
        None
    };

    // Initialize chain manager (handles both chain connections)
    let chain_manager = ChainManager::connect(&settings)
        .await
        .context("Failed to connect to the chain pair")?;
    for (chain_id, healthy) in chain_manager.health_check().await {
        if !healthy {
            warn!("Chain {} is not answering, correlations may time out", chain_id);
        }
    }

    let mut correlator = CrossDomainCorrelator::new(
        chain_manager.endpoint(Layer::L1),
        chain_manager.endpoint(Layer::L2),
        settings.correlator.clone(),
        settings.schema.clone(),
    )?;
    if let Some(secs) = cli.deadline_secs {
        correlator = correlator.with_deadline(Duration::from_secs(secs))?;
    }

    let direction = cli.direction;
    let origin = chain_manager.provider(direction.origin()).clone();
    let selector = cli.index.map(MessageSelector::Index).unwrap_or_default();
    let follow_all = cli.all;

    let submissions = cli
        .tx_hashes
        .into_iter()
        .map(Submission::Hash)
        .chain(cli.raw_transactions.into_iter().map(Submission::Raw));

    let correlations = submissions.map(|submission| {
        let correlator = &correlator;
        let origin = origin.clone();
        async move {
            let submitted = async move {
                match submission {
                    Submission::Hash(tx_hash) => Ok(tx_hash),
                    Submission::Raw(raw) => origin.send_raw_transaction(raw).await,
                }
            };
            if follow_all {
                correlator
                    .wait_for_all_relayed_transactions(submitted, direction)
                    .await
            } else {
                correlator
                    .wait_for_relayed_transaction_with(submitted, direction, selector)
                    .await
                    .map(|pair| vec![pair])
            }
        }
    });

    let results = tokio::select! {
        results = join_all(correlations) => results,
        _ = shutdown_signal() => {
            info!("Shutdown signal received, abandoning pending correlations");
            Vec::new()
        }
    };

    if let Some(h) = metrics_handle {
        h.abort();
    }

    if results.is_empty() {
        bail!("Interrupted before any correlation finished");
    }

    let mut failed = 0;
    for result in results {
        match result {
            Ok(pairs) => {
                for pair in pairs {
                    print_pair(&pair)?;
                }
            }
            Err(e) => {
                failed += 1;
                error!("Correlation failed: {}", e);
            }
        }
    }

    if failed > 0 {
        bail!("{} correlation(s) failed", failed);
    }
    Ok(())
}

fn print_pair(pair: &CorrelatedPair) -> Result<()> {
    let line = serde_json::to_string(pair).context("Failed to serialize correlated pair")?;
    println!("{}", line);
    Ok(())
}

fn init_logging(json: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,xdomain_watcher=debug,hyper=warn"));

    // Logs go to stderr; stdout carries the correlated pairs
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
