//! Peerwire node
//!
//! Connects to a fixed list of peers, completes the version handshake with
//! each, and downloads whatever blocks and transactions they announce. Runs
//! until every session has closed or Ctrl+C is received.
//!
//! Usage:
//!   peerwire-node --network testnet --peer 10.0.0.1 --peer 10.0.0.2:18333

mod config;

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use peerwire_config::{LoggingSettings, NetworkType, NodeConfig};
use peerwire_network::{EventLoop, MemoryStorage, RequestQueue, SessionConfig};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "peerwire-node", about = "Minimal peer-to-peer client", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short = 'c', env = "PEERWIRE_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Network to join (mainnet, testnet, regtest).
    #[arg(long, short = 'n', env = "PEERWIRE_NETWORK", value_name = "NETWORK")]
    network: Option<NetworkType>,

    /// Peer to connect to, `ip` or `ip:port`. Repeatable; replaces the configured peers.
    #[arg(
        long = "peer",
        short = 'p',
        value_delimiter = ',',
        value_name = "ADDR",
        env = "PEERWIRE_PEERS"
    )]
    peers: Vec<String>,

    /// Log level or filter directive; RUST_LOG takes precedence.
    #[arg(long, value_name = "LEVEL", env = "PEERWIRE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log output format (pretty, json).
    #[arg(long, value_name = "FORMAT", env = "PEERWIRE_LOG_FORMAT")]
    log_format: Option<String>,
}

impl Cli {
    fn overrides(&self) -> config::Overrides {
        config::Overrides {
            network: self.network,
            peers: self.peers.clone(),
            log_level: self.log_level.clone(),
            log_format: self.log_format.clone(),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let node_config = config::load(cli.config.as_deref())?;
    let node_config = config::apply_overrides(node_config, cli.overrides())?;
    init_tracing(&node_config.logging)?;

    // Sessions are driven by one cooperative loop; a single thread is enough
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    runtime.block_on(run(node_config))
}

async fn run(node_config: NodeConfig) -> Result<()> {
    let peers = config::resolve_peers(&node_config)?;
    info!(
        target: "peerwire",
        network = %node_config.network.network,
        peers = peers.len(),
        "starting node"
    );

    let tracker = RequestQueue::with_max_attempts(node_config.network.max_request_attempts);
    let mut event_loop = EventLoop::new(
        SessionConfig::from_node_config(&node_config),
        tracker,
        MemoryStorage::new(),
    );

    for peer in peers {
        if let Err(err) = event_loop.connect(peer) {
            warn!(target: "peerwire", %peer, error = %err, "skipping peer");
        }
    }

    let interrupted = tokio::select! {
        result = event_loop.run() => {
            result.context("event loop failed")?;
            false
        }
        _ = signal::ctrl_c() => true,
    };
    if interrupted {
        info!(target: "peerwire", "shutdown signal received (Ctrl+C)");
        event_loop.close_all();
    }

    let storage = event_loop.storage();
    info!(
        target: "peerwire",
        blocks = storage.block_count(),
        transactions = storage.transaction_count(),
        addresses = storage.address_count(),
        pending_requests = event_loop.tracker().pending_len(),
        "node stopped"
    );
    Ok(())
}

fn init_tracing(logging: &LoggingSettings) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&logging.level)
            .with_context(|| format!("invalid log level {:?}", logging.level))?,
    };

    let builder = fmt().with_env_filter(env_filter).with_target(true);
    let result = match logging.format.as_str() {
        "json" => builder.json().try_init(),
        _ => builder.pretty().try_init(),
    };
    result.map_err(|err| anyhow!("failed to initialize logging: {err}"))
}
