//! Node configuration: the TOML file plus command line overrides.

use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, Result};
use peerwire_config::{NetworkType, NodeConfig};
use peerwire_network::parse_peer_address;

/// Settings given on the command line; they win over the config file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub network: Option<NetworkType>,
    /// Replaces the configured peers when non-empty
    pub peers: Vec<String>,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
}

/// Loads the config file if one was given, otherwise starts from defaults.
pub fn load(path: Option<&Path>) -> Result<NodeConfig> {
    match path {
        Some(path) => NodeConfig::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display())),
        None => Ok(NodeConfig::default()),
    }
}

pub fn apply_overrides(mut config: NodeConfig, overrides: Overrides) -> Result<NodeConfig> {
    if let Some(network) = overrides.network {
        config.network.network = network;
    }
    if !overrides.peers.is_empty() {
        config.network.peers = overrides.peers;
    }
    if let Some(level) = overrides.log_level {
        config.logging.level = level;
    }
    if let Some(format) = overrides.log_format {
        config.logging.format = format.to_ascii_lowercase();
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Resolves the configured peers; bare IPs get the network's default port.
pub fn resolve_peers(config: &NodeConfig) -> Result<Vec<SocketAddr>> {
    let default_port = config.network.network.default_port();
    config
        .network
        .peers
        .iter()
        .map(|peer| parse_peer_address(peer, default_port).context("invalid peer in configuration"))
        .collect()
}
