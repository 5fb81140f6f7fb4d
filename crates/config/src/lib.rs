//! Peerwire Configuration Module
//!
//! This module provides network constants and the TOML-backed configuration
//! types for the peerwire client.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default peer-to-peer port on the main network
pub const DEFAULT_PORT: u16 = 8333;
pub const DEFAULT_TESTNET_PORT: u16 = 18333;
pub const DEFAULT_REGTEST_PORT: u16 = 18444;

/// Protocol version advertised in our `version` message
pub const PROTOCOL_VERSION: u32 = 31900;
/// Peers advertising a lower version are disconnected during the handshake
pub const MIN_PROTOCOL_VERSION: u32 = 31900;

/// Session limits
pub const MAX_IN_FLIGHT: usize = 8;
pub const REQUEST_TIMEOUT_MILLIS: u64 = 1500;
pub const HANDSHAKE_TIMEOUT_SECS: u64 = 10;
pub const READ_CHUNK_SIZE: usize = 4096;
pub const MAX_MESSAGE_SIZE: usize = 0x02000000; // 32MB

/// Request tracker limits
pub const MAX_REQUEST_ATTEMPTS: usize = 3;

pub const USER_AGENT: &str = concat!("/peerwire:", env!("CARGO_PKG_VERSION"), "/");

/// Bootstrap peers used when nothing else is configured
pub const DEFAULT_PEERS: &[&str] = &[
    "184.106.111.41",
    "240.1.1.1", // Unallocated by IANA, never answers
];

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Network type, selects the wire magic and default port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    #[default]
    MainNet,
    TestNet,
    Regtest,
}

impl NetworkType {
    /// Gets the network magic number (the message start marker, little endian)
    pub fn magic(&self) -> u32 {
        match self {
            NetworkType::MainNet => 0xD9B4BEF9, // f9 be b4 d9 on the wire
            NetworkType::TestNet => 0x0709110B,
            NetworkType::Regtest => 0xDAB5BFFA,
        }
    }

    /// Gets the default peer-to-peer port
    pub fn default_port(&self) -> u16 {
        match self {
            NetworkType::MainNet => DEFAULT_PORT,
            NetworkType::TestNet => DEFAULT_TESTNET_PORT,
            NetworkType::Regtest => DEFAULT_REGTEST_PORT,
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkType::MainNet => write!(f, "mainnet"),
            NetworkType::TestNet => write!(f, "testnet"),
            NetworkType::Regtest => write!(f, "regtest"),
        }
    }
}

impl FromStr for NetworkType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" => Ok(NetworkType::MainNet),
            "testnet" | "test" => Ok(NetworkType::TestNet),
            "regtest" => Ok(NetworkType::Regtest),
            _ => Err(format!("Unknown network type: {}", s)),
        }
    }
}

/// Complete node configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Network selection and bootstrap peers
    pub network: NetworkSettings,
    /// Per-session protocol limits
    pub session: SessionSettings,
    /// Logging output
    pub logging: LoggingSettings,
}

impl NodeConfig {
    /// Loads and validates a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parses and validates a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: NodeConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let session = &self.session;
        if session.max_in_flight == 0 {
            return Err(ConfigError::Invalid(
                "session.max_in_flight must be greater than 0".to_string(),
            ));
        }
        if session.request_timeout_millis == 0 {
            return Err(ConfigError::Invalid(
                "session.request_timeout_millis must be greater than 0".to_string(),
            ));
        }
        if session.handshake_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "session.handshake_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if session.read_chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "session.read_chunk_size must be greater than 0".to_string(),
            ));
        }
        if session.max_message_size == 0 || session.max_message_size > u32::MAX as usize {
            return Err(ConfigError::Invalid(format!(
                "session.max_message_size must be within 1..={}",
                u32::MAX
            )));
        }
        if session.min_protocol_version > session.protocol_version {
            return Err(ConfigError::Invalid(format!(
                "session.min_protocol_version {} exceeds protocol_version {}",
                session.min_protocol_version, session.protocol_version
            )));
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(ConfigError::Invalid(format!(
                "logging.format must be \"pretty\" or \"json\", got {:?}",
                self.logging.format
            )));
        }
        Ok(())
    }
}

/// Network configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub network: NetworkType,
    /// Peers to connect to at startup, `ip` or `ip:port`
    pub peers: Vec<String>,
    pub user_agent: String,
    /// Service bits advertised in our version message
    pub services: u64,
    /// Best block height advertised in our version message
    pub start_height: i32,
    /// Penalised failures after which a pending request is abandoned
    pub max_request_attempts: usize,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            network: NetworkType::MainNet,
            peers: DEFAULT_PEERS.iter().map(|&peer| peer.to_string()).collect(),
            user_agent: USER_AGENT.to_string(),
            services: 1,
            start_height: 0,
            max_request_attempts: MAX_REQUEST_ATTEMPTS,
        }
    }
}

/// Session protocol settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub protocol_version: u32,
    pub min_protocol_version: u32,
    pub max_in_flight: usize,
    pub request_timeout_millis: u64,
    pub handshake_timeout_secs: u64,
    pub read_chunk_size: usize,
    pub max_message_size: usize,
}

impl SessionSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_millis)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            min_protocol_version: MIN_PROTOCOL_VERSION,
            max_in_flight: MAX_IN_FLIGHT,
            request_timeout_millis: REQUEST_TIMEOUT_MILLIS,
            handshake_timeout_secs: HANDSHAKE_TIMEOUT_SECS,
            read_chunk_size: READ_CHUNK_SIZE,
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
