//! Peerwire network layer.
//!
//! Drives outbound peer sessions over a single-threaded event loop: stream
//! framing, the version/verack handshake, inventory request tracking with
//! timeout-driven re-requests, and the timer queue that ties them together.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use peerwire_config::{NetworkType, NodeConfig};

pub mod error;
pub mod event_loop;
pub mod framer;
pub mod messages;
pub mod registry;
pub mod session;
pub mod storage;
pub mod testing;
pub mod timer;
pub mod tracker;
pub mod transport;

pub use error::{CodecError, FrameError, NetworkError, NetworkResult};
pub use event_loop::EventLoop;
pub use framer::Framer;
pub use messages::{
    Hash256, InventoryType, InventoryVector, Message, MessageCodec, MessageCommand, WireCodec,
};
pub use registry::{SessionId, SessionRegistry};
pub use session::{Session, SessionContext, SessionState, SessionStatus, SessionTimer};
pub use storage::{MemoryStorage, Storage};
pub use timer::{TimerEntry, TimerHandle, TimerQueue};
pub use tracker::{Priority, RequestFailure, RequestQueue, RequestTracker, SharedTracker};
pub use transport::Transport;

/// Runtime parameters shared by every session of an event loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Message start marker of the network
    pub magic: u32,
    /// Version advertised in our `version` message
    pub protocol_version: u32,
    /// Peers advertising an older version are disconnected
    pub min_protocol_version: u32,
    pub services: u64,
    pub user_agent: String,
    pub start_height: i32,
    /// Upper bound on concurrently requested items per session
    pub max_in_flight: usize,
    /// Delay before an unanswered `getdata` is re-queued
    pub request_timeout: Duration,
    /// Time allowed to reach the Active state
    pub handshake_timeout: Duration,
    pub read_chunk_size: usize,
    pub max_message_size: usize,
}

impl SessionConfig {
    pub fn from_node_config(config: &NodeConfig) -> Self {
        let session = &config.session;
        Self {
            magic: config.network.network.magic(),
            protocol_version: session.protocol_version,
            min_protocol_version: session.min_protocol_version,
            services: config.network.services,
            user_agent: config.network.user_agent.clone(),
            start_height: config.network.start_height,
            max_in_flight: session.max_in_flight,
            request_timeout: session.request_timeout(),
            handshake_timeout: session.handshake_timeout(),
            read_chunk_size: session.read_chunk_size,
            max_message_size: session.max_message_size,
        }
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn framer(&self) -> Framer {
        Framer::new(self.magic, self.max_message_size)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_node_config(&NodeConfig::default())
    }
}

impl From<&NodeConfig> for SessionConfig {
    fn from(config: &NodeConfig) -> Self {
        Self::from_node_config(config)
    }
}

/// Default configuration for `network`
pub fn session_config_for(network: NetworkType) -> SessionConfig {
    let mut config = NodeConfig::default();
    config.network.network = network;
    SessionConfig::from_node_config(&config)
}

/// Parses `ip` or `ip:port`; a bare IP gets `default_port`.
pub fn parse_peer_address(peer: &str, default_port: u16) -> NetworkResult<SocketAddr> {
    let peer = peer.trim();
    if let Ok(address) = peer.parse::<SocketAddr>() {
        return Ok(address);
    }
    peer.parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, default_port))
        .map_err(|_| NetworkError::InvalidPeer(peer.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use peerwire_config::{MAX_IN_FLIGHT, MIN_PROTOCOL_VERSION};

    #[test]
    fn test_default_session_config() {
        let config = SessionConfig::default();
        assert_eq!(config.magic, 0xD9B4BEF9);
        assert_eq!(config.min_protocol_version, MIN_PROTOCOL_VERSION);
        assert_eq!(config.max_in_flight, MAX_IN_FLIGHT);
        assert_eq!(config.request_timeout, Duration::from_millis(1500));
    }

    #[test]
    fn test_network_magic() {
        let config = session_config_for(NetworkType::TestNet);
        assert_eq!(config.magic, NetworkType::TestNet.magic());
        assert_eq!(config.framer().magic(), NetworkType::TestNet.magic());
    }

    #[test]
    fn test_parse_peer_address() {
        assert_eq!(
            parse_peer_address("184.106.111.41", 8333).unwrap(),
            "184.106.111.41:8333".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            parse_peer_address(" 10.0.0.1:18333 ", 8333).unwrap(),
            "10.0.0.1:18333".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            parse_peer_address("::1", 8333).unwrap(),
            "[::1]:8333".parse::<SocketAddr>().unwrap()
        );
        assert!(matches!(
            parse_peer_address("seed.example.org", 8333),
            Err(NetworkError::InvalidPeer(peer)) if peer == "seed.example.org"
        ));
    }
}
