//! Version handshake payload and the network address record it embeds.

use std::net::{IpAddr, Ipv6Addr, SocketAddr};

use bytes::BufMut;

use super::io::{put_var_str, PayloadReader};
use crate::error::CodecError;

/// Size of a serialized network address (services, IPv6 address, port)
pub const NET_ADDRESS_SIZE: usize = 8 + 16 + 2;

/// Network address as carried in `version` and `addr` messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetAddress {
    /// Service bits of the node at this address
    pub services: u64,
    pub ip: IpAddr,
    pub port: u16,
}

impl NetAddress {
    pub fn new(services: u64, address: SocketAddr) -> Self {
        Self {
            services,
            ip: address.ip(),
            port: address.port(),
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    pub(crate) fn encode<B: BufMut>(&self, dst: &mut B) {
        dst.put_u64_le(self.services);
        let ip = match self.ip {
            IpAddr::V4(v4) => v4.to_ipv6_mapped(),
            IpAddr::V6(v6) => v6,
        };
        dst.put_slice(&ip.octets());
        // Port is the one big-endian field of the protocol
        dst.put_u16(self.port);
    }

    pub(crate) fn decode(reader: &mut PayloadReader<'_>) -> Result<Self, CodecError> {
        let services = reader.read_u64()?;
        let ip = Ipv6Addr::from(reader.read_array::<16>()?);
        let ip = match ip.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(ip),
        };
        let port = reader.read_u16_be()?;
        Ok(Self { services, ip, port })
    }
}

/// Version payload for the handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionPayload {
    /// Protocol version of the sender
    pub version: u32,
    /// Service bits of the sender
    pub services: u64,
    /// Sender's clock, unix seconds
    pub timestamp: i64,
    /// Address of the receiving node as seen by the sender
    pub receiver: NetAddress,
    /// Address of the sending node
    pub sender: NetAddress,
    /// Random number used to detect connections to self
    pub nonce: u64,
    /// String used to identify the client software
    pub user_agent: String,
    /// Best block height known to the sender
    pub start_height: i32,
}

impl VersionPayload {
    pub(crate) fn encode<B: BufMut>(&self, dst: &mut B) {
        dst.put_u32_le(self.version);
        dst.put_u64_le(self.services);
        dst.put_i64_le(self.timestamp);
        self.receiver.encode(dst);
        self.sender.encode(dst);
        dst.put_u64_le(self.nonce);
        put_var_str(dst, &self.user_agent);
        dst.put_i32_le(self.start_height);
    }

    /// Decodes a version body.
    ///
    /// Very old peers stop after the sender address, so the remaining fields
    /// default when absent; bytes after `start_height` (later protocol
    /// extensions such as the relay flag) are ignored.
    pub(crate) fn decode(reader: &mut PayloadReader<'_>) -> Result<Self, CodecError> {
        let version = reader.read_u32()?;
        let services = reader.read_u64()?;
        let timestamp = reader.read_i64()?;
        let receiver = NetAddress::decode(reader)?;
        let sender = NetAddress::decode(reader)?;

        let mut payload = Self {
            version,
            services,
            timestamp,
            receiver,
            sender,
            nonce: 0,
            user_agent: String::new(),
            start_height: 0,
        };
        if reader.is_empty() {
            return Ok(payload);
        }
        payload.nonce = reader.read_u64()?;
        payload.user_agent = reader.read_var_str()?;
        payload.start_height = reader.read_i32()?;
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn sample_version() -> VersionPayload {
        VersionPayload {
            version: 31900,
            services: 1,
            timestamp: 1_700_000_000,
            receiver: NetAddress::new(1, "184.106.111.41:8333".parse().unwrap()),
            sender: NetAddress::new(1, "[2001:db8::1]:8333".parse().unwrap()),
            nonce: 42,
            user_agent: "/peerwire:test/".to_string(),
            start_height: 100,
        }
    }

    #[test]
    fn test_net_address_layout() {
        let address = NetAddress::new(1, SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 8333));
        let mut buf = Vec::new();
        address.encode(&mut buf);

        assert_eq!(buf.len(), NET_ADDRESS_SIZE);
        assert_eq!(&buf[8..20], &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff]);
        assert_eq!(&buf[20..24], &[10, 0, 0, 1]);
        assert_eq!(&buf[24..], &[0x20, 0x8d]);

        let decoded = NetAddress::decode(&mut PayloadReader::new(&buf)).unwrap();
        assert_eq!(decoded, address);
    }

    #[test]
    fn test_version_payload() {
        let version = sample_version();
        let mut buf = Vec::new();
        version.encode(&mut buf);

        let decoded = VersionPayload::decode(&mut PayloadReader::new(&buf)).unwrap();
        assert_eq!(decoded, version);
    }

    #[test]
    fn test_short_version_payload() {
        let version = sample_version();
        let mut buf = Vec::new();
        version.encode(&mut buf);
        buf.truncate(4 + 8 + 8 + 2 * NET_ADDRESS_SIZE);

        let decoded = VersionPayload::decode(&mut PayloadReader::new(&buf)).unwrap();
        assert_eq!(decoded.version, 31900);
        assert_eq!(decoded.nonce, 0);
        assert!(decoded.user_agent.is_empty());
    }

    #[test]
    fn test_version_payload_truncated_in_address() {
        let mut buf = Vec::new();
        sample_version().encode(&mut buf);
        buf.truncate(30);
        assert!(matches!(
            VersionPayload::decode(&mut PayloadReader::new(&buf)),
            Err(CodecError::Truncated { .. })
        ));
    }
}
