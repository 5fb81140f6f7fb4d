//! Non-blocking byte transport under a session.

use std::io;
use std::net::{Shutdown, SocketAddr};

use socket2::SockRef;
use tokio::net::TcpStream;

/// Non-blocking stream as seen by a session.
///
/// Reads and writes never wait: they move whatever the transport accepts
/// right now and report [`io::ErrorKind::WouldBlock`] otherwise.
pub trait Transport {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Remote endpoint; fails while the connection is not established
    fn peer_addr(&self) -> io::Result<SocketAddr>;

    /// Pending socket error, e.g. a refused connect
    fn take_error(&self) -> io::Result<Option<io::Error>>;

    /// Shuts down both directions
    fn shutdown(&mut self) -> io::Result<()>;
}

impl Transport for TcpStream {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        TcpStream::try_read(self, buf)
    }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        TcpStream::try_write(self, buf)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::peer_addr(self)
    }

    fn take_error(&self) -> io::Result<Option<io::Error>> {
        TcpStream::take_error(self)
    }

    fn shutdown(&mut self) -> io::Result<()> {
        SockRef::from(&*self).shutdown(Shutdown::Both)
    }
}
