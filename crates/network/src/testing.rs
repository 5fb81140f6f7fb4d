//! Scripted in-memory transport for exercising sessions without sockets.

use std::cell::Cell;
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;

use bytes::BytesMut;

use crate::error::FrameError;
use crate::framer::Framer;
use crate::messages::{Message, MessageCodec};
use crate::transport::Transport;

/// Transport that replays queued chunks and records everything written
#[derive(Debug, Default)]
pub struct MockTransport {
    peer: Option<SocketAddr>,
    incoming: VecDeque<Vec<u8>>,
    eof: bool,
    read_error: Option<io::ErrorKind>,
    written: Vec<u8>,
    write_limit: Option<usize>,
    pending_error: Cell<Option<io::ErrorKind>>,
    shutdowns: usize,
}

impl MockTransport {
    /// Connected transport whose remote end is `peer`
    pub fn connected(peer: SocketAddr) -> Self {
        Self {
            peer: Some(peer),
            ..Self::default()
        }
    }

    /// Transport whose connect never completed
    pub fn unconnected() -> Self {
        Self::default()
    }

    /// Queues bytes; each queued chunk is returned by at most one read
    pub fn push_incoming(&mut self, bytes: impl Into<Vec<u8>>) {
        self.incoming.push_back(bytes.into());
    }

    /// Reads return 0 once the queued chunks are consumed
    pub fn close_incoming(&mut self) {
        self.eof = true;
    }

    /// Makes every subsequent read fail with `kind`
    pub fn fail_reads(&mut self, kind: io::ErrorKind) {
        self.read_error = Some(kind);
    }

    /// Accept at most `limit` more bytes before reporting `WouldBlock`
    pub fn set_write_limit(&mut self, limit: Option<usize>) {
        self.write_limit = limit;
    }

    /// Error reported by the next `take_error`
    pub fn set_pending_error(&mut self, kind: io::ErrorKind) {
        self.pending_error.set(Some(kind));
    }

    pub fn written(&self) -> &[u8] {
        &self.written
    }

    pub fn take_written(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.written)
    }

    pub fn shutdown_count(&self) -> usize {
        self.shutdowns
    }

    /// Decodes everything written so far
    pub fn written_messages<C: MessageCodec>(
        &self,
        framer: &Framer<C>,
    ) -> Result<Vec<Message>, FrameError> {
        let mut buf = BytesMut::from(&self.written[..]);
        let mut messages = Vec::new();
        while let Some(message) = framer.decode(&mut buf)? {
            messages.push(message);
        }
        Ok(messages)
    }
}

impl Transport for MockTransport {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(kind) = self.read_error {
            return Err(kind.into());
        }
        let Some(chunk) = self.incoming.front_mut() else {
            return if self.eof {
                Ok(0)
            } else {
                Err(io::ErrorKind::WouldBlock.into())
            };
        };

        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        chunk.drain(..n);
        if chunk.is_empty() {
            self.incoming.pop_front();
        }
        Ok(n)
    }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = match self.write_limit {
            Some(0) => return Err(io::ErrorKind::WouldBlock.into()),
            Some(limit) => {
                let n = limit.min(buf.len());
                self.write_limit = Some(limit - n);
                n
            }
            None => buf.len(),
        };
        self.written.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.peer
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))
    }

    fn take_error(&self) -> io::Result<Option<io::Error>> {
        Ok(self.pending_error.take().map(io::Error::from))
    }

    fn shutdown(&mut self) -> io::Result<()> {
        self.shutdowns += 1;
        if self.peer.is_none() {
            return Err(io::ErrorKind::NotConnected.into());
        }
        Ok(())
    }
}
