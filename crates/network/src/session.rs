//! Per-connection session state machine.
//!
//! A session owns one transport together with its read and write buffers,
//! the handshake state, and the set of inventory items it has requested and
//! not yet seen answered. Every entry point returns a [`SessionStatus`]; once
//! a session reports [`SessionStatus::Closed`] the caller drops it.

use std::collections::HashSet;
use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use bytes::{Buf, BytesMut};
use tracing::{debug, info, trace, warn};

use crate::framer::Framer;
use crate::messages::{
    BlockPayload, InventoryVector, Message, NetAddress, TxPayload, VersionPayload,
};
use crate::registry::SessionId;
use crate::storage::Storage;
use crate::timer::{TimerEntry, TimerHandle, TimerQueue};
use crate::tracker::{Priority, RequestFailure, RequestTracker};
use crate::transport::Transport;
use crate::SessionConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport connect not yet confirmed
    Connecting,
    /// Our version is sent, waiting for the peer's verack
    AwaitingVerack,
    Active,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Connecting => "connecting",
            SessionState::AwaitingVerack => "awaiting-verack",
            SessionState::Active => "active",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Outcome of a session callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum SessionStatus {
    Open,
    Closed,
}

impl SessionStatus {
    pub fn is_closed(&self) -> bool {
        matches!(self, SessionStatus::Closed)
    }
}

/// Timer actions scheduled by sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTimer {
    /// Re-queue the item if it is still in flight
    RequestTimeout(InventoryVector),
    /// Close the session if the handshake has not completed
    HandshakeTimeout,
}

/// Collaborators a session callback may use
pub struct SessionContext<'a> {
    pub tracker: &'a mut dyn RequestTracker,
    pub storage: &'a mut dyn Storage,
    pub timers: &'a mut TimerQueue<SessionTimer>,
    pub now: Instant,
}

impl<'a> SessionContext<'a> {
    pub fn new(
        tracker: &'a mut dyn RequestTracker,
        storage: &'a mut dyn Storage,
        timers: &'a mut TimerQueue<SessionTimer>,
        now: Instant,
    ) -> Self {
        Self {
            tracker,
            storage,
            timers,
            now,
        }
    }
}

pub struct Session<T> {
    id: SessionId,
    transport: T,
    config: Arc<SessionConfig>,
    framer: Framer,
    remote: SocketAddr,
    peer: Option<SocketAddr>,
    state: SessionState,
    read_buf: BytesMut,
    write_buf: BytesMut,
    in_flight: HashSet<InventoryVector>,
    timers: HashSet<TimerHandle>,
    nonce: u64,
    peer_version: Option<VersionPayload>,
}

impl<T: Transport> Session<T> {
    /// Creates a session for a connect in progress to `remote` and arms its
    /// handshake timeout.
    pub fn new(
        id: SessionId,
        transport: T,
        remote: SocketAddr,
        config: Arc<SessionConfig>,
        timers: &mut TimerQueue<SessionTimer>,
        now: Instant,
    ) -> Self {
        let handshake = timers.schedule_after(
            now,
            config.handshake_timeout,
            id,
            SessionTimer::HandshakeTimeout,
        );
        Self {
            id,
            transport,
            framer: config.framer(),
            config,
            remote,
            peer: None,
            state: SessionState::Connecting,
            read_buf: BytesMut::new(),
            write_buf: BytesMut::new(),
            in_flight: HashSet::new(),
            timers: HashSet::from([handshake]),
            nonce: rand::random(),
            peer_version: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Address the session was dialled at
    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    /// Peer endpoint, known once the transport connect completed
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn in_flight(&self) -> &HashSet<InventoryVector> {
        &self.in_flight
    }

    pub fn read_buffered(&self) -> usize {
        self.read_buf.len()
    }

    pub fn write_buffered(&self) -> usize {
        self.write_buf.len()
    }

    /// Timers scheduled by this session that have not fired yet
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Nonce sent in our version message
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// The version message received from the peer, if any
    pub fn peer_version(&self) -> Option<&VersionPayload> {
        self.peer_version.as_ref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Handles read readiness.
    pub fn readable(&mut self, ctx: &mut SessionContext<'_>) -> SessionStatus {
        match self.state {
            SessionState::Closed => return SessionStatus::Closed,
            SessionState::Connecting => {
                if self.establish(ctx).is_closed() {
                    return SessionStatus::Closed;
                }
            }
            SessionState::AwaitingVerack | SessionState::Active => {}
        }

        let start = self.read_buf.len();
        self.read_buf.resize(start + self.config.read_chunk_size, 0);
        let result = self.transport.try_read(&mut self.read_buf[start..]);
        match result {
            Ok(0) => {
                self.read_buf.truncate(start);
                info!(peer = %self.remote, "peer closed the connection");
                self.close(ctx);
                return SessionStatus::Closed;
            }
            Ok(n) => {
                self.read_buf.truncate(start + n);
                trace!(peer = %self.remote, bytes = n, "read");
            }
            Err(err) if is_transient(&err) => {
                self.read_buf.truncate(start);
                return SessionStatus::Open;
            }
            Err(err) => {
                self.read_buf.truncate(start);
                debug!(peer = %self.remote, error = %err, "read failed");
                self.close(ctx);
                return SessionStatus::Closed;
            }
        }

        self.process_messages(ctx)
    }

    /// Handles write readiness by sending as much buffered data as the
    /// transport accepts.
    pub fn writable(&mut self, ctx: &mut SessionContext<'_>) -> SessionStatus {
        match self.state {
            SessionState::Closed => return SessionStatus::Closed,
            SessionState::Connecting => {
                if self.establish(ctx).is_closed() {
                    return SessionStatus::Closed;
                }
            }
            SessionState::AwaitingVerack | SessionState::Active => {}
        }

        while !self.write_buf.is_empty() {
            match self.transport.try_write(&self.write_buf) {
                Ok(0) => {
                    debug!(peer = %self.remote, "transport accepted no bytes");
                    self.close(ctx);
                    return SessionStatus::Closed;
                }
                Ok(n) => {
                    self.write_buf.advance(n);
                    trace!(peer = %self.remote, bytes = n, "wrote");
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    debug!(peer = %self.remote, error = %err, "write failed");
                    self.close(ctx);
                    return SessionStatus::Closed;
                }
            }
        }
        SessionStatus::Open
    }

    /// Tops up outbound requests and reports whether anything is waiting to
    /// be written. Always false before the transport connect completed.
    pub fn wants_write(&mut self, ctx: &mut SessionContext<'_>) -> bool {
        let Some(peer) = self.peer else {
            return false;
        };
        if self.state == SessionState::Closed {
            return false;
        }
        self.replenish_requests(peer, ctx);
        !self.write_buf.is_empty()
    }

    /// Runs a timer this session scheduled.
    pub fn on_timer(
        &mut self,
        entry: TimerEntry<SessionTimer>,
        ctx: &mut SessionContext<'_>,
    ) -> SessionStatus {
        self.timers.remove(&entry.handle);
        if self.state == SessionState::Closed {
            return SessionStatus::Closed;
        }

        match entry.action {
            SessionTimer::RequestTimeout(iv) => {
                if self.in_flight.remove(&iv) {
                    // A transaction reply does not complete its request on arrival
                    if ctx.storage.contains(&iv) {
                        ctx.tracker.report_completed(&iv);
                    } else {
                        debug!(peer = %self.remote, item = %iv, "request timed out");
                        ctx.tracker
                            .report_failed(self.peer_ip(), iv, RequestFailure::TimedOut);
                    }
                }
                SessionStatus::Open
            }
            SessionTimer::HandshakeTimeout => {
                if self.state == SessionState::Active {
                    return SessionStatus::Open;
                }
                info!(peer = %self.remote, state = %self.state, "handshake timed out");
                self.close(ctx);
                SessionStatus::Closed
            }
        }
    }

    /// Releases everything the session holds. Safe to call more than once.
    ///
    /// Outstanding requests go back to the tracker as disconnected, not as
    /// timed out. Scheduled timers stay queued and find the session closed
    /// or gone when they fire.
    pub fn close(&mut self, ctx: &mut SessionContext<'_>) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closed;

        let ip = self.peer_ip();
        for iv in self.in_flight.drain() {
            ctx.tracker.report_failed(ip, iv, RequestFailure::Disconnected);
        }

        if let Err(err) = self.transport.shutdown() {
            trace!(peer = %self.remote, error = %err, "shutdown failed");
        }
        self.read_buf.clear();
        self.write_buf.clear();
        info!(session = %self.id, peer = %self.remote, "session closed");
    }

    fn establish(&mut self, ctx: &mut SessionContext<'_>) -> SessionStatus {
        match self.transport.take_error() {
            Ok(None) => {}
            Ok(Some(err)) | Err(err) => {
                info!(peer = %self.remote, error = %err, "connect failed");
                self.close(ctx);
                return SessionStatus::Closed;
            }
        }

        let peer = match self.transport.peer_addr() {
            Ok(peer) => peer,
            Err(err) => {
                info!(peer = %self.remote, error = %err, "connect failed");
                self.close(ctx);
                return SessionStatus::Closed;
            }
        };

        info!(session = %self.id, %peer, "connected");
        self.peer = Some(peer);
        self.state = SessionState::AwaitingVerack;
        let version = self.version_message(peer);
        self.send(Message::Version(version));
        SessionStatus::Open
    }

    fn version_message(&self, peer: SocketAddr) -> VersionPayload {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs() as i64)
            .unwrap_or_default();
        VersionPayload {
            version: self.config.protocol_version,
            services: self.config.services,
            timestamp,
            receiver: NetAddress::new(0, peer),
            sender: NetAddress::new(
                self.config.services,
                SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            ),
            nonce: self.nonce,
            user_agent: self.config.user_agent.clone(),
            start_height: self.config.start_height,
        }
    }

    fn replenish_requests(&mut self, peer: SocketAddr, ctx: &mut SessionContext<'_>) {
        while self.in_flight.len() < self.config.max_in_flight {
            let Some(iv) = ctx.tracker.pop_next(&peer) else {
                break;
            };
            if ctx.storage.contains(&iv) {
                trace!(peer = %self.remote, item = %iv, "already stored, not requesting");
                ctx.tracker.report_completed(&iv);
                continue;
            }
            if !self.in_flight.insert(iv) {
                break;
            }
            self.send(Message::get_data(iv));
            let handle = ctx.timers.schedule_after(
                ctx.now,
                self.config.request_timeout,
                self.id,
                SessionTimer::RequestTimeout(iv),
            );
            self.timers.insert(handle);
        }
    }

    fn process_messages(&mut self, ctx: &mut SessionContext<'_>) -> SessionStatus {
        loop {
            match self.framer.decode(&mut self.read_buf) {
                Ok(Some(message)) => {
                    if self.dispatch(message, ctx).is_closed() {
                        return SessionStatus::Closed;
                    }
                }
                Ok(None) => return SessionStatus::Open,
                Err(err) => {
                    warn!(peer = %self.remote, error = %err, "protocol violation");
                    self.close(ctx);
                    return SessionStatus::Closed;
                }
            }
        }
    }

    fn dispatch(&mut self, message: Message, ctx: &mut SessionContext<'_>) -> SessionStatus {
        trace!(peer = %self.remote, command = %message.command(), "received");
        match message {
            Message::Version(version) => self.on_version(version, ctx),
            Message::Verack => {
                if self.state == SessionState::AwaitingVerack {
                    debug!(peer = %self.remote, "handshake complete");
                    self.state = SessionState::Active;
                }
                SessionStatus::Open
            }
            Message::Addr(addresses) => {
                ctx.storage.store_addresses(&addresses);
                SessionStatus::Open
            }
            Message::Inv(items) => {
                self.on_inventory(&items, ctx);
                SessionStatus::Open
            }
            Message::Block(block) => {
                self.on_block(&block, ctx);
                SessionStatus::Open
            }
            Message::Tx(tx) => {
                self.on_transaction(&tx, ctx);
                SessionStatus::Open
            }
            Message::NotFound(items) => {
                for iv in items {
                    if self.in_flight.remove(&iv) {
                        ctx.tracker
                            .report_failed(self.peer_ip(), iv, RequestFailure::NotFound);
                    }
                }
                SessionStatus::Open
            }
            Message::Ping(Some(nonce)) => {
                self.send(Message::Pong(nonce));
                SessionStatus::Open
            }
            Message::Ping(None)
            | Message::Pong(_)
            | Message::GetData(_)
            | Message::GetAddr
            | Message::Unknown { .. } => SessionStatus::Open,
        }
    }

    fn on_version(&mut self, version: VersionPayload, ctx: &mut SessionContext<'_>) -> SessionStatus {
        if version.version < self.config.min_protocol_version {
            warn!(
                peer = %self.remote,
                version = version.version,
                min = self.config.min_protocol_version,
                "unsupported protocol version"
            );
            self.close(ctx);
            return SessionStatus::Closed;
        }

        debug!(
            peer = %self.remote,
            version = version.version,
            user_agent = %version.user_agent,
            height = version.start_height,
            "peer version"
        );
        self.peer_version = Some(version);
        self.send(Message::Verack);
        SessionStatus::Open
    }

    fn on_inventory(&mut self, items: &[InventoryVector], ctx: &mut SessionContext<'_>) {
        // Each item goes to the front, so walk backwards to keep the
        // announced order among the new items
        for iv in items.iter().rev() {
            if !ctx.storage.contains(iv) && ctx.tracker.enqueue(*iv, Priority::High) {
                trace!(peer = %self.remote, item = %iv, "queued announced item");
            }
        }
    }

    fn on_block(&mut self, block: &BlockPayload, ctx: &mut SessionContext<'_>) {
        let iv = block.inventory();
        debug!(peer = %self.remote, block = %iv.hash, "received block");
        ctx.storage.process_block(block);
        ctx.tracker.report_completed(&iv);
        self.in_flight.remove(&iv);
    }

    // Transactions are processed without completing their request; an
    // unanswered request falls back to the timeout path.
    fn on_transaction(&mut self, tx: &TxPayload, ctx: &mut SessionContext<'_>) {
        trace!(peer = %self.remote, tx = %tx.hash(), "received transaction");
        ctx.storage.process_transaction(tx);
    }

    fn send(&mut self, message: Message) {
        trace!(peer = %self.remote, command = %message.command(), "sending");
        self.framer.encode(&message, &mut self.write_buf);
    }

    fn peer_ip(&self) -> IpAddr {
        self.peer.unwrap_or(self.remote).ip()
    }
}

impl<T> fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("remote", &self.remote)
            .field("state", &self.state)
            .field("in_flight", &self.in_flight.len())
            .field("read_buffered", &self.read_buf.len())
            .field("write_buffered", &self.write_buf.len())
            .finish()
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
