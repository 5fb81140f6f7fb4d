//! Single-threaded event loop driving every session and the timer queue.
//!
//! Each [`EventLoop::turn`] collects write interest (topping up requests on
//! the way), waits for socket readiness bounded by the next timer deadline,
//! then runs due timers, read handlers and write handlers in that order.
//! Sessions that report [`SessionStatus::Closed`] leave the registry on the
//! spot and are skipped for the rest of the turn.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{select_all, BoxFuture};
use futures::FutureExt;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::{Interest, Ready};
use tokio::net::TcpStream;
use tracing::{debug, info, trace};

use crate::error::{NetworkError, NetworkResult};
use crate::registry::{SessionId, SessionRegistry};
use crate::session::{Session, SessionContext, SessionState, SessionStatus, SessionTimer};
use crate::storage::{MemoryStorage, Storage};
use crate::timer::TimerQueue;
use crate::tracker::{RequestQueue, RequestTracker};
use crate::SessionConfig;

type ReadyFuture<'a> = BoxFuture<'a, (SessionId, io::Result<Ready>)>;

pub struct EventLoop<R = RequestQueue, S = MemoryStorage> {
    config: Arc<SessionConfig>,
    sessions: SessionRegistry<Session<TcpStream>>,
    timers: TimerQueue<SessionTimer>,
    tracker: R,
    storage: S,
}

impl<R, S> EventLoop<R, S>
where
    R: RequestTracker,
    S: Storage,
{
    pub fn new(config: SessionConfig, tracker: R, storage: S) -> Self {
        Self {
            config: Arc::new(config),
            sessions: SessionRegistry::new(),
            timers: TimerQueue::new(),
            tracker,
            storage,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn tracker(&self) -> &R {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut R {
        &mut self.tracker
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn sessions(&self) -> &SessionRegistry<Session<TcpStream>> {
        &self.sessions
    }

    pub fn session(&self, id: SessionId) -> Option<&Session<TcpStream>> {
        self.sessions.get(id)
    }

    /// Timers still queued, including ones owned by closed sessions
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Starts a non-blocking connect to `address` and registers its session.
    ///
    /// Must be called from within a tokio runtime. Only failures to start
    /// the connect are returned; a refused or unreachable peer closes the
    /// session later, during a turn.
    pub fn connect(&mut self, address: SocketAddr) -> NetworkResult<SessionId> {
        let stream = start_connect(address)
            .map_err(|source| NetworkError::Connect { address, source })?;

        let config = self.config.clone();
        let timers = &mut self.timers;
        let now = Instant::now();
        let id = self
            .sessions
            .insert_with(|id| Session::new(id, stream, address, config, timers, now));
        info!(session = %id, %address, "connecting");
        Ok(id)
    }

    /// Closes and removes one session. Returns false if it was not registered.
    pub fn close(&mut self, id: SessionId) -> bool {
        let Some(mut session) = self.sessions.remove(id) else {
            return false;
        };
        let mut ctx = SessionContext::new(
            &mut self.tracker,
            &mut self.storage,
            &mut self.timers,
            Instant::now(),
        );
        session.close(&mut ctx);
        true
    }

    pub fn close_all(&mut self) {
        for id in self.sessions.ids() {
            self.close(id);
        }
    }

    /// Runs turns until no session is left.
    pub async fn run(&mut self) -> NetworkResult<()> {
        while !self.sessions.is_empty() {
            self.turn().await?;
        }
        debug!(timers = self.timers.len(), "event loop finished");
        Ok(())
    }

    /// Runs one iteration of the loop.
    ///
    /// Only a failing readiness wait is returned as an error; everything a
    /// session runs into closes that session instead.
    pub async fn turn(&mut self) -> NetworkResult<()> {
        let now = Instant::now();
        let mut interests = Vec::with_capacity(self.sessions.len());
        for (id, session) in self.sessions.iter_mut() {
            let mut ctx =
                SessionContext::new(&mut self.tracker, &mut self.storage, &mut self.timers, now);
            // Connect completion shows up as writability
            let interest = if session.state() == SessionState::Connecting
                || session.wants_write(&mut ctx)
            {
                Interest::READABLE | Interest::WRITABLE
            } else {
                Interest::READABLE
            };
            interests.push((id, interest));
        }

        let wait = self.timers.time_until_next(now);
        trace!(
            sessions = interests.len(),
            timers = self.timers.len(),
            ?wait,
            "waiting for readiness"
        );
        let mut ready = wait_ready(&self.sessions, &interests, wait).await?;
        ready.sort_by_key(|(id, _)| *id);

        let now = Instant::now();
        for entry in self.timers.pop_due(now) {
            let id = entry.owner;
            let Some(session) = self.sessions.get_mut(id) else {
                trace!(session = %id, action = ?entry.action, "timer for closed session");
                continue;
            };
            let mut ctx =
                SessionContext::new(&mut self.tracker, &mut self.storage, &mut self.timers, now);
            if session.on_timer(entry, &mut ctx).is_closed() {
                self.sessions.remove(id);
            }
        }

        for &(id, readiness) in &ready {
            if !(readiness.is_readable() || readiness.is_read_closed()) {
                continue;
            }
            let Some(session) = self.sessions.get_mut(id) else {
                continue;
            };
            let mut ctx =
                SessionContext::new(&mut self.tracker, &mut self.storage, &mut self.timers, now);
            if session.readable(&mut ctx) == SessionStatus::Closed {
                self.sessions.remove(id);
            }
        }

        for &(id, readiness) in &ready {
            if !(readiness.is_writable() || readiness.is_write_closed()) {
                continue;
            }
            let Some(session) = self.sessions.get_mut(id) else {
                continue;
            };
            let mut ctx =
                SessionContext::new(&mut self.tracker, &mut self.storage, &mut self.timers, now);
            if session.writable(&mut ctx) == SessionStatus::Closed {
                self.sessions.remove(id);
            }
        }

        Ok(())
    }
}

impl<R, S> std::fmt::Debug for EventLoop<R, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("sessions", &self.sessions.len())
            .field("timers", &self.timers)
            .finish()
    }
}

fn start_connect(address: SocketAddr) -> io::Result<TcpStream> {
    let socket = Socket::new(Domain::for_address(address), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_nonblocking(true)?;
    socket.set_nodelay(true)?;
    match socket.connect(&address.into()) {
        Ok(()) => {}
        Err(err) if connect_in_progress(&err) => {}
        Err(err) => return Err(err),
    }
    TcpStream::from_std(socket.into())
}

fn connect_in_progress(err: &io::Error) -> bool {
    #[cfg(unix)]
    if err.raw_os_error() == Some(libc::EINPROGRESS) {
        return true;
    }
    err.kind() == io::ErrorKind::WouldBlock
}

/// Waits until at least one socket is ready or `wait` elapses, then
/// collects every socket that is ready at that point.
async fn wait_ready(
    sessions: &SessionRegistry<Session<TcpStream>>,
    interests: &[(SessionId, Interest)],
    wait: Option<Duration>,
) -> NetworkResult<Vec<(SessionId, Ready)>> {
    let pending: Vec<ReadyFuture<'_>> = interests
        .iter()
        .filter_map(|&(id, interest)| {
            let session = sessions.get(id)?;
            Some(
                async move { (id, session.transport().ready(interest).await) }.boxed(),
            )
        })
        .collect();

    if pending.is_empty() {
        if let Some(wait) = wait {
            tokio::time::sleep(wait).await;
        }
        return Ok(Vec::new());
    }

    let first = match wait {
        Some(wait) => match tokio::time::timeout(wait, select_all(pending)).await {
            Ok(first) => first,
            Err(_elapsed) => return Ok(Vec::new()),
        },
        None => select_all(pending).await,
    };

    let ((id, result), _index, rest) = first;
    let mut ready = vec![(id, result.map_err(NetworkError::Poll)?)];
    for future in rest {
        if let Some((id, result)) = future.now_or_never() {
            ready.push((id, result.map_err(NetworkError::Poll)?));
        }
    }
    Ok(ready)
}
