//! Pending inventory requests shared by all sessions.
//!
//! Sessions pop the next item to fetch from a peer and report back how the
//! request ended. The tracker decides which items a peer may be asked for
//! and when an item is given up on.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use parking_lot::Mutex;
use peerwire_config::MAX_REQUEST_ATTEMPTS;
use tracing::{debug, trace, warn};

use crate::messages::InventoryVector;

/// Queue position for a newly enqueued item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    /// Ahead of everything already pending
    High,
    Normal,
}

/// How a request ended without a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestFailure {
    /// No reply within the request timeout
    TimedOut,
    /// The peer answered `notfound`
    NotFound,
    /// The session closed with the request outstanding
    Disconnected,
}

impl RequestFailure {
    /// Whether the failure counts against the peer and the item's attempts
    pub fn is_penalised(&self) -> bool {
        !matches!(self, RequestFailure::Disconnected)
    }
}

/// Request/response contract between sessions and the pending-request pool
pub trait RequestTracker {
    /// Next item `peer` should be asked for; the item is assigned to it.
    fn pop_next(&mut self, peer: &SocketAddr) -> Option<InventoryVector>;

    /// The item arrived; it is forgotten.
    fn report_completed(&mut self, iv: &InventoryVector);

    /// A request to `peer` ended without the item.
    fn report_failed(&mut self, peer: IpAddr, iv: InventoryVector, failure: RequestFailure);

    /// Adds an item to fetch. Returns false if it is already pending or assigned.
    fn enqueue(&mut self, iv: InventoryVector, priority: Priority) -> bool;
}

/// Tracker shared behind a mutex
pub type SharedTracker<T = RequestQueue> = Arc<Mutex<T>>;

impl<T: RequestTracker> RequestTracker for Arc<Mutex<T>> {
    fn pop_next(&mut self, peer: &SocketAddr) -> Option<InventoryVector> {
        self.lock().pop_next(peer)
    }

    fn report_completed(&mut self, iv: &InventoryVector) {
        self.lock().report_completed(iv)
    }

    fn report_failed(&mut self, peer: IpAddr, iv: InventoryVector, failure: RequestFailure) {
        self.lock().report_failed(peer, iv, failure)
    }

    fn enqueue(&mut self, iv: InventoryVector, priority: Priority) -> bool {
        self.lock().enqueue(iv, priority)
    }
}

#[derive(Debug, Default)]
struct FailureHistory {
    peers: HashSet<IpAddr>,
    attempts: usize,
}

/// FIFO request pool with front insertion for high priority items
#[derive(Debug)]
pub struct RequestQueue {
    pending: VecDeque<InventoryVector>,
    assigned: HashMap<InventoryVector, IpAddr>,
    failures: HashMap<InventoryVector, FailureHistory>,
    max_attempts: usize,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::with_max_attempts(MAX_REQUEST_ATTEMPTS)
    }

    pub fn with_max_attempts(max_attempts: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            assigned: HashMap::new(),
            failures: HashMap::new(),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn assigned_len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.assigned.is_empty()
    }

    pub fn is_pending(&self, iv: &InventoryVector) -> bool {
        self.pending.contains(iv)
    }

    /// Peer the item is currently assigned to
    pub fn assignee(&self, iv: &InventoryVector) -> Option<IpAddr> {
        self.assigned.get(iv).copied()
    }

    /// Pending items, next to be popped first
    pub fn pending(&self) -> impl Iterator<Item = &InventoryVector> {
        self.pending.iter()
    }

    fn failed_at(&self, iv: &InventoryVector, peer: &IpAddr) -> bool {
        self.failures
            .get(iv)
            .is_some_and(|history| history.peers.contains(peer))
    }
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestTracker for RequestQueue {
    fn pop_next(&mut self, peer: &SocketAddr) -> Option<InventoryVector> {
        let ip = peer.ip();
        // Items this peer already failed go last; `max_attempts` retires them
        let index = match self.pending.iter().position(|iv| !self.failed_at(iv, &ip)) {
            Some(index) => index,
            None if !self.pending.is_empty() => 0,
            None => return None,
        };
        let iv = self.pending.remove(index)?;
        self.assigned.insert(iv, ip);
        trace!(peer = %peer, item = %iv, retry = self.failed_at(&iv, &ip), "assigned request");
        Some(iv)
    }

    fn report_completed(&mut self, iv: &InventoryVector) {
        self.assigned.remove(iv);
        self.pending.retain(|pending| pending != iv);
        self.failures.remove(iv);
    }

    fn report_failed(&mut self, peer: IpAddr, iv: InventoryVector, failure: RequestFailure) {
        match self.assigned.get(&iv) {
            Some(assignee) if *assignee == peer => {
                self.assigned.remove(&iv);
            }
            _ => {
                trace!(%peer, item = %iv, ?failure, "ignoring failure for unassigned request");
                return;
            }
        }

        if failure.is_penalised() {
            let history = self.failures.entry(iv).or_default();
            history.peers.insert(peer);
            history.attempts += 1;
            if history.attempts >= self.max_attempts {
                warn!(
                    item = %iv,
                    attempts = history.attempts,
                    "giving up on request"
                );
                self.failures.remove(&iv);
                return;
            }
        }

        debug!(%peer, item = %iv, ?failure, "re-queueing request");
        self.pending.push_front(iv);
    }

    fn enqueue(&mut self, iv: InventoryVector, priority: Priority) -> bool {
        if self.assigned.contains_key(&iv) || self.pending.contains(&iv) {
            return false;
        }
        match priority {
            Priority::High => self.pending.push_front(iv),
            Priority::Normal => self.pending.push_back(iv),
        }
        true
    }
}
