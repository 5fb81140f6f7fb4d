//! Deadline-ordered timer queue.
//!
//! Timers are never cancelled. Each entry records the session that scheduled
//! it, and the event loop looks that session up when the timer fires; if the
//! session is gone the entry is simply dropped.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use crate::registry::SessionId;

/// Identifies one scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

impl TimerHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// A timer that has come due
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerEntry<A> {
    pub handle: TimerHandle,
    pub deadline: Instant,
    pub owner: SessionId,
    pub action: A,
}

struct Scheduled<A>(TimerEntry<A>);

impl<A> Scheduled<A> {
    fn key(&self) -> (Instant, TimerHandle) {
        (self.0.deadline, self.0.handle)
    }
}

impl<A> PartialEq for Scheduled<A> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<A> Eq for Scheduled<A> {}

impl<A> PartialOrd for Scheduled<A> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<A> Ord for Scheduled<A> {
    // Reversed: BinaryHeap is a max-heap and the earliest deadline must pop first
    fn cmp(&self, other: &Self) -> Ordering {
        other.key().cmp(&self.key())
    }
}

/// Timers ordered by deadline, ties broken by scheduling order
pub struct TimerQueue<A> {
    heap: BinaryHeap<Scheduled<A>>,
    next_handle: u64,
}

impl<A> TimerQueue<A> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_handle: 0,
        }
    }

    pub fn schedule(&mut self, deadline: Instant, owner: SessionId, action: A) -> TimerHandle {
        let handle = TimerHandle(self.next_handle);
        self.next_handle += 1;
        self.heap.push(Scheduled(TimerEntry {
            handle,
            deadline,
            owner,
            action,
        }));
        handle
    }

    pub fn schedule_after(
        &mut self,
        now: Instant,
        delay: Duration,
        owner: SessionId,
        action: A,
    ) -> TimerHandle {
        self.schedule(now + delay, owner, action)
    }

    /// Time left until the earliest deadline, zero if one has already passed.
    /// `None` when nothing is scheduled.
    pub fn time_until_next(&self, now: Instant) -> Option<Duration> {
        self.heap
            .peek()
            .map(|next| next.0.deadline.saturating_duration_since(now))
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|next| next.0.deadline)
    }

    /// Removes and returns every timer due at `now`, earliest first.
    pub fn pop_due(&mut self, now: Instant) -> Vec<TimerEntry<A>> {
        let mut due = Vec::new();
        while self.heap.peek().is_some_and(|next| next.0.deadline <= now) {
            if let Some(Scheduled(entry)) = self.heap.pop() {
                due.push(entry);
            }
        }
        due
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl<A> Default for TimerQueue<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> std::fmt::Debug for TimerQueue<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerQueue")
            .field("pending", &self.heap.len())
            .field("next_deadline", &self.next_deadline())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_queue() {
        let mut queue: TimerQueue<&str> = TimerQueue::new();
        let now = Instant::now();
        assert_eq!(queue.time_until_next(now), None);
        assert!(queue.pop_due(now).is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_deadline_order() {
        let mut queue = TimerQueue::new();
        let now = Instant::now();
        let owner = SessionId::new(1);
        queue.schedule_after(now, Duration::from_millis(30), owner, "c");
        queue.schedule_after(now, Duration::from_millis(10), owner, "a");
        queue.schedule_after(now, Duration::from_millis(20), owner, "b");

        assert_eq!(queue.time_until_next(now), Some(Duration::from_millis(10)));

        let due = queue.pop_due(now + Duration::from_millis(25));
        let actions: Vec<_> = due.iter().map(|entry| entry.action).collect();
        assert_eq!(actions, vec!["a", "b"]);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_ties_fire_in_scheduling_order() {
        let mut queue = TimerQueue::new();
        let deadline = Instant::now();
        for action in 0..5 {
            queue.schedule(deadline, SessionId::new(action), action);
        }
        let due: Vec<_> = queue.pop_due(deadline).into_iter().map(|e| e.action).collect();
        assert_eq!(due, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_overdue_timer_waits_zero() {
        let mut queue = TimerQueue::new();
        let now = Instant::now();
        queue.schedule(now, SessionId::new(0), ());
        assert_eq!(
            queue.time_until_next(now + Duration::from_secs(1)),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_entries_carry_owner_and_handle() {
        let mut queue = TimerQueue::new();
        let now = Instant::now();
        let first = queue.schedule(now, SessionId::new(7), "x");
        let second = queue.schedule(now, SessionId::new(8), "y");
        assert_ne!(first, second);

        let due = queue.pop_due(now);
        assert_eq!(due[0].handle, first);
        assert_eq!(due[0].owner, SessionId::new(7));
        assert_eq!(due[1].owner, SessionId::new(8));
    }
}
