//! Registry of live sessions.
//!
//! Identifiers are handed out in increasing order and never reused, so a
//! stale reference (for example from a timer scheduled by a closed session)
//! can only ever miss, never reach an unrelated newer session.

use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
pub struct SessionRegistry<T> {
    sessions: BTreeMap<SessionId, T>,
    next_id: u64,
}

impl<T> SessionRegistry<T> {
    pub fn new() -> Self {
        Self {
            sessions: BTreeMap::new(),
            next_id: 0,
        }
    }

    /// Allocates an id and stores the value built for it.
    pub fn insert_with<F>(&mut self, build: F) -> SessionId
    where
        F: FnOnce(SessionId) -> T,
    {
        let id = SessionId(self.next_id);
        self.next_id += 1;
        self.sessions.insert(id, build(id));
        id
    }

    /// Like [`insert_with`](Self::insert_with) for fallible constructors.
    /// The id is consumed even on failure.
    pub fn try_insert_with<F, E>(&mut self, build: F) -> Result<SessionId, E>
    where
        F: FnOnce(SessionId) -> Result<T, E>,
    {
        let id = SessionId(self.next_id);
        self.next_id += 1;
        self.sessions.insert(id, build(id)?);
        Ok(id)
    }

    pub fn get(&self, id: SessionId) -> Option<&T> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut T> {
        self.sessions.get_mut(&id)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn remove(&mut self, id: SessionId) -> Option<T> {
        self.sessions.remove(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SessionId, &T)> {
        self.sessions.iter().map(|(id, session)| (*id, session))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SessionId, &mut T)> {
        self.sessions.iter_mut().map(|(id, session)| (*id, session))
    }

    /// Snapshot of the current ids, in creation order
    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl<T> Default for SessionRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
