//! Directory of live session push handles.
//!
//! `SessionDirectory` stores non-owning weak references to each session's
//! [`PushHandle`], so the registry can fan messages out to live connections
//! without keeping dead ones alive. Dead entries are pruned lazily at lookup
//! time or explicitly on teardown.

use std::{
    fmt,
    sync::{
        Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use dashmap::DashMap;

use crate::{
    frame::Outbound,
    push::{PushHandle, PushHandleInner},
};

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Identifier assigned to a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

impl From<u64> for SessionId {
    fn from(value: u64) -> Self { Self(value) }
}

impl SessionId {
    /// Create a [`SessionId`] with the provided value.
    #[must_use]
    pub fn new(id: u64) -> Self { Self(id) }

    /// Allocate a fresh process-unique identifier.
    #[must_use]
    pub fn next() -> Self { Self(NEXT_SESSION.fetch_add(1, Ordering::Relaxed)) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "session-{}", self.0) }
}

/// Concurrent map of push handles keyed by [`SessionId`].
#[derive(Default)]
pub struct SessionDirectory(DashMap<SessionId, Weak<PushHandleInner<Outbound>>>);

impl SessionDirectory {
    /// Retrieve the handle for `id` if the session is still alive.
    pub fn get(&self, id: &SessionId) -> Option<PushHandle<Outbound>> {
        let guard = self.0.get(id);
        let handle = guard.as_ref().and_then(|weak| weak.upgrade());
        drop(guard);
        if handle.is_none() {
            self.0.remove_if(id, |_, weak| weak.strong_count() == 0);
        }
        handle.map(PushHandle::from_arc)
    }

    /// Record the handle of a newly created session.
    pub fn insert(&self, id: SessionId, handle: &PushHandle<Outbound>) {
        self.0.insert(id, handle.downgrade());
    }

    /// Forget a session, typically on teardown.
    pub fn remove(&self, id: &SessionId) { self.0.remove(id); }

    /// Drop entries whose sessions are gone, then list the live ones.
    #[must_use]
    pub fn active_ids(&self) -> Vec<SessionId> {
        let mut ids = Vec::with_capacity(self.0.len());
        self.0.retain(|id, weak| {
            if weak.strong_count() > 0 {
                ids.push(*id);
                true
            } else {
                false
            }
        });
        ids.sort_unstable();
        ids
    }
}
