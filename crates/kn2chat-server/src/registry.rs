//! Session registry and message fan-out.
//!
//! The registry is the only state shared between connection tasks. It holds
//! every admitted session keyed by id and fans each posted message out to
//! all of them.
//!
//! # Locking
//!
//! - `sessions` (RwLock): membership. Broadcast takes a snapshot under the
//!   read lock and dispatches after releasing it.
//! - `fanout` (Mutex): serializes broadcasts so every session observes
//!   messages in broadcast call order.
//!
//! Neither lock is held across an `.await`; all methods are synchronous.
//! Poisoned locks are recovered since every critical section leaves the map
//! consistent.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use kn2chat_core::Message;

use crate::session::{Delivery, Session};

/// Counts from one [`SessionRegistry::broadcast`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Sessions that queued the message.
    pub delivered: usize,
    /// Sessions that were already closing and discarded it.
    pub dropped: usize,
    /// Sessions removed because their sink failed.
    pub evicted: usize,
}

/// Live sessions, keyed by id.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<u64, Arc<Session>>>,
    fanout: Mutex<()>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session.
    ///
    /// Returns `false` if the session is already closed or its id is taken.
    pub fn register(&self, session: Arc<Session>) -> bool {
        if !session.is_open() {
            return false;
        }

        let mut sessions = self.write();
        if sessions.contains_key(&session.id()) {
            return false;
        }

        tracing::debug!(session_id = session.id(), identity = session.identity(), "registered");
        sessions.insert(session.id(), session);
        true
    }

    /// Remove a session. Removing an unknown id is a no-op.
    pub fn unregister(&self, id: u64) -> Option<Arc<Session>> {
        let removed = self.write().remove(&id);
        if let Some(session) = &removed {
            tracing::debug!(session_id = id, identity = session.identity(), "unregistered");
        }
        removed
    }

    /// Deliver `message` to every session registered at the time of the call.
    ///
    /// Never waits on a session. Sessions whose sink fails are unregistered
    /// and closed; the rest are unaffected.
    pub fn broadcast(&self, message: &Message) -> BroadcastReport {
        let _order = self.fanout.lock().unwrap_or_else(PoisonError::into_inner);
        let members: Vec<Arc<Session>> = self.read().values().cloned().collect();

        let mut report = BroadcastReport::default();
        for session in members {
            match session.deliver(message) {
                Ok(Delivery::Queued) => report.delivered += 1,
                Ok(Delivery::Dropped) => report.dropped += 1,
                Err(err) => {
                    tracing::warn!(
                        session_id = session.id(),
                        identity = session.identity(),
                        error = %err,
                        "evicting session"
                    );
                    self.unregister(session.id());
                    session.close();
                    report.evicted += 1;
                },
            }
        }

        tracing::trace!(
            sender = message.sender(),
            delivered = report.delivered,
            evicted = report.evicted,
            "broadcast"
        );
        report
    }

    /// Whether a session with `id` is registered.
    pub fn contains(&self, id: u64) -> bool {
        self.read().contains_key(&id)
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.read().len()
    }

    /// Identities of live sessions, sorted, one entry per session.
    pub fn identities(&self) -> Vec<String> {
        let mut names: Vec<String> =
            self.read().values().map(|s| s.identity().to_string()).collect();
        names.sort_unstable();
        names
    }

    /// Unregister and close every session. Returns how many were closed.
    pub fn close_all(&self) -> usize {
        let drained: Vec<Arc<Session>> = self.write().drain().map(|(_, s)| s).collect();
        drained.iter().filter(|session| session.close()).count()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<u64, Arc<Session>>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<u64, Arc<Session>>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }
}
