//! Free-connection tracking
//!
//! `IdleTracker` mirrors the pool's idle queue by session id. It is fed by
//! the pool's checkout/checkin notifications and is what the flush uses to
//! decide which idle sessions to disconnect.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::pool::{IdleConnection, PoolObserver};

/// Session-id keyed view of the connections currently idle in the pool
#[derive(Default)]
pub struct IdleTracker {
    idle: Mutex<HashMap<u64, IdleConnection>>,
}

impl IdleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked idle connections
    pub fn len(&self) -> usize {
        self.idle.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.idle.lock().is_empty()
    }

    pub fn contains(&self, session_id: u64) -> bool {
        self.idle.lock().contains_key(&session_id)
    }

    /// Tracked session ids, in ascending order
    pub fn session_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.idle.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Stop tracking a session. Removing an unknown id is a no-op.
    pub fn remove(&self, session_id: u64) -> Option<IdleConnection> {
        self.idle.lock().remove(&session_id)
    }

    /// Take one tracked connection out while more than `floor` remain.
    ///
    /// The size check and the removal happen under one lock, so concurrent
    /// flushes never take the count below `floor`.
    pub fn pop_over(&self, floor: usize) -> Option<IdleConnection> {
        let mut idle = self.idle.lock();
        if idle.len() <= floor {
            return None;
        }
        let session_id = idle
            .values()
            .min_by_key(|conn| conn.released_at())
            .map(IdleConnection::session_id)?;
        idle.remove(&session_id)
    }

    pub fn clear(&self) {
        self.idle.lock().clear();
    }
}

impl PoolObserver for IdleTracker {
    fn on_acquire(&self, session_id: u64) {
        self.remove(session_id);
    }

    fn on_release(&self, connection: IdleConnection) {
        tracing::trace!(session_id = connection.session_id(), "tracking idle connection");
        self.idle.lock().insert(connection.session_id(), connection);
    }
}
