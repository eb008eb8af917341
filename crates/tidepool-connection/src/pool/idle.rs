//! Handle to a connection sitting in the idle queue

use std::sync::Weak;
use std::time::{Duration, Instant};

use tidepool_core::Result;

use super::pool::PoolShared;

/// A pooled connection that is currently not checked out.
///
/// Delivered to `PoolObserver::on_release`. The handle does not keep the
/// pool alive; `disconnect` on a handle whose pool is gone is a no-op.
#[derive(Clone)]
pub struct IdleConnection {
    session_id: u64,
    released_at: Instant,
    pool: Weak<PoolShared>,
}

impl IdleConnection {
    pub(super) fn new(session_id: u64, released_at: Instant, pool: Weak<PoolShared>) -> Self {
        Self {
            session_id,
            released_at,
            pool,
        }
    }

    /// Server session id
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// When the connection was returned to the pool
    pub fn released_at(&self) -> Instant {
        self.released_at
    }

    /// How long the connection has been idle
    pub fn idle_for(&self) -> Duration {
        self.released_at.elapsed()
    }

    /// Take the connection out of the pool and close it.
    ///
    /// Returns `Ok(false)` if it was checked out again (or the pool is gone)
    /// before the eviction happened.
    pub async fn disconnect(&self) -> Result<bool> {
        match self.pool.upgrade() {
            Some(shared) => shared.evict(self.session_id).await,
            None => Ok(false),
        }
    }
}

impl std::fmt::Debug for IdleConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdleConnection")
            .field("session_id", &self.session_id)
            .field("idle_for", &self.idle_for())
            .finish()
    }
}
