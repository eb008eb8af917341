//! Time-stamped server facts

use std::future::Future;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tidepool_core::Result;

/// A value together with the instant it was fetched
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachedFact<T> {
    value: T,
    refreshed_at: Instant,
}

impl<T> CachedFact<T> {
    pub fn new(value: T, refreshed_at: Instant) -> Self {
        Self {
            value,
            refreshed_at,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn refreshed_at(&self) -> Instant {
        self.refreshed_at
    }

    /// A fact is stale once `ttl` has elapsed since it was fetched.
    /// A zero `ttl` is always stale.
    pub fn is_stale(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.refreshed_at) >= ttl
    }
}

/// A single cached fact, refreshed lazily on use
pub struct FactCache<T> {
    ttl: Duration,
    slot: Mutex<Option<CachedFact<T>>>,
}

impl<T: Clone> FactCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Last fetched value, stale or not
    pub fn current(&self) -> Option<T> {
        self.slot.lock().as_ref().map(|fact| fact.value().clone())
    }

    /// Cached value if it is still fresh at `now`
    pub fn fresh(&self, now: Instant) -> Option<T> {
        self.slot
            .lock()
            .as_ref()
            .filter(|fact| !fact.is_stale(now, self.ttl))
            .map(|fact| fact.value().clone())
    }

    /// Return the cached value, or run `fetch` and cache its result if the
    /// value is missing or stale. A failed fetch leaves the cache untouched.
    pub async fn refresh_if_stale<F, Fut>(&self, now: Instant, fetch: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(value) = self.fresh(now) {
            return Ok(value);
        }
        let value = fetch().await?;
        *self.slot.lock() = Some(CachedFact::new(value.clone(), now));
        Ok(value)
    }

    /// Drop the cached value so the next use refetches
    pub fn invalidate(&self) {
        self.slot.lock().take();
    }
}
