//! Point-in-time pool counters

use serde::{Deserialize, Serialize};

/// Snapshot of a pool's checkouts and idle queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PoolStats {
    /// Sessions parked in the idle queue
    idle: usize,
    active: usize,
    /// Number of callers waiting for a connection
    waiting: usize,
}

impl PoolStats {
    pub fn new(idle: usize, active: usize, waiting: usize) -> Self {
        Self {
            idle,
            active,
            waiting,
        }
    }

    /// Open sessions, parked or checked out
    pub fn total(&self) -> usize {
        self.idle + self.active
    }

    pub fn idle(&self) -> usize {
        self.idle
    }

    pub fn active(&self) -> usize {
        self.active
    }

    pub fn waiting(&self) -> usize {
        self.waiting
    }

    /// Share of open connections that are checked out (0.0 to 1.0)
    ///
    /// Returns 0.0 for an empty pool.
    pub fn utilization(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.active as f64 / total as f64
        }
    }
}
