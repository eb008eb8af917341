//! Pool configuration types

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tidepool_core::{Result, TidepoolError};

/// Configuration for a connection pool
///
/// Controls how many sessions may be checked out at once and how long a
/// caller waits for one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of connections checked out at the same time
    max_size: usize,
    /// Timeout in milliseconds when acquiring a connection from the pool
    acquire_timeout_ms: u64,
}

impl PoolConfig {
    /// Create a new pool configuration with the given capacity
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            acquire_timeout_ms: 10_000,
        }
    }

    /// Set the acquire timeout in milliseconds
    pub fn with_acquire_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.acquire_timeout_ms = timeout_ms;
        self
    }

    /// Set the maximum pool size
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Get the maximum pool size
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Get the acquire timeout as a Duration
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Reject configurations the pool cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(TidepoolError::Configuration(
                "pool.max_size must be greater than 0".into(),
            ));
        }
        if self.acquire_timeout_ms == 0 {
            return Err(TidepoolError::Configuration(
                "pool.acquire_timeout_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    /// Defaults:
    /// - max_size: 10
    /// - acquire_timeout: 10 seconds
    fn default() -> Self {
        Self::new(10)
    }
}
