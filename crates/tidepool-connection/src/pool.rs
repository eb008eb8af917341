//! Bounded connection pool with checkout/checkin notifications
//!
//! This module provides the pool the lifecycle manager sits on: a
//! semaphore-bounded set of sessions created by a `ConnectionFactory`,
//! with an acquire timeout, statistics, and a `PoolObserver` hook that is
//! told about every checkout and every return to the idle queue.
//!
//! # Example
//!
//! ```ignore
//! use tidepool_connection::pool::{ConnectionPool, PoolConfig};
//!
//! let config = PoolConfig::new(20).with_acquire_timeout_ms(5000);
//! let pool = ConnectionPool::new(config, connection_factory);
//! let conn = pool.acquire().await?;
//! // Use connection...
//! conn.release().await?;
//! ```

mod config;
mod idle;
mod pool;
mod stats;


pub use config::PoolConfig;
pub use idle::IdleConnection;
pub use pool::{ConnectionFactory, ConnectionPool, PoolObserver, PooledConnection};
pub use stats::PoolStats;
