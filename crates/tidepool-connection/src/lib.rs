//! Tidepool Connection - Connection lifecycle management
//!
//! This crate keeps connection counts on a shared database server bounded
//! when many short-lived callers share one credential. It layers the
//! following on top of a bounded pool:
//!
//! - retrying acquisition with a constant delay
//! - tracking of the pool's idle connections
//! - `flush`, which trims idle connections to a keep-alive floor and reaps
//!   sessions that other, vanished callers left sleeping on the server
//! - transactions that own their connection until commit or rollback

mod config;
mod events;
pub mod managed;
mod manager;
pub mod pool;
pub mod reaper;
pub mod retry;
mod tracker;

#[cfg(test)]
mod test_support;

pub use config::{ConnectionParams, ManagerConfig};
pub use events::ManagerEvent;
pub use managed::{ConnectionState, ManagedConnection, ManagedTransaction, TransactionState};
pub use manager::{ConnectionManager, FlushReport, ManagerStats};
pub use pool::{ConnectionFactory, ConnectionPool, IdleConnection, PoolConfig, PoolObserver, PoolStats, PooledConnection};
pub use reaper::{ReapOutcome, ServerConnectionLimit, ServerConnectionUsage, ZombieReaper};
pub use retry::RetryPolicy;
pub use tracker::IdleTracker;
