//! Caller-facing connection handles
//!
//! `ManagedConnection` wraps one checked-out pool connection and makes
//! `release` and `destroy` mutually exclusive terminal actions.
//! `ManagedTransaction` owns one `ManagedConnection` exclusively for the
//! lifetime of a transaction and releases it exactly once, on commit or
//! rollback.

mod connection;
mod transaction;

#[cfg(test)]
mod tests;

pub use connection::{ConnectionState, ManagedConnection};
pub use transaction::{ManagedTransaction, TransactionState};
