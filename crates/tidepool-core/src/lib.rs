//! Tidepool Core - Core abstractions shared by the tidepool crates
//!
//! This crate provides the fundamental traits and types that the pool,
//! the lifecycle manager and the drivers depend on. It defines:
//!
//! - `Connection` - Trait for a single server session
//! - `TidepoolError` - The error type used across the workspace
//! - Common types like `Value`, `Row`, `QueryResult`

mod connection;
mod error;
mod types;

pub use connection::*;
pub use error::*;
pub use types::*;
