//! Connection trait for a single server session

use crate::{QueryResult, Result, StatementResult, Value};
use async_trait::async_trait;

/// A single database session.
///
/// Implementations wrap exactly one physical connection. The pool hands
/// these out behind `Arc`, so every method takes `&self`; drivers serialize
/// access internally.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "mysql")
    fn driver_name(&self) -> &str;

    /// Server-assigned session id (the MySQL thread id).
    ///
    /// This is the identity the pool tracks idle connections by and the id a
    /// `KILL` statement targets.
    fn session_id(&self) -> u64;

    /// Execute a statement that modifies data (INSERT/UPDATE/DELETE/KILL)
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult>;

    /// Execute a query that returns rows (SELECT)
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Open a transaction on this session.
    ///
    /// Returns once the server has acknowledged the command.
    async fn start_transaction(&self) -> Result<()> {
        tracing::debug!(session_id = self.session_id(), "starting transaction");
        self.execute("START TRANSACTION", &[]).await.map(|_| ())
    }

    /// Commit the open transaction
    async fn commit(&self) -> Result<()> {
        tracing::debug!(session_id = self.session_id(), "committing transaction");
        self.execute("COMMIT", &[]).await.map(|_| ())
    }

    /// Roll back the open transaction
    async fn rollback(&self) -> Result<()> {
        tracing::debug!(session_id = self.session_id(), "rolling back transaction");
        self.execute("ROLLBACK", &[]).await.map(|_| ())
    }

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;
}
