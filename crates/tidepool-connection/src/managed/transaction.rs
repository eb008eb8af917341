use std::fmt;

use tidepool_core::{QueryResult, Result, StatementResult, TidepoolError, Value};
use tokio::sync::Mutex;

use super::connection::ManagedConnection;

/// Lifecycle of a managed transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    RolledBack,
}

impl TransactionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionState::Active => "active",
            TransactionState::Committed => "committed",
            TransactionState::RolledBack => "rolled back",
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Inner {
    state: TransactionState,
    connection: Option<ManagedConnection>,
}

impl Inner {
    fn active(&self, operation: &'static str) -> Result<&ManagedConnection> {
        match &self.connection {
            Some(conn) if self.state == TransactionState::Active => Ok(conn),
            _ => Err(TidepoolError::TransactionState {
                operation,
                state: self.state.as_str(),
            }),
        }
    }
}

/// A transaction running on a connection it owns exclusively
///
/// Created by `ConnectionManager::begin_transaction`. `commit` and
/// `rollback` are terminal; once either succeeds the connection has been
/// handed back to the pool and every further call fails with
/// `TidepoolError::TransactionState`.
///
/// A failed `COMMIT` leaves the transaction active so the caller can still
/// roll back. A failed `ROLLBACK` destroys the connection, since its
/// server-side transaction state is unknown. Dropping an active
/// transaction drops its connection instead of returning it to the pool.
pub struct ManagedTransaction {
    session_id: u64,
    inner: Mutex<Inner>,
}

impl ManagedTransaction {
    /// Issue `START TRANSACTION` on `connection` and take ownership of it.
    ///
    /// On failure the connection is destroyed.
    pub(crate) async fn begin(connection: ManagedConnection) -> Result<Self> {
        let session_id = connection.session_id();
        connection.set_discard_on_drop(true);

        if let Err(err) = connection.start_transaction().await {
            tracing::warn!(session_id, error = %err, "failed to start transaction");
            if let Err(destroy_err) = connection.destroy().await {
                tracing::debug!(session_id, error = %destroy_err, "failed to destroy connection");
            }
            return Err(err);
        }

        tracing::debug!(session_id, "transaction started");
        Ok(Self {
            session_id,
            inner: Mutex::new(Inner {
                state: TransactionState::Active,
                connection: Some(connection),
            }),
        })
    }

    /// Server session id the transaction runs on
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub async fn state(&self) -> TransactionState {
        self.inner.lock().await.state
    }

    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let inner = self.inner.lock().await;
        inner.active("query")?.query(sql, params).await
    }

    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        let inner = self.inner.lock().await;
        inner.active("execute")?.execute(sql, params).await
    }

    pub async fn commit(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.active("commit")?.commit().await?;

        inner.state = TransactionState::Committed;
        tracing::debug!(session_id = self.session_id, "transaction committed");

        match inner.connection.take() {
            Some(conn) => {
                conn.set_discard_on_drop(false);
                conn.release().await
            }
            None => Ok(()),
        }
    }

    pub async fn rollback(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let result = inner.active("rollback")?.rollback().await;

        inner.state = TransactionState::RolledBack;
        let Some(conn) = inner.connection.take() else {
            return result;
        };

        match result {
            Ok(()) => {
                tracing::debug!(session_id = self.session_id, "transaction rolled back");
                conn.set_discard_on_drop(false);
                conn.release().await
            }
            Err(err) => {
                tracing::warn!(
                    session_id = self.session_id,
                    error = %err,
                    "rollback failed, destroying connection"
                );
                if let Err(destroy_err) = conn.destroy().await {
                    tracing::debug!(session_id = self.session_id, error = %destroy_err, "failed to destroy connection");
                }
                Err(err)
            }
        }
    }
}

impl Drop for ManagedTransaction {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if inner.state == TransactionState::Active {
            tracing::warn!(
                session_id = self.session_id,
                "transaction dropped while active, discarding its connection"
            );
        }
    }
}

impl fmt::Debug for ManagedTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedTransaction")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}
