use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tidepool_core::{Connection, QueryResult, Result, StatementResult, TidepoolError, Value};

use crate::pool::PooledConnection;

/// Lifecycle of a managed connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Checked out and usable
    Acquired,
    /// Returned to the pool
    Released,
    /// Closed for good
    Destroyed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Acquired => "acquired",
            ConnectionState::Released => "released",
            ConnectionState::Destroyed => "destroyed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConnectionState::Acquired)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Slot {
    state: ConnectionState,
    pooled: Option<PooledConnection>,
}

/// A connection handed out by the manager
///
/// Statements are delegated to the underlying session while the handle is
/// `Acquired`. `release` returns the session to the pool and `destroy`
/// closes it; whichever runs first wins and any later call fails with
/// `TidepoolError::ConnectionState`. Dropping an acquired handle releases
/// the session.
pub struct ManagedConnection {
    session_id: u64,
    slot: Mutex<Slot>,
}

impl ManagedConnection {
    pub(crate) fn new(pooled: PooledConnection) -> Self {
        Self {
            session_id: pooled.session_id(),
            slot: Mutex::new(Slot {
                state: ConnectionState::Acquired,
                pooled: Some(pooled),
            }),
        }
    }

    /// Server session id of the wrapped connection
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn state(&self) -> ConnectionState {
        self.slot.lock().state
    }

    /// Whether the handle is terminal or the session reports itself closed
    pub fn is_closed(&self) -> bool {
        let slot = self.slot.lock();
        match &slot.pooled {
            Some(pooled) if slot.state == ConnectionState::Acquired => pooled.is_closed(),
            _ => true,
        }
    }

    /// Clone the session out so no lock is held while a statement runs.
    fn session(&self, operation: &'static str) -> Result<Arc<dyn Connection>> {
        let slot = self.slot.lock();
        match &slot.pooled {
            Some(pooled) if slot.state == ConnectionState::Acquired => Ok(pooled.inner().clone()),
            _ => Err(TidepoolError::ConnectionState {
                operation,
                state: slot.state.as_str(),
            }),
        }
    }

    /// Move to a terminal state and hand the pool connection to the caller.
    fn finish(&self, operation: &'static str, next: ConnectionState) -> Result<PooledConnection> {
        let mut slot = self.slot.lock();
        let state = slot.state;
        match slot.pooled.take() {
            Some(pooled) if state == ConnectionState::Acquired => {
                slot.state = next;
                Ok(pooled)
            }
            pooled => {
                slot.pooled = pooled;
                Err(TidepoolError::ConnectionState {
                    operation,
                    state: state.as_str(),
                })
            }
        }
    }

    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.session("query")?.query(sql, params).await
    }

    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        self.session("execute")?.execute(sql, params).await
    }

    pub(crate) async fn start_transaction(&self) -> Result<()> {
        self.session("start a transaction on")?
            .start_transaction()
            .await
    }

    pub(crate) async fn commit(&self) -> Result<()> {
        self.session("commit on")?.commit().await
    }

    pub(crate) async fn rollback(&self) -> Result<()> {
        self.session("roll back on")?.rollback().await
    }

    /// See `PooledConnection::set_discard_on_drop`
    pub(crate) fn set_discard_on_drop(&self, discard: bool) {
        if let Some(pooled) = self.slot.lock().pooled.as_mut() {
            pooled.set_discard_on_drop(discard);
        }
    }

    /// Return the session to the pool
    pub async fn release(&self) -> Result<()> {
        let pooled = self.finish("release", ConnectionState::Released)?;
        tracing::trace!(session_id = self.session_id, "releasing connection");
        pooled.release().await
    }

    /// Close the session; it is never handed out again
    pub async fn destroy(&self) -> Result<()> {
        let pooled = self.finish("destroy", ConnectionState::Destroyed)?;
        tracing::debug!(session_id = self.session_id, "destroying connection");
        pooled.destroy().await
    }
}

impl fmt::Debug for ManagedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedConnection")
            .field("session_id", &self.session_id)
            .field("state", &self.state())
            .finish()
    }
}
