//! Tests for managed connections and transactions

use std::sync::Arc;

use pretty_assertions::assert_eq;
use tidepool_core::{Connection, TidepoolError};

use super::*;
use crate::pool::{ConnectionPool, PoolConfig};
use crate::test_support::{MockFactory, MockServer};
use crate::tracker::IdleTracker;

struct Fixture {
    pool: ConnectionPool,
    factory: Arc<MockFactory>,
    server: Arc<MockServer>,
    tracker: Arc<IdleTracker>,
}

impl Fixture {
    fn new() -> Self {
        let server = MockServer::new();
        let factory = MockFactory::new(server.clone());
        let pool = ConnectionPool::new(PoolConfig::new(4), factory.clone());
        let tracker = Arc::new(IdleTracker::new());
        pool.subscribe(tracker.clone());
        Self {
            pool,
            factory,
            server,
            tracker,
        }
    }

    async fn connection(&self) -> ManagedConnection {
        ManagedConnection::new(self.pool.acquire().await.unwrap())
    }

    async fn transaction(&self) -> ManagedTransaction {
        ManagedTransaction::begin(self.connection().await).await.unwrap()
    }
}

fn assert_connection_state_error(err: TidepoolError, expected_operation: &str, expected_state: &str) {
    match err {
        TidepoolError::ConnectionState { operation, state } => {
            assert_eq!(operation, expected_operation);
            assert_eq!(state, expected_state);
        }
        other => panic!("expected connection state error, got {other:?}"),
    }
}

fn assert_transaction_state_error(err: TidepoolError, expected_state: &str) {
    match err {
        TidepoolError::TransactionState { state, .. } => assert_eq!(state, expected_state),
        other => panic!("expected transaction state error, got {other:?}"),
    }
}

// =============================================================================
// ManagedConnection tests
// =============================================================================

#[tokio::test]
async fn test_release_returns_connection_to_idle_set() {
    let fx = Fixture::new();
    let conn = fx.connection().await;
    let id = conn.session_id();

    conn.query("SELECT 1", &[]).await.unwrap();
    conn.release().await.unwrap();

    assert_eq!(conn.state(), ConnectionState::Released);
    assert!(fx.tracker.contains(id));
    assert!(conn.is_closed());
}

#[tokio::test]
async fn test_destroy_after_release_is_rejected() {
    let fx = Fixture::new();
    let conn = fx.connection().await;

    conn.release().await.unwrap();
    let err = conn.destroy().await.unwrap_err();

    assert_connection_state_error(err, "destroy", "released");
    assert_eq!(fx.pool.stats().idle(), 1);
}

#[tokio::test]
async fn test_release_after_destroy_is_rejected() {
    let fx = Fixture::new();
    let conn = fx.connection().await;
    let id = conn.session_id();

    conn.destroy().await.unwrap();
    let err = conn.release().await.unwrap_err();

    assert_connection_state_error(err, "release", "destroyed");
    assert!(!fx.tracker.contains(id));
    assert!(fx.factory.connection(id).unwrap().is_closed());
    assert_eq!(fx.pool.stats().total(), 0);
}

#[tokio::test]
async fn test_query_after_release_is_rejected() {
    let fx = Fixture::new();
    let conn = fx.connection().await;
    conn.release().await.unwrap();

    let err = conn.query("SELECT 1", &[]).await.unwrap_err();
    assert_connection_state_error(err, "query", "released");
}

#[tokio::test]
async fn test_dropping_acquired_connection_releases_it() {
    let fx = Fixture::new();
    let conn = fx.connection().await;
    let id = conn.session_id();

    drop(conn);
    assert!(fx.tracker.contains(id));
}

// =============================================================================
// ManagedTransaction tests
// =============================================================================

#[tokio::test]
async fn test_commit_releases_connection_once() {
    let fx = Fixture::new();
    let tx = fx.transaction().await;
    let id = tx.session_id();
    assert!(!fx.tracker.contains(id));

    tx.query("SELECT 1", &[]).await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(tx.state().await, TransactionState::Committed);
    assert!(fx.tracker.contains(id));
    assert_eq!(
        fx.server.statements_for(id),
        vec!["START TRANSACTION", "SELECT 1", "COMMIT"]
    );

    assert_transaction_state_error(tx.query("SELECT 1", &[]).await.unwrap_err(), "committed");
    assert_transaction_state_error(tx.commit().await.unwrap_err(), "committed");
    assert_transaction_state_error(tx.rollback().await.unwrap_err(), "committed");
    assert_eq!(fx.pool.stats().idle(), 1);
}

#[tokio::test]
async fn test_commit_after_rollback_is_rejected() {
    let fx = Fixture::new();
    let tx = fx.transaction().await;
    let id = tx.session_id();

    tx.rollback().await.unwrap();
    let err = tx.commit().await.unwrap_err();

    assert_transaction_state_error(err, "rolled back");
    assert!(fx.tracker.contains(id));
    assert_eq!(fx.pool.stats().idle(), 1);
    assert_eq!(
        fx.server.statements_for(id),
        vec!["START TRANSACTION", "ROLLBACK"]
    );
}

#[tokio::test]
async fn test_failed_commit_stays_active() {
    let fx = Fixture::new();
    let tx = fx.transaction().await;
    fx.server.fail("COMMIT");

    assert!(matches!(
        tx.commit().await.unwrap_err(),
        TidepoolError::Query(_)
    ));
    assert_eq!(tx.state().await, TransactionState::Active);

    tx.rollback().await.unwrap();
    assert_eq!(tx.state().await, TransactionState::RolledBack);
    assert!(fx.tracker.contains(tx.session_id()));
}

#[tokio::test]
async fn test_failed_rollback_destroys_connection() {
    let fx = Fixture::new();
    let tx = fx.transaction().await;
    let id = tx.session_id();
    fx.server.fail("ROLLBACK");

    assert!(tx.rollback().await.is_err());
    assert_eq!(tx.state().await, TransactionState::RolledBack);
    assert!(!fx.tracker.contains(id));
    assert!(fx.factory.connection(id).unwrap().is_closed());
    assert_eq!(fx.pool.stats().total(), 0);
}

#[tokio::test]
async fn test_failed_begin_destroys_connection() {
    let fx = Fixture::new();
    fx.server.fail("START TRANSACTION");
    let conn = fx.connection().await;
    let id = conn.session_id();

    assert!(ManagedTransaction::begin(conn).await.is_err());
    assert!(fx.factory.connection(id).unwrap().is_closed());
    assert_eq!(fx.pool.stats().total(), 0);
}

#[tokio::test]
async fn test_dropped_active_transaction_is_not_pooled() {
    let fx = Fixture::new();
    let tx = fx.transaction().await;
    let id = tx.session_id();

    drop(tx);

    assert!(!fx.tracker.contains(id));
    assert_eq!(fx.pool.stats().total(), 0);
}
