//! Connection lifecycle manager

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tidepool_core::{QueryResult, Result, StatementResult, TidepoolError, Value};
use tokio::sync::broadcast;

use crate::config::ManagerConfig;
use crate::events::{EventBus, ManagerEvent};
use crate::managed::{ManagedConnection, ManagedTransaction};
use crate::pool::{ConnectionFactory, ConnectionPool, PoolStats};
use crate::reaper::{ReapOutcome, ServerConnectionLimit, ServerConnectionUsage, ZombieReaper};
use crate::retry::{RetryPolicy, retry};
use crate::tracker::IdleTracker;

/// Snapshot of the manager's local and last-observed server state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManagerStats {
    /// Tracked idle connections
    pub idle: usize,
    pub pool: PoolStats,
    /// Acquisition attempts that failed and were retried
    pub retries: u64,
    /// Zombie sessions killed
    pub kills: u64,
    /// Failed acquisitions, statements and maintenance steps
    pub errors: u64,
    pub limit: Option<ServerConnectionLimit>,
    pub usage: Option<ServerConnectionUsage>,
}

/// What one `flush` did
#[derive(Debug, Clone, PartialEq)]
pub struct FlushReport {
    /// Idle connections disconnected to reach the keep-alive floor
    pub disconnected: usize,
    /// Reaping result, when zombie cleanup is enabled
    pub reap: Option<ReapOutcome>,
}

impl FlushReport {
    /// Zombie sessions killed during the flush
    pub fn killed(&self) -> usize {
        self.reap.as_ref().map_or(0, ReapOutcome::killed_count)
    }
}

#[derive(Default)]
struct Counters {
    retries: AtomicU64,
    kills: AtomicU64,
    errors: AtomicU64,
}

/// Owns a pool and everything layered on top of it: retrying acquisition,
/// idle tracking, zombie reaping and transactions.
///
/// Meant to be created once per process and shared (`Arc`) between tasks.
/// Call `flush` at the end of each unit of work to trim idle connections
/// and reclaim server-side zombies, and `end` to shut everything down.
pub struct ConnectionManager {
    config: ManagerConfig,
    pool: ConnectionPool,
    tracker: Arc<IdleTracker>,
    reaper: ZombieReaper,
    retry: RetryPolicy,
    events: EventBus,
    counters: Counters,
}

impl ConnectionManager {
    /// Validate `config` and build the pool on top of `factory`
    pub fn new<F: ConnectionFactory>(config: ManagerConfig, factory: F) -> Result<Self> {
        config.validate()?;

        let pool = ConnectionPool::new(config.pool().clone(), factory);
        let tracker = Arc::new(IdleTracker::new());
        pool.subscribe(tracker.clone());

        let reaper = ZombieReaper::new(
            config.connection().user.clone(),
            config.reap_policy(),
            config.max_conns_freq(),
            config.used_conns_freq(),
        );

        tracing::debug!(
            max_size = config.pool().max_size(),
            keep_alive = config.keep_alive(),
            zombie_cleanup = config.zombie_cleanup(),
            "connection manager created"
        );

        Ok(Self {
            retry: config.retry_policy(),
            config,
            pool,
            tracker,
            reaper,
            events: EventBus::new(),
            counters: Counters::default(),
        })
    }

    /// Receive lifecycle events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Number of connections currently idle in the pool
    pub fn idle_count(&self) -> usize {
        self.tracker.len()
    }

    /// Session ids of the connections currently idle in the pool
    pub fn idle_session_ids(&self) -> Vec<u64> {
        self.tracker.session_ids()
    }

    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            idle: self.tracker.len(),
            pool: self.pool.stats(),
            retries: self.counters.retries.load(Ordering::Relaxed),
            kills: self.counters.kills.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            limit: self.reaper.cached_limit(),
            usage: self.reaper.cached_usage(),
        }
    }

    fn record_error(&self) {
        self.counters.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Acquire a connection, retrying with a constant delay
    #[tracing::instrument(skip(self))]
    pub async fn get_connection(&self) -> Result<ManagedConnection> {
        let policy = self.retry;
        let result = retry(
            &policy,
            |attempt, err| {
                self.counters.retries.fetch_add(1, Ordering::Relaxed);
                self.events.emit(ManagerEvent::Retry {
                    attempt,
                    max_attempts: policy.max_attempts(),
                    error: err.to_string(),
                });
            },
            |_| self.pool.acquire(),
        )
        .await;

        match result {
            Ok(pooled) => {
                let conn = ManagedConnection::new(pooled);
                tracing::debug!(session_id = conn.session_id(), "connection acquired");
                self.events.emit(ManagerEvent::Connected {
                    session_id: conn.session_id(),
                });
                Ok(conn)
            }
            Err(err) => {
                self.record_error();
                if let TidepoolError::Acquisition { attempts, source } = &err {
                    self.events.emit(ManagerEvent::AcquireFailed {
                        attempts: *attempts,
                        error: source.to_string(),
                    });
                }
                Err(err)
            }
        }
    }

    /// Hand a one-shot connection back: destroy it if it broke, otherwise
    /// release it.
    async fn finish(&self, conn: ManagedConnection, failed: bool) {
        let session_id = conn.session_id();
        let result = if failed && conn.is_closed() {
            conn.destroy().await
        } else {
            conn.release().await
        };
        if let Err(err) = result {
            tracing::warn!(session_id, error = %err, "failed to return connection");
        }
    }

    /// Run one query on a connection acquired for it
    #[tracing::instrument(skip(self, params))]
    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let conn = self.get_connection().await?;
        let result = conn.query(sql, params).await;
        if result.is_err() {
            self.record_error();
        }
        self.finish(conn, result.is_err()).await;
        result
    }

    /// Run one statement on a connection acquired for it
    #[tracing::instrument(skip(self, params))]
    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        let conn = self.get_connection().await?;
        let result = conn.execute(sql, params).await;
        if result.is_err() {
            self.record_error();
        }
        self.finish(conn, result.is_err()).await;
        result
    }

    /// Start a transaction on a connection it owns until commit or rollback
    #[tracing::instrument(skip(self))]
    pub async fn begin_transaction(&self) -> Result<ManagedTransaction> {
        let conn = self.get_connection().await?;
        ManagedTransaction::begin(conn)
            .await
            .inspect_err(|_| self.record_error())
    }

    /// One maintenance pass.
    ///
    /// Disconnects idle connections down to `keep_alive`, then, when zombie
    /// cleanup is enabled, reaps server-side zombies using a connection
    /// reserved before the disconnects. The reserved connection is destroyed
    /// unless the idle set is below a non-zero keep-alive floor, in which
    /// case it is released to refill it.
    #[tracing::instrument(skip(self), fields(keep_alive = self.config.keep_alive()))]
    pub async fn flush(&self) -> Result<FlushReport> {
        let keep_alive = self.config.keep_alive();

        let reserved = if self.config.zombie_cleanup() {
            Some(self.get_connection().await?)
        } else {
            None
        };

        let mut disconnected = 0;
        while let Some(idle) = self.tracker.pop_over(keep_alive) {
            let session_id = idle.session_id();
            match idle.disconnect().await {
                Ok(true) => {
                    tracing::debug!(session_id, "disconnected idle connection");
                    disconnected += 1;
                }
                Ok(false) => {
                    tracing::debug!(session_id, "idle connection was checked out before disconnect");
                }
                Err(err) => {
                    self.record_error();
                    tracing::warn!(session_id, error = %err, "failed to disconnect idle connection");
                }
            }
        }

        let mut report = FlushReport {
            disconnected,
            reap: None,
        };

        if let Some(conn) = reserved {
            let reaped = self.reaper.reap(&conn).await;

            let session_id = conn.session_id();
            let returned = if keep_alive == 0 || self.tracker.len() >= keep_alive {
                conn.destroy().await
            } else {
                conn.release().await
            };
            if let Err(err) = returned {
                tracing::warn!(session_id, error = %err, "failed to return reserved connection");
            }

            let outcome = reaped.inspect_err(|err| {
                self.record_error();
                tracing::warn!(error = %err, "zombie reaping failed");
            })?;

            self.counters
                .kills
                .fetch_add(outcome.killed.len() as u64, Ordering::Relaxed);
            for session_id in &outcome.killed {
                self.events.emit(ManagerEvent::Killed {
                    session_id: *session_id,
                });
            }
            for failure in &outcome.failures {
                self.events.emit(ManagerEvent::KillFailed {
                    session_id: failure.session_id,
                    error: failure.error.clone(),
                });
            }
            report.reap = Some(outcome);
        }

        tracing::info!(
            disconnected = report.disconnected,
            killed = report.killed(),
            idle = self.tracker.len(),
            "flush complete"
        );
        self.events.emit(ManagerEvent::Flushed {
            disconnected: report.disconnected,
            killed: report.killed(),
        });
        Ok(report)
    }

    /// Query the connection ceiling and usage, bypassing the caches
    #[tracing::instrument(skip(self))]
    pub async fn server_usage(&self) -> Result<(ServerConnectionLimit, ServerConnectionUsage)> {
        let conn = self.get_connection().await?;
        self.reaper.invalidate();
        let result = self.reaper.observe(&conn).await;
        if result.is_err() {
            self.record_error();
        }
        self.finish(conn, result.is_err()).await;
        result
    }

    /// Close the pool and every idle connection
    #[tracing::instrument(skip(self))]
    pub async fn end(&self) -> Result<()> {
        tracing::info!("shutting down connection manager");
        let result = self.pool.close().await;
        self.tracker.clear();
        self.events.emit(ManagerEvent::Closed);
        result
    }
}
