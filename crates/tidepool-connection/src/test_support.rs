//! Scripted server doubles shared by the unit tests

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tidepool_core::{Connection, QueryResult, Result, StatementResult, TidepoolError, Value};

use crate::pool::ConnectionFactory;
use crate::reaper::statements;

/// Route log output through the test harness; set `RUST_LOG` to see it
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Shared state standing in for the database server
pub(crate) struct MockServer {
    /// (total, user_limit) returned by the limit query
    pub limit: Mutex<(u64, bool)>,
    /// (total, max_age) returned by the usage query
    pub usage: Mutex<(u64, u64)>,
    /// (session id, idle seconds) of sleeping sessions
    pub sleeping: Mutex<Vec<(u64, u64)>>,
    /// Session ids whose KILL fails
    pub kill_failures: Mutex<HashSet<u64>>,
    /// Statements that fail when executed
    pub failing: Mutex<HashSet<String>>,
    /// Failing statements also close the connection
    pub close_on_failure: AtomicBool,
    pub killed: Mutex<Vec<u64>>,
    /// (session id, statement) in execution order
    pub log: Mutex<Vec<(u64, String)>>,
    pub limit_fetches: AtomicUsize,
    pub usage_fetches: AtomicUsize,
}

impl MockServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            limit: Mutex::new((100, false)),
            usage: Mutex::new((1, 0)),
            sleeping: Mutex::new(Vec::new()),
            kill_failures: Mutex::new(HashSet::new()),
            failing: Mutex::new(HashSet::new()),
            close_on_failure: AtomicBool::new(false),
            killed: Mutex::new(Vec::new()),
            log: Mutex::new(Vec::new()),
            limit_fetches: AtomicUsize::new(0),
            usage_fetches: AtomicUsize::new(0),
        })
    }

    pub fn set_limit(&self, total: u64, user_limit: bool) {
        *self.limit.lock() = (total, user_limit);
    }

    pub fn set_usage(&self, total: u64, max_age: u64) {
        *self.usage.lock() = (total, max_age);
    }

    pub fn set_sleeping(&self, sessions: &[(u64, u64)]) {
        *self.sleeping.lock() = sessions.to_vec();
    }

    pub fn fail(&self, statement: &str) {
        self.failing.lock().insert(statement.to_string());
    }

    pub fn recover(&self, statement: &str) {
        self.failing.lock().remove(statement);
    }

    pub fn killed(&self) -> Vec<u64> {
        self.killed.lock().clone()
    }

    /// Statements run on one session
    pub fn statements_for(&self, session_id: u64) -> Vec<String> {
        self.log
            .lock()
            .iter()
            .filter(|(id, _)| *id == session_id)
            .map(|(_, sql)| sql.clone())
            .collect()
    }
}

pub(crate) struct MockConnection {
    session_id: u64,
    closed: AtomicBool,
    server: Arc<MockServer>,
}

impl MockConnection {
    pub fn new(session_id: u64, server: Arc<MockServer>) -> Self {
        Self {
            session_id,
            closed: AtomicBool::new(false),
            server,
        }
    }

    fn record(&self, sql: &str) -> Result<()> {
        if self.is_closed() {
            return Err(TidepoolError::Connection("connection is closed".into()));
        }
        self.server
            .log
            .lock()
            .push((self.session_id, sql.to_string()));
        if self.server.failing.lock().contains(sql) {
            if self.server.close_on_failure.load(Ordering::SeqCst) {
                self.closed.store(true, Ordering::SeqCst);
            }
            return Err(TidepoolError::Query(format!("statement failed: {sql}")));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn driver_name(&self) -> &str {
        "mock"
    }

    fn session_id(&self) -> u64 {
        self.session_id
    }

    async fn execute(&self, sql: &str, _params: &[Value]) -> Result<StatementResult> {
        self.record(sql)?;
        if let Some(target) = sql.strip_prefix("KILL ").and_then(|id| id.parse::<u64>().ok()) {
            if self.server.kill_failures.lock().contains(&target) {
                return Err(TidepoolError::Query(format!("Unknown thread id: {target}")));
            }
            self.server.killed.lock().push(target);
        }
        Ok(StatementResult { affected_rows: 0 })
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.record(sql)?;
        let columns = |names: &[&str]| names.iter().map(|n| n.to_string()).collect::<Vec<_>>();
        let result = match sql {
            statements::SERVER_CONNECTION_LIMIT => {
                self.server.limit_fetches.fetch_add(1, Ordering::SeqCst);
                let (total, user_limit) = *self.server.limit.lock();
                QueryResult::from_rows(
                    columns(&["total", "user_limit"]),
                    vec![vec![Value::UInt64(total), Value::Int64(i64::from(user_limit))]],
                )
            }
            statements::SERVER_CONNECTION_USAGE => {
                self.server.usage_fetches.fetch_add(1, Ordering::SeqCst);
                let (total, max_age) = *self.server.usage.lock();
                QueryResult::from_rows(
                    columns(&["total", "max_age"]),
                    vec![vec![Value::Int64(total as i64), Value::Decimal(max_age.to_string())]],
                )
            }
            statements::SLEEPING_SESSIONS => {
                let min_idle = params.first().and_then(Value::as_u64).unwrap_or_default();
                let mut sessions: Vec<(u64, u64)> = self
                    .server
                    .sleeping
                    .lock()
                    .iter()
                    .copied()
                    .filter(|(_, time)| *time >= min_idle)
                    .collect();
                sessions.sort_by(|a, b| b.1.cmp(&a.1));
                QueryResult::from_rows(
                    columns(&["ID", "TIME"]),
                    sessions
                        .into_iter()
                        .map(|(id, time)| vec![Value::UInt64(id), Value::Int64(time as i64)])
                        .collect(),
                )
            }
            _ => QueryResult::from_rows(columns(&["value"]), vec![vec![Value::Int64(1)]]),
        };
        Ok(result)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Factory handing out `MockConnection`s with increasing session ids
pub(crate) struct MockFactory {
    server: Arc<MockServer>,
    next_id: AtomicU64,
    failures_remaining: AtomicU32,
    attempts: AtomicUsize,
    created: Mutex<Vec<Arc<MockConnection>>>,
}

impl MockFactory {
    pub fn new(server: Arc<MockServer>) -> Arc<Self> {
        Arc::new(Self {
            server,
            next_id: AtomicU64::new(100),
            failures_remaining: AtomicU32::new(0),
            attempts: AtomicUsize::new(0),
            created: Mutex::new(Vec::new()),
        })
    }

    /// Make the next `count` create calls fail
    pub fn fail_next(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> usize {
        self.created.lock().len()
    }

    /// Connection created with the given session id
    pub fn connection(&self, session_id: u64) -> Option<Arc<MockConnection>> {
        self.created
            .lock()
            .iter()
            .find(|conn| conn.session_id == session_id)
            .cloned()
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TidepoolError::Connection("connection refused".into()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let conn = Arc::new(MockConnection::new(id, self.server.clone()));
        self.created.lock().push(conn.clone());
        Ok(conn)
    }
}
