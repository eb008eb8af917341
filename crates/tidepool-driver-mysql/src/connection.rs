//! MySQL session implementation

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Opts, Row as MySqlRow};
use tidepool_core::{Connection, QueryResult, Result, StatementResult, TidepoolError, Value};
use tokio::sync::Mutex;

use crate::convert::{rows_to_result, to_params};

/// One physical MySQL session.
///
/// Unlike a `mysql_async::Pool`, this wraps a single `Conn`, so the session id
/// reported here is the thread id the server shows in `PROCESSLIST` and the id
/// a `KILL` from another session targets.
pub struct MySqlConnection {
    conn: Mutex<Option<Conn>>,
    session_id: u64,
    closed: AtomicBool,
}

impl MySqlConnection {
    /// Open a new session
    pub async fn connect(opts: Opts) -> Result<Self> {
        tracing::debug!(
            host = %opts.ip_or_hostname(),
            port = opts.tcp_port(),
            user = ?opts.user(),
            "opening MySQL session"
        );

        let conn = Conn::new(opts)
            .await
            .map_err(|e| TidepoolError::Connection(format!("Failed to connect to MySQL: {}", e)))?;
        let session_id = u64::from(conn.id());

        tracing::info!(session_id, "MySQL session opened");

        Ok(Self {
            conn: Mutex::new(Some(conn)),
            session_id,
            closed: AtomicBool::new(false),
        })
    }

    /// Map a driver error, marking the session closed when the socket is gone
    fn map_error(&self, context: &str, err: mysql_async::Error) -> TidepoolError {
        let lost = matches!(
            err,
            mysql_async::Error::Io(_)
                | mysql_async::Error::Driver(mysql_async::DriverError::ConnectionClosed)
        );
        if lost {
            self.closed.store(true, Ordering::SeqCst);
            tracing::warn!(session_id = self.session_id, error = %err, "MySQL session lost");
            TidepoolError::Connection(format!("{}: {}", context, err))
        } else {
            TidepoolError::Query(format!("{}: {}", context, err))
        }
    }
}

#[async_trait]
impl Connection for MySqlConnection {
    fn driver_name(&self) -> &str {
        "mysql"
    }

    fn session_id(&self) -> u64 {
        self.session_id
    }

    #[tracing::instrument(skip(self, sql, params), fields(session_id = self.session_id, sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(|| TidepoolError::Connection("MySQL session is closed".into()))?;

        let outcome = if params.is_empty() {
            conn.query_drop(sql).await
        } else {
            conn.exec_drop(sql, to_params(params)).await
        };
        outcome.map_err(|e| self.map_error("Failed to execute statement", e))?;

        Ok(StatementResult {
            affected_rows: conn.affected_rows(),
        })
    }

    #[tracing::instrument(skip(self, sql, params), fields(session_id = self.session_id, sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let start_time = std::time::Instant::now();
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(|| TidepoolError::Connection("MySQL session is closed".into()))?;

        let rows: Vec<MySqlRow> = if params.is_empty() {
            conn.query::<MySqlRow, _>(sql).await
        } else {
            conn.exec::<MySqlRow, _, _>(sql, to_params(params)).await
        }
        .map_err(|e| self.map_error("Failed to execute query", e))?;

        let mut result = rows_to_result(rows);
        result.execution_time_ms = start_time.elapsed().as_millis() as u64;
        tracing::debug!(rows = result.row_count(), "query complete");
        Ok(result)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        let Some(conn) = self.conn.lock().await.take() else {
            return Ok(());
        };
        tracing::debug!(session_id = self.session_id, "closing MySQL session");
        conn.disconnect()
            .await
            .map_err(|e| TidepoolError::Connection(format!("Failed to close MySQL session: {}", e)))
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
