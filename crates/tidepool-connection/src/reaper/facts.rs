//! Server-side connection facts and their row decoding

use serde::{Deserialize, Serialize};
use tidepool_core::{QueryResult, Result, Row, TidepoolError};

fn column_u64(row: &Row, column: &str) -> Result<u64> {
    row.get_by_name(column)
        .and_then(|value| value.as_u64())
        .ok_or_else(|| TidepoolError::Query(format!("missing or invalid column `{column}`")))
}

fn first_row<'a>(result: &'a QueryResult, what: &str) -> Result<&'a Row> {
    result
        .first()
        .ok_or_else(|| TidepoolError::Query(format!("{what} query returned no rows")))
}

/// How many connections the credential may hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConnectionLimit {
    /// Effective ceiling
    pub total: u64,
    /// Whether the ceiling comes from a per-user limit
    pub user_scoped: bool,
}

impl ServerConnectionLimit {
    pub fn from_result(result: &QueryResult) -> Result<Self> {
        let row = first_row(result, "connection limit")?;
        Ok(Self {
            total: column_u64(row, "total")?,
            user_scoped: row
                .get_by_name("user_limit")
                .and_then(|value| value.as_bool())
                .unwrap_or(false),
        })
    }
}

/// What the credential currently holds on the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConnectionUsage {
    /// Sessions attributed to the user
    pub used: u64,
    /// Longest time any of them has been in its current state, in seconds
    pub max_idle_secs: u64,
}

impl ServerConnectionUsage {
    pub fn from_result(result: &QueryResult) -> Result<Self> {
        let row = first_row(result, "connection usage")?;
        Ok(Self {
            used: column_u64(row, "total")?,
            max_idle_secs: row
                .get_by_name("max_age")
                .and_then(|value| value.as_u64())
                .unwrap_or(0),
        })
    }

    /// `used / limit.total`, or `None` when the ceiling is unknown
    pub fn utilization(&self, limit: &ServerConnectionLimit) -> Option<f64> {
        (limit.total > 0).then(|| self.used as f64 / limit.total as f64)
    }
}

/// One candidate for killing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepingSession {
    pub session_id: u64,
    pub idle_secs: u64,
}

impl SleepingSession {
    pub fn from_result(result: &QueryResult) -> Result<Vec<Self>> {
        result
            .rows
            .iter()
            .map(|row| {
                Ok(Self {
                    session_id: column_u64(row, "ID")?,
                    idle_secs: column_u64(row, "TIME")?,
                })
            })
            .collect()
    }
}
