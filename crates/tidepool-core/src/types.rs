//! Core types for tidepool

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A database value that can represent any SQL type the manager needs to
/// bind or decode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    /// 64-bit unsigned integer (session ids, counters)
    UInt64(u64),
    Float64(f64),
    /// DECIMAL text exactly as the server sent it
    Decimal(String),
    String(String),
    /// Raw bytes that were not valid UTF-8
    Bytes(Vec<u8>),
    Date(NaiveDate),
    /// TIME values within one day
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Json(serde_json::Value),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view; `UInt64` above `i64::MAX` yields `None`
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            Value::UInt64(v) => i64::try_from(*v).ok(),
            Value::Bool(v) => Some(*v as i64),
            Value::Decimal(s) | Value::String(s) => s.parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Try to get as u64
    ///
    /// Negative integers yield `None`.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt64(v) => Some(*v),
            Value::Int64(v) => u64::try_from(*v).ok(),
            Value::Bool(v) => Some(*v as u64),
            Value::Decimal(s) | Value::String(s) => s.parse::<u64>().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(v) => Some(*v),
            Value::Int64(v) => Some(*v as f64),
            Value::UInt64(v) => Some(*v as f64),
            Value::Decimal(s) | Value::String(s) => s.parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Boolean view.
    ///
    /// MySQL reports boolean expressions as `0`/`1`, so integers are accepted.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            Value::Int64(v) => Some(*v != 0),
            Value::UInt64(v) => Some(*v != 0),
            Value::String(s) => match s.as_str() {
                "1" | "true" | "TRUE" => Some(true),
                "0" | "false" | "FALSE" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::UInt64(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::Decimal(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Value::Date(v) => write!(f, "{}", v),
            Value::Time(v) => write!(f, "{}", v),
            Value::DateTime(v) => write!(f, "{}", v),
            Value::Json(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

/// One result row; carries its column labels for lookups by name
#[derive(Debug, Clone)]
pub struct Row {
    pub values: Vec<Value>,
    /// Column names
    columns: Vec<String>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { values, columns }
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Get a value by column name (ASCII case-insensitive; servers disagree on
    /// the case of `information_schema` column labels)
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .and_then(|idx| self.values.get(idx))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Column label to value
    pub fn to_map(&self) -> HashMap<String, Value> {
        self.columns
            .iter()
            .zip(self.values.iter())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Rows returned by a query
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    /// Column names, in result order
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// Rows changed by the statement, when the driver reports it
    pub affected_rows: u64,
    /// Wall time spent in the driver, in milliseconds
    pub execution_time_ms: u64,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a result from column names and row values
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let rows = rows
            .into_iter()
            .map(|values| Row::new(columns.clone(), values))
            .collect();
        Self {
            columns,
            rows,
            affected_rows: 0,
            execution_time_ms: 0,
        }
    }

    pub fn has_rows(&self) -> bool {
        !self.rows.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// First row, if any
    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }
}

/// Result of a statement that does not return rows
#[derive(Debug, Clone, Default)]
pub struct StatementResult {
    /// Rows affected
    pub affected_rows: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_numeric_conversions() {
        assert_eq!(Value::Int64(42).as_u64(), Some(42));
        assert_eq!(Value::Int64(-1).as_u64(), None);
        assert_eq!(Value::UInt64(7).as_i64(), Some(7));
        assert_eq!(Value::UInt64(u64::MAX).as_i64(), None);
        assert_eq!(Value::Decimal("500".into()).as_u64(), Some(500));
        assert_eq!(Value::String("0.75".into()).as_f64(), Some(0.75));
        assert_eq!(Value::Null.as_u64(), None);
    }

    #[test]
    fn test_value_as_bool_accepts_mysql_integers() {
        assert_eq!(Value::Int64(1).as_bool(), Some(true));
        assert_eq!(Value::Int64(0).as_bool(), Some(false));
        assert_eq!(Value::String("1".into()).as_bool(), Some(true));
        assert_eq!(Value::String("maybe".into()).as_bool(), None);
        assert_eq!(Value::Float64(1.0).as_bool(), None);
    }

    #[test]
    fn test_row_lookup_is_case_insensitive() {
        let row = Row::new(
            vec!["ID".into(), "time".into()],
            vec![Value::UInt64(12), Value::Int64(600)],
        );
        assert_eq!(row.get_by_name("id"), Some(&Value::UInt64(12)));
        assert_eq!(row.get_by_name("TIME"), Some(&Value::Int64(600)));
        assert_eq!(row.get_by_name("user"), None);
        assert_eq!(row.to_map().len(), 2);
    }

    #[test]
    fn test_query_result_from_rows() {
        let result = QueryResult::from_rows(
            vec!["total".into()],
            vec![vec![Value::Int64(1)], vec![Value::Int64(2)]],
        );
        assert!(result.has_rows());
        assert_eq!(result.row_count(), 2);
        assert_eq!(result.first().and_then(|r| r.get(0)), Some(&Value::Int64(1)));
        assert!(!QueryResult::empty().has_rows());
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Bytes(vec![1, 2, 3]).to_string(), "<3 bytes>");
        assert_eq!(Value::from("x").to_string(), "x");
    }
}
