//! Error types for tidepool

use thiserror::Error;

/// Core error type for tidepool operations
#[derive(Error, Debug)]
pub enum TidepoolError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The pool could not produce a connection within the retry budget.
    #[error("Failed to acquire a connection after {attempts} attempt(s): {source}")]
    Acquisition {
        attempts: u32,
        #[source]
        source: Box<TidepoolError>,
    },

    #[error("Cannot {operation} a transaction that is already {state}")]
    TransactionState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("Cannot {operation} a connection that is already {state}")]
    ConnectionState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Connection pool is closed")]
    PoolClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("{0}")]
    Other(String),
}

impl TidepoolError {
    /// Whether this error came from the pool failing to hand out a connection,
    /// as opposed to a statement failing on a connection that was handed out.
    pub fn is_acquisition_failure(&self) -> bool {
        matches!(
            self,
            TidepoolError::Acquisition { .. }
                | TidepoolError::Timeout(_)
                | TidepoolError::PoolClosed
                | TidepoolError::Connection(_)
        )
    }
}

/// Result type alias for tidepool operations
pub type Result<T> = std::result::Result<T, TidepoolError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_acquisition_error_keeps_last_cause() {
        let err = TidepoolError::Acquisition {
            attempts: 3,
            source: Box::new(TidepoolError::Timeout("pool exhausted".into())),
        };
        assert_eq!(
            err.to_string(),
            "Failed to acquire a connection after 3 attempt(s): Timeout: pool exhausted"
        );
        let cause = err.source().map(|e| e.to_string());
        assert_eq!(cause.as_deref(), Some("Timeout: pool exhausted"));
    }

    #[test]
    fn test_state_error_messages() {
        let err = TidepoolError::TransactionState {
            operation: "commit",
            state: "rolled back",
        };
        assert_eq!(
            err.to_string(),
            "Cannot commit a transaction that is already rolled back"
        );

        let err = TidepoolError::ConnectionState {
            operation: "release",
            state: "destroyed",
        };
        assert_eq!(
            err.to_string(),
            "Cannot release a connection that is already destroyed"
        );
    }

    #[test]
    fn test_is_acquisition_failure() {
        assert!(TidepoolError::PoolClosed.is_acquisition_failure());
        assert!(TidepoolError::Timeout("t".into()).is_acquisition_failure());
        assert!(!TidepoolError::Query("syntax".into()).is_acquisition_failure());
        assert!(
            !TidepoolError::TransactionState {
                operation: "query",
                state: "committed",
            }
            .is_acquisition_failure()
        );
    }
}
