//! Error types for the persistence layer

use thiserror::Error;

/// Errors that can occur in store operations
#[derive(Error, Debug)]
pub enum StateError {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Could not open the database
    #[error("Connection error: {0}")]
    Connection(String),

    /// Stored row could not be turned back into a record
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Integrity check reported problems
    #[error("Integrity check failed: {0}")]
    Integrity(String),

    /// Writer queue is full
    #[error("Write queue full")]
    QueueFull,

    /// Writer task is gone
    #[error("Writer channel closed")]
    ChannelClosed,

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StateError {
    /// Get an error code for logging/metrics
    pub fn error_code(&self) -> &'static str {
        match self {
            StateError::Database(_) => "DATABASE",
            StateError::Connection(_) => "CONNECTION",
            StateError::InvalidData(_) => "INVALID_DATA",
            StateError::Integrity(_) => "INTEGRITY",
            StateError::QueueFull => "QUEUE_FULL",
            StateError::ChannelClosed => "CHANNEL_CLOSED",
            StateError::Io(_) => "IO_ERROR",
        }
    }

    /// Whether the error points at the storage medium rather than the data
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            StateError::Database(_)
                | StateError::Connection(_)
                | StateError::Integrity(_)
                | StateError::Io(_)
        )
    }
}

impl From<sqlx::Error> for StateError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(io) => StateError::Io(io),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::ColumnNotFound(_) => {
                StateError::InvalidData(err.to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StateError::Connection(err.to_string())
            }
            _ => StateError::Database(err.to_string()),
        }
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for StateError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        StateError::ChannelClosed
    }
}

/// Result type for state operations
pub type Result<T> = std::result::Result<T, StateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(StateError::QueueFull.error_code(), "QUEUE_FULL");
        assert!(StateError::Database("disk I/O error".into()).is_storage_failure());
        assert!(!StateError::InvalidData("bad network".into()).is_storage_failure());
    }

    #[test]
    fn test_from_sqlx() {
        let err: StateError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, StateError::Connection(_)));
    }
}
