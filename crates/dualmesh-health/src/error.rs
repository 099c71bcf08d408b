//! Error types for health checks and reboot signalling

use thiserror::Error;

/// Errors raised by probes, the semaphore and the reboot watcher
#[derive(Error, Debug)]
pub enum HealthError {
    /// A health probe failed
    #[error("Probe {probe} failed: {reason}")]
    ProbeFailed {
        /// Probe name
        probe: String,
        /// What went wrong
        reason: String,
    },

    /// The semaphore file could not be locked or written
    #[error("Semaphore error: {0}")]
    Semaphore(String),

    /// The semaphore held something that is not a reboot request
    #[error("Malformed reboot request: {0}")]
    MalformedRequest(String),

    /// A reboot command failed
    #[error("Command `{command}` failed: {reason}")]
    CommandFailed {
        /// Command line
        command: String,
        /// Exit status or spawn error
        reason: String,
    },

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HealthError {
    /// Get an error code for logging/metrics
    pub fn error_code(&self) -> &'static str {
        match self {
            HealthError::ProbeFailed { .. } => "PROBE_FAILED",
            HealthError::Semaphore(_) => "SEMAPHORE",
            HealthError::MalformedRequest(_) => "MALFORMED_REQUEST",
            HealthError::CommandFailed { .. } => "COMMAND_FAILED",
            HealthError::Io(_) => "IO_ERROR",
        }
    }

    /// Shorthand for a probe failure
    pub fn probe(probe: impl Into<String>, reason: impl ToString) -> Self {
        HealthError::ProbeFailed {
            probe: probe.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<serde_json::Error> for HealthError {
    fn from(err: serde_json::Error) -> Self {
        HealthError::MalformedRequest(err.to_string())
    }
}

impl From<tokio::task::JoinError> for HealthError {
    fn from(err: tokio::task::JoinError) -> Self {
        HealthError::Semaphore(format!("blocking task failed: {}", err))
    }
}

/// Result type alias for health operations
pub type Result<T> = std::result::Result<T, HealthError>;
