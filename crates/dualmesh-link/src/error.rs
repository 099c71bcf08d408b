//! Error types for radio link operations
//!
//! [`LinkError`] covers transport failures, which are always recovered by
//! the supervisor through reconnection. [`DecodeError`] covers malformed
//! frames, which are dropped and counted.

use thiserror::Error;

/// Error raised by a [`crate::PacketDecoder`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Frame shorter than the fixed header
    #[error("Frame too short: {len} bytes")]
    TooShort {
        /// Received length
        len: usize,
    },

    /// Text payload is not valid UTF-8
    #[error("Text payload is not valid UTF-8")]
    InvalidUtf8,

    /// Structured payload failed to decode
    #[error("Payload decode failed: {0}")]
    Payload(String),

    /// Outbound message does not fit a radio frame
    #[error("Message too large: {size} bytes exceeds radio maximum of {max} bytes")]
    TooLarge {
        /// Actual size
        size: usize,
        /// Maximum allowed size
        max: usize,
    },
}

/// Main error type for link operations
#[derive(Error, Debug)]
pub enum LinkError {
    // ===== Serial/Transport Errors =====
    /// Serial device not found
    #[error("Serial device not found: {0}")]
    PortNotFound(String),

    /// Serial device open failed
    #[error("Failed to open serial device {port}: {reason}")]
    PortOpenFailed {
        /// Device path
        port: String,
        /// Failure reason
        reason: String,
    },

    /// TCP dial failed
    #[error("Failed to connect to {peer}: {reason}")]
    DialFailed {
        /// Remote address
        peer: String,
        /// Failure reason
        reason: String,
    },

    /// Another connection to the same remote is already active
    #[error("Peer {peer} already has an active connection")]
    PeerBusy {
        /// Remote address
        peer: String,
    },

    /// Read error
    #[error("Read error: {0}")]
    ReadError(String),

    /// Write error
    #[error("Write error: {0}")]
    WriteError(String),

    /// Transport disconnected
    #[error("Transport disconnected")]
    Disconnected,

    /// Connection timeout
    #[error("Connection timeout after {duration_ms}ms")]
    ConnectionTimeout {
        /// Timeout duration in milliseconds
        duration_ms: u64,
    },

    /// Health probe failed
    #[error("Health probe failed: {0}")]
    ProbeFailed(String),

    // ===== Framing/Decoding Errors =====
    /// Frame rejected by the framer
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Decoder error
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    // ===== Supervisor Errors =====
    /// The supervisor task has stopped
    #[error("Link supervisor is not running")]
    SupervisorStopped,

    /// Remote reboot command failed
    #[error("Remote reboot failed: {0}")]
    RebootFailed(String),

    // ===== Configuration Errors =====
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ===== General Errors =====
    /// Channel closed
    #[error("Channel closed")]
    ChannelClosed,

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LinkError {
    /// Check if this error is recoverable by reconnecting
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            LinkError::ConnectionTimeout { .. }
                | LinkError::Disconnected
                | LinkError::ReadError(_)
                | LinkError::WriteError(_)
                | LinkError::DialFailed { .. }
                | LinkError::PortNotFound(_)
                | LinkError::PortOpenFailed { .. }
                | LinkError::ProbeFailed(_)
                | LinkError::Io(_)
        )
    }

    /// Check if this is a data error (bad bytes from the radio)
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, LinkError::InvalidFrame(_) | LinkError::Decode(_))
    }

    /// Get an error code for logging/metrics
    pub fn error_code(&self) -> &'static str {
        match self {
            LinkError::PortNotFound(_) => "PORT_NOT_FOUND",
            LinkError::PortOpenFailed { .. } => "PORT_OPEN_FAILED",
            LinkError::DialFailed { .. } => "DIAL_FAILED",
            LinkError::PeerBusy { .. } => "PEER_BUSY",
            LinkError::ReadError(_) => "READ_ERROR",
            LinkError::WriteError(_) => "WRITE_ERROR",
            LinkError::Disconnected => "DISCONNECTED",
            LinkError::ConnectionTimeout { .. } => "CONNECTION_TIMEOUT",
            LinkError::ProbeFailed(_) => "PROBE_FAILED",
            LinkError::InvalidFrame(_) => "INVALID_FRAME",
            LinkError::Decode(_) => "DECODE_ERROR",
            LinkError::SupervisorStopped => "SUPERVISOR_STOPPED",
            LinkError::RebootFailed(_) => "REBOOT_FAILED",
            LinkError::InvalidConfig(_) => "INVALID_CONFIG",
            LinkError::ChannelClosed => "CHANNEL_CLOSED",
            LinkError::Io(_) => "IO_ERROR",
        }
    }
}

/// Result type alias for link operations
pub type Result<T> = std::result::Result<T, LinkError>;

// Conversion from serialport error (only when serial feature is enabled)
#[cfg(feature = "serial")]
impl From<serialport::Error> for LinkError {
    fn from(err: serialport::Error) -> Self {
        match err.kind {
            serialport::ErrorKind::NoDevice => LinkError::PortNotFound(err.description),
            serialport::ErrorKind::Io(kind) => {
                LinkError::Io(std::io::Error::new(kind, err.description))
            }
            _ => LinkError::PortOpenFailed {
                port: String::new(),
                reason: err.description,
            },
        }
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for LinkError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        LinkError::ChannelClosed
    }
}
