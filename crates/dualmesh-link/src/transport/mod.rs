//! Transport implementations for radio communication
//!
//! - [`tcp::TcpTransport`] - TCP connection to a networked radio
//! - [`serial::SerialTransport`] - Serial port (requires `serial` feature)
//!
//! # Feature Requirements
//!
//! - `serial`: Requires `libudev-dev` and `pkg-config` on Linux
//!   ```bash
//!   apt install libudev-dev pkg-config
//!   ```

#[cfg(feature = "serial")]
mod serial;
#[cfg(feature = "serial")]
pub use serial::SerialTransport;

mod tcp;
pub use tcp::TcpTransport;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::error::{LinkError, Result};

/// Byte-level connection to one radio
///
/// Implementations own their framing, so reads and writes deal in frame
/// payloads. `read_frame` must be cancel safe: the supervisor polls it
/// inside `tokio::select!`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the connection; a no-op when already connected
    async fn connect(&mut self) -> Result<()>;

    /// Close the connection
    async fn disconnect(&mut self) -> Result<()>;

    /// Check if currently connected
    fn is_connected(&self) -> bool;

    /// Read the next frame payload
    ///
    /// Returns `None` when no complete frame is available yet.
    async fn read_frame(&mut self) -> Result<Option<Bytes>>;

    /// Frame and write a payload
    async fn write_frame(&mut self, payload: &[u8]) -> Result<()>;

    /// Lightweight liveness check used by the supervisor
    async fn probe(&mut self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(LinkError::Disconnected)
        }
    }

    /// Transport name (for logging)
    fn name(&self) -> &str;
}

/// Connection state of a supervised link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Connection in progress
    Connecting,
    /// Connected and emitting packets
    Connected,
    /// Connected but failing health checks
    Degraded,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Degraded => write!(f, "degraded"),
        }
    }
}

/// Registry of remotes that currently have a live connection
///
/// Some radios accept a single client connection and silently starve the
/// older one when a second client appears. Every transport talking to such
/// a radio takes a lease before dialing; a second lease for the same
/// remote is refused.
#[derive(Debug, Clone, Default)]
pub struct PeerLeases {
    active: Arc<Mutex<HashSet<String>>>,
}

impl PeerLeases {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lease for `peer`, failing if it is already held
    pub fn try_acquire(&self, peer: &str) -> Result<PeerLease> {
        let mut active = self.active.lock();
        if !active.insert(peer.to_string()) {
            return Err(LinkError::PeerBusy {
                peer: peer.to_string(),
            });
        }
        debug!(peer, "Peer lease acquired");
        Ok(PeerLease {
            peer: peer.to_string(),
            active: Arc::clone(&self.active),
        })
    }

    /// Check whether `peer` currently has a live connection
    pub fn is_leased(&self, peer: &str) -> bool {
        self.active.lock().contains(peer)
    }
}

/// Held while a connection to a single-client remote is open
///
/// Dropping the lease releases the remote.
#[derive(Debug)]
pub struct PeerLease {
    peer: String,
    active: Arc<Mutex<HashSet<String>>>,
}

impl PeerLease {
    /// Remote this lease covers
    pub fn peer(&self) -> &str {
        &self.peer
    }
}

impl Drop for PeerLease {
    fn drop(&mut self) {
        self.active.lock().remove(&self.peer);
        debug!(peer = %self.peer, "Peer lease released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ConnectionState::Degraded.to_string(), "degraded");
    }

    #[test]
    fn test_second_lease_is_refused() {
        let leases = PeerLeases::new();
        let lease = leases.try_acquire("10.0.0.2:4403").unwrap();

        let second = leases.try_acquire("10.0.0.2:4403");
        assert!(matches!(second, Err(LinkError::PeerBusy { .. })));
        assert!(leases.is_leased("10.0.0.2:4403"));

        // Other remotes are independent
        assert!(leases.try_acquire("10.0.0.3:4403").is_ok());

        drop(lease);
        assert!(!leases.is_leased("10.0.0.2:4403"));
        assert!(leases.try_acquire("10.0.0.2:4403").is_ok());
    }
}
