//! TCP transport for networked radios
//!
//! Radios with a network interface expose their API on a TCP socket
//! (port 4403 by default). Most of them accept exactly one client, so the
//! transport holds a [`PeerLease`] for as long as the socket is open.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, error, info, trace};

use super::{ConnectionState, PeerLease, PeerLeases, Transport};
use crate::config::{FramingPreset, LinkConfig, TransportConfig};
use crate::error::{LinkError, Result};
use crate::framing::LengthPrefixFramer;

/// Buffer size for reading from the socket
const READ_BUFFER_SIZE: usize = 512;

/// TCP transport to one radio
pub struct TcpTransport {
    address: String,
    dial_timeout: Duration,
    stream: Option<TcpStream>,
    state: ConnectionState,
    framer: LengthPrefixFramer,
    leases: PeerLeases,
    lease: Option<PeerLease>,
    name: String,
}

impl TcpTransport {
    /// Create a new TCP transport
    ///
    /// # Arguments
    ///
    /// * `address` - The address to connect to (e.g., "192.168.1.100:4403")
    /// * `framing` - Stream framing spoken by the radio
    /// * `leases` - Registry shared by every transport in the process
    pub fn new(address: impl Into<String>, framing: FramingPreset, leases: PeerLeases) -> Self {
        let address = address.into();
        let name = format!("tcp:{}", address);
        Self {
            address,
            dial_timeout: Duration::from_secs(10),
            stream: None,
            state: ConnectionState::Disconnected,
            framer: LengthPrefixFramer::from_preset(framing),
            leases,
            lease: None,
            name,
        }
    }

    /// Build from a link configuration
    pub fn from_config(config: &LinkConfig, leases: PeerLeases) -> Result<Self> {
        match &config.transport {
            TransportConfig::Tcp { .. } => Ok(Self::new(
                config.transport.peer(),
                config.framing,
                leases,
            )
            .with_dial_timeout(config.connect_timeout)),
            TransportConfig::Serial { device, .. } => Err(LinkError::InvalidConfig(format!(
                "{} is a serial device, not a TCP address",
                device.display()
            ))),
        }
    }

    /// Set the dial timeout
    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    /// Remote address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Get the current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn teardown(&mut self) {
        self.stream = None;
        self.lease = None;
        self.framer.clear();
        self.state = ConnectionState::Disconnected;
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        // The lease is taken before dialing and dropped with the future if
        // the dial is cancelled.
        let lease = self.leases.try_acquire(&self.address)?;
        self.state = ConnectionState::Connecting;
        info!(address = %self.address, "Connecting to radio over TCP");

        let dial = tokio::time::timeout(self.dial_timeout, TcpStream::connect(&self.address)).await;
        let stream = match dial {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                self.state = ConnectionState::Disconnected;
                return Err(LinkError::DialFailed {
                    peer: self.address.clone(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                self.state = ConnectionState::Disconnected;
                return Err(LinkError::ConnectionTimeout {
                    duration_ms: self.dial_timeout.as_millis() as u64,
                });
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Failed to set TCP_NODELAY");
        }

        self.stream = Some(stream);
        self.lease = Some(lease);
        self.framer.clear();
        self.state = ConnectionState::Connected;

        info!(address = %self.address, "Connected to radio");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!(error = %e, "Socket shutdown failed");
            }
        }
        self.teardown();

        info!(address = %self.address, "Disconnected from radio");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected && self.stream.is_some()
    }

    async fn read_frame(&mut self) -> Result<Option<Bytes>> {
        if let Some(frame) = self.framer.next_frame()? {
            return Ok(Some(frame));
        }

        let stream = self.stream.as_mut().ok_or(LinkError::Disconnected)?;
        let mut buf = [0u8; READ_BUFFER_SIZE];

        match stream.read(&mut buf).await {
            Ok(0) => {
                debug!(address = %self.address, "Radio closed the connection");
                self.teardown();
                Err(LinkError::Disconnected)
            }
            Ok(n) => {
                trace!(bytes = n, "Read from socket");
                self.framer.push(&buf[..n]);
                self.framer.next_frame()
            }
            Err(e) => {
                error!(error = %e, "TCP read error");
                self.teardown();
                Err(LinkError::ReadError(e.to_string()))
            }
        }
    }

    async fn write_frame(&mut self, payload: &[u8]) -> Result<()> {
        let frame = self.framer.encode(payload)?;
        let stream = self.stream.as_mut().ok_or(LinkError::Disconnected)?;

        debug!(size = frame.len(), payload_size = payload.len(), "Writing frame");

        if let Err(e) = stream.write_all(&frame).await {
            error!(error = %e, "TCP write error");
            self.teardown();
            return Err(LinkError::WriteError(e.to_string()));
        }
        stream
            .flush()
            .await
            .map_err(|e| LinkError::WriteError(format!("Flush failed: {}", e)))?;
        Ok(())
    }

    async fn probe(&mut self) -> Result<()> {
        let stream = self.stream.as_ref().ok_or(LinkError::Disconnected)?;
        // A socket whose remote went away loses its peer address
        stream
            .peer_addr()
            .map(|_| ())
            .map_err(|e| LinkError::ProbeFailed(e.to_string()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("address", &self.address)
            .field("state", &self.state)
            .field("buffer_len", &self.framer.buffered())
            .finish()
    }
}
