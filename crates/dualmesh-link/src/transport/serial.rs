//! Serial port transport for USB-attached radios
//!
//! Async serial communication through tokio-serial. Framing is delegated
//! to a [`LengthPrefixFramer`] chosen by the link's framing preset.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, error, info, trace};

use super::{ConnectionState, PeerLease, PeerLeases, Transport};
use crate::config::{FramingPreset, LinkConfig, TransportConfig, DEFAULT_BAUD_RATE};
use crate::error::{LinkError, Result};
use crate::framing::LengthPrefixFramer;

/// Buffer size for reading from serial port
const READ_BUFFER_SIZE: usize = 512;

/// Serial transport to one radio
pub struct SerialTransport {
    port_path: PathBuf,
    baud_rate: u32,
    timeout: Duration,
    stream: Option<SerialStream>,
    state: ConnectionState,
    framer: LengthPrefixFramer,
    leases: PeerLeases,
    lease: Option<PeerLease>,
    name: String,
}

impl SerialTransport {
    /// Create a new serial transport
    pub fn new(port: impl AsRef<Path>, framing: FramingPreset, leases: PeerLeases) -> Self {
        let port_path = port.as_ref().to_path_buf();
        let name = format!("serial:{}", port_path.display());

        Self {
            port_path,
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: Duration::from_secs(10),
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
            TransportConfig::Serial { device, baud_rate } => Ok(Self::new(
                device,
                config.framing,
                leases,
            )
            .with_baud_rate(*baud_rate)
            .with_timeout(config.connect_timeout)),
            TransportConfig::Tcp { host, port } => Err(LinkError::InvalidConfig(format!(
                "{}:{} is a TCP address, not a serial device",
                host, port
            ))),
        }
    }

    /// Create with custom baud rate
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Create with custom timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the port path
    pub fn port_path(&self) -> &Path {
        &self.port_path
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
impl Transport for SerialTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        let port = self.port_path.display().to_string();
        let lease = self.leases.try_acquire(&port)?;
        self.state = ConnectionState::Connecting;
        info!(port = %port, baud = self.baud_rate, "Connecting to serial port");

        if !self.port_path.exists() {
            self.state = ConnectionState::Disconnected;
            return Err(LinkError::PortNotFound(port));
        }

        let stream = tokio_serial::new(self.port_path.to_string_lossy(), self.baud_rate)
            .timeout(self.timeout)
            .open_native_async()
            .map_err(|e| LinkError::PortOpenFailed {
                port: port.clone(),
                reason: e.to_string(),
            });
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                return Err(e);
            }
        };

        self.stream = Some(stream);
        self.lease = Some(lease);
        self.framer.clear();
        self.state = ConnectionState::Connected;

        info!(port = %port, "Connected to radio");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.teardown();
        info!(port = %self.port_path.display(), "Disconnected from serial port");
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
                // EOF - device unplugged
                self.teardown();
                Err(LinkError::Disconnected)
            }
            Ok(n) => {
                trace!(bytes = n, "Read from serial port");
                self.framer.push(&buf[..n]);
                self.framer.next_frame()
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                Ok(None)
            }
            Err(e) => {
                error!(error = %e, "Serial read error");
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
            error!(error = %e, "Serial write error");
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
        if self.stream.is_none() {
            return Err(LinkError::Disconnected);
        }
        // USB re-enumeration removes the device node
        if !self.port_path.exists() {
            return Err(LinkError::ProbeFailed(format!(
                "{} disappeared",
                self.port_path.display()
            )));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("port", &self.port_path)
            .field("baud_rate", &self.baud_rate)
            .field("state", &self.state)
            .field("buffer_len", &self.framer.buffered())
            .finish()
    }
}
