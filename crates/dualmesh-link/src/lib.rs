//! Radio link layer for the dualmesh bridge
//!
//! This crate owns everything between a physical radio and a decoded
//! [`Packet`](dualmesh_core::Packet):
//!
//! 1. **Transport** - Serial or TCP byte stream to a radio ([`Transport`])
//! 2. **Framing** - Splitting the stream into frames ([`LengthPrefixFramer`])
//! 3. **Decoding** - Frames into packets through the external [`PacketDecoder`] seam
//! 4. **Supervision** - The per-link state machine that keeps the connection
//!    alive ([`ConnectionSupervisor`])
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use dualmesh_core::NetworkSource;
//! use dualmesh_link::{
//!     CompactCodec, ConnectionSupervisor, LinkConfigBuilder, PeerLeases, TcpTransport,
//! };
//! use std::sync::Arc;
//! use tokio::sync::{mpsc, watch};
//!
//! let config = LinkConfigBuilder::new().tcp("192.168.1.40", 4403).build();
//! let transport = TcpTransport::from_config(&config, PeerLeases::default())?;
//! let (packet_tx, mut packet_rx) = mpsc::channel(256);
//! let (supervisor, handle) = ConnectionSupervisor::new(
//!     NetworkSource::NetB,
//!     transport,
//!     Arc::new(CompactCodec::new()),
//!     config,
//!     packet_tx,
//! );
//! let (_shutdown_tx, shutdown_rx) = watch::channel(false);
//! tokio::spawn(supervisor.run(shutdown_rx));
//!
//! while let Some(packet) = packet_rx.recv().await {
//!     println!("{} from {}", packet.kind(), packet.sender());
//! }
//! ```
//!
//! # Features
//!
//! - `serial` - Serial port transport (requires `libudev-dev` on Linux)

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod decoder;
pub mod devices;
pub mod error;
pub mod framing;
pub mod reboot;
pub mod supervisor;
pub mod test_utils;
pub mod transport;

pub use config::{
    FramingPreset, LinkConfig, LinkConfigBuilder, RemoteRebootConfig, TransportConfig,
    DEFAULT_BAUD_RATE, DEFAULT_TCP_PORT, LORA_MAX_PAYLOAD,
};
pub use decoder::{CompactCodec, PacketDecoder, COMPACT_HEADER_LEN};
pub use devices::{find_serial_devices, SerialDeviceInfo};
pub use error::{DecodeError, LinkError, Result};
pub use framing::{LengthEndian, LengthPrefixFramer};
pub use reboot::{CommandRebooter, PeerRebooter};
pub use supervisor::{ConnectionSupervisor, SupervisorHandle, SupervisorStats};
pub use test_utils::{MockTransport, MockTransportControl};
pub use transport::{ConnectionState, PeerLease, PeerLeases, TcpTransport, Transport};

#[cfg(feature = "serial")]
pub use transport::SerialTransport;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
