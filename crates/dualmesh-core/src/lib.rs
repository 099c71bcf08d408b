//! Dualmesh Core - Packet model shared by every bridge component
//!
//! This crate defines the value types that flow through the bridge:
//!
//! - [`packet`] - [`Packet`], [`NetworkSource`], [`NodeId`] and outbound messages
//! - [`payload`] - The [`Payload`] sum type decided once by the packet decoder
//! - [`config`] - Serde helpers shared by the configuration structs of all crates
//!
//! # Example
//!
//! ```rust
//! use dualmesh_core::{NetworkSource, NodeId, Packet, Payload, BROADCAST};
//!
//! let packet = Packet::new(
//!     NetworkSource::NetA,
//!     NodeId(0xAA),
//!     BROADCAST,
//!     42,
//!     Payload::Text("hello mesh".into()),
//! );
//! assert!(packet.is_broadcast());
//! assert_eq!(packet.network(), NetworkSource::NetA);
//! ```

pub mod config;
pub mod packet;
pub mod payload;

pub use packet::{
    NetworkSource, NodeId, OutboundMessage, Packet, ParseNodeIdError, SignalMetrics, BROADCAST,
};
pub use payload::{
    DeviceTelemetry, Neighbor, NeighborInfo, NodeInfo, Payload, PayloadKind, Position,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
