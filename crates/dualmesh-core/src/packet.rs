//! Packet types exchanged between the links, the router and the store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::payload::{Payload, PayloadKind};

/// Destination sentinel meaning "every node on the channel"
pub const BROADCAST: NodeId = NodeId(0xFFFF_FFFF);

/// 4-byte mesh node identifier
///
/// Both supported radio protocols address nodes with a 32-bit integer. The
/// canonical text form is `!` followed by eight lowercase hex digits.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Check if this is the broadcast sentinel
    pub fn is_broadcast(&self) -> bool {
        *self == BROADCAST
    }

    /// Raw integer value
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_broadcast() {
            write!(f, "^all")
        } else {
            write!(f, "!{:08x}", self.0)
        }
    }
}

impl From<u32> for NodeId {
    fn from(value: u32) -> Self {
        NodeId(value)
    }
}

/// Error returned when a node id string cannot be parsed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid node id: {0}")]
pub struct ParseNodeIdError(pub String);

impl FromStr for NodeId {
    type Err = ParseNodeIdError;

    /// Accepts `!aabbccdd`, `0xaabbccdd`, `^all` or a decimal integer
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed == "^all" {
            return Ok(BROADCAST);
        }
        let parsed = if let Some(hex) = trimmed.strip_prefix('!') {
            u32::from_str_radix(hex, 16)
        } else if let Some(hex) = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            u32::from_str_radix(hex, 16)
        } else {
            trimmed.parse::<u32>()
        };
        parsed
            .map(NodeId)
            .map_err(|_| ParseNodeIdError(s.to_string()))
    }
}

/// Which physical mesh network delivered a packet, or should carry a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkSource {
    /// Protocol A radio network
    NetA,
    /// Protocol B radio network
    NetB,
}

impl NetworkSource {
    /// Both networks, in a stable order
    pub const ALL: [NetworkSource; 2] = [NetworkSource::NetA, NetworkSource::NetB];

    /// The other network
    pub fn sibling(&self) -> NetworkSource {
        match self {
            NetworkSource::NetA => NetworkSource::NetB,
            NetworkSource::NetB => NetworkSource::NetA,
        }
    }

    /// Short label used in logs and the store
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkSource::NetA => "net_a",
            NetworkSource::NetB => "net_b",
        }
    }

    /// Array index for per-network tables
    pub fn index(&self) -> usize {
        match self {
            NetworkSource::NetA => 0,
            NetworkSource::NetB => 1,
        }
    }
}

impl fmt::Display for NetworkSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "net_a" | "a" | "neta" => Ok(NetworkSource::NetA),
            "net_b" | "b" | "netb" => Ok(NetworkSource::NetB),
            other => Err(format!("unknown network: {}", other)),
        }
    }
}

/// Radio reception quality reported alongside a packet
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SignalMetrics {
    /// Signal-to-noise ratio in dB
    pub snr: Option<f32>,
    /// Received signal strength in dBm
    pub rssi: Option<i32>,
    /// Hops travelled before reaching us
    pub hop_count: Option<u8>,
}

/// A fully decoded packet received from one of the mesh networks
///
/// Packets are immutable once built. The network is fixed when the decoder
/// creates the packet on behalf of the link that received it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    sender: NodeId,
    destination: NodeId,
    network: NetworkSource,
    packet_id: u32,
    channel: u8,
    payload: Payload,
    signal: Option<SignalMetrics>,
    received_at: DateTime<Utc>,
    via_transport: String,
}

impl Packet {
    /// Create a packet received now on `network`
    pub fn new(
        network: NetworkSource,
        sender: NodeId,
        destination: NodeId,
        packet_id: u32,
        payload: Payload,
    ) -> Self {
        Self {
            sender,
            destination,
            network,
            packet_id,
            channel: 0,
            payload,
            signal: None,
            received_at: Utc::now(),
            via_transport: String::new(),
        }
    }

    /// Set the channel index
    pub fn with_channel(mut self, channel: u8) -> Self {
        self.channel = channel;
        self
    }

    /// Attach reception metrics
    pub fn with_signal(mut self, signal: SignalMetrics) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Override the reception timestamp
    pub fn with_received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = received_at;
        self
    }

    /// Record which link instance delivered the packet
    pub fn with_via_transport(mut self, via: impl Into<String>) -> Self {
        self.via_transport = via.into();
        self
    }

    pub fn sender(&self) -> NodeId {
        self.sender
    }

    pub fn destination(&self) -> NodeId {
        self.destination
    }

    pub fn network(&self) -> NetworkSource {
        self.network
    }

    pub fn packet_id(&self) -> u32 {
        self.packet_id
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn kind(&self) -> PayloadKind {
        self.payload.kind()
    }

    pub fn signal(&self) -> Option<&SignalMetrics> {
        self.signal.as_ref()
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn via_transport(&self) -> &str {
        &self.via_transport
    }

    /// Check if this packet was sent to every node
    pub fn is_broadcast(&self) -> bool {
        self.destination.is_broadcast()
    }

    /// Text body, if this is a text packet
    pub fn text(&self) -> Option<&str> {
        match &self.payload {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// A text message leaving the bridge on one network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Network the message is sent on
    pub network: NetworkSource,
    /// This node's id on that network
    pub from: NodeId,
    /// Recipient, or [`BROADCAST`]
    pub destination: NodeId,
    /// Channel index
    pub channel: u8,
    /// Message body
    pub text: String,
    /// Request a delivery acknowledgement
    pub want_ack: bool,
}

impl OutboundMessage {
    /// Create a direct text message
    pub fn text(
        network: NetworkSource,
        from: NodeId,
        destination: NodeId,
        text: impl Into<String>,
    ) -> Self {
        Self {
            network,
            from,
            destination,
            channel: 0,
            text: text.into(),
            want_ack: !destination.is_broadcast(),
        }
    }

    /// Check if this message goes to every node
    pub fn is_broadcast(&self) -> bool {
        self.destination.is_broadcast()
    }

    /// The payload this message carries on the air
    pub fn payload(&self) -> Payload {
        Payload::Text(self.text.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_display() {
        assert_eq!(NodeId(0xAA).to_string(), "!000000aa");
        assert_eq!(BROADCAST.to_string(), "^all");
    }

    #[test]
    fn test_node_id_parse() {
        assert_eq!("!deadbeef".parse::<NodeId>().unwrap(), NodeId(0xDEADBEEF));
        assert_eq!("0x10".parse::<NodeId>().unwrap(), NodeId(16));
        assert_eq!("170".parse::<NodeId>().unwrap(), NodeId(0xAA));
        assert_eq!("^all".parse::<NodeId>().unwrap(), BROADCAST);
        assert!("!zz".parse::<NodeId>().is_err());
    }

    #[test]
    fn test_network_sibling() {
        assert_eq!(NetworkSource::NetA.sibling(), NetworkSource::NetB);
        assert_eq!(NetworkSource::NetB.sibling(), NetworkSource::NetA);
    }

    #[test]
    fn test_network_parse() {
        assert_eq!("net_a".parse::<NetworkSource>(), Ok(NetworkSource::NetA));
        assert_eq!("B".parse::<NetworkSource>(), Ok(NetworkSource::NetB));
        assert!("c".parse::<NetworkSource>().is_err());
    }

    #[test]
    fn test_packet_builder_keeps_network() {
        let packet = Packet::new(
            NetworkSource::NetB,
            NodeId(1),
            NodeId(2),
            7,
            Payload::Text("hi".into()),
        )
        .with_channel(2)
        .with_via_transport("tcp:10.0.0.5:4403");

        assert_eq!(packet.network(), NetworkSource::NetB);
        assert_eq!(packet.channel(), 2);
        assert_eq!(packet.text(), Some("hi"));
        assert_eq!(packet.via_transport(), "tcp:10.0.0.5:4403");
        assert!(!packet.is_broadcast());
    }

    #[test]
    fn test_outbound_ack_defaults() {
        let direct = OutboundMessage::text(NetworkSource::NetA, NodeId(1), NodeId(2), "pong");
        assert!(direct.want_ack);

        let broadcast = OutboundMessage::text(NetworkSource::NetA, NodeId(1), BROADCAST, "hello");
        assert!(!broadcast.want_ack);
        assert!(broadcast.is_broadcast());
    }
}
