//! Decoded packet payloads
//!
//! The decoder inspects the radio port number exactly once and produces one
//! of these variants. Nothing downstream re-inspects raw bytes to decide
//! what a packet is.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::packet::NodeId;

/// Payload category, derived from [`Payload`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Text,
    Telemetry,
    Position,
    NodeInfo,
    NeighborInfo,
    Unknown,
}

impl PayloadKind {
    /// Stable label used in the store
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadKind::Text => "text",
            PayloadKind::Telemetry => "telemetry",
            PayloadKind::Position => "position",
            PayloadKind::NodeInfo => "node_info",
            PayloadKind::NeighborInfo => "neighbor_info",
            PayloadKind::Unknown => "unknown",
        }
    }

    /// Single byte tag mixed into dedup fingerprints
    pub fn tag(&self) -> u8 {
        match self {
            PayloadKind::Text => 1,
            PayloadKind::Telemetry => 2,
            PayloadKind::Position => 3,
            PayloadKind::NodeInfo => 4,
            PayloadKind::NeighborInfo => 5,
            PayloadKind::Unknown => 0,
        }
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device metrics reported by a node
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeviceTelemetry {
    /// Battery level in percent (101 = powered)
    pub battery_level: Option<u32>,
    /// Battery voltage
    pub voltage: Option<f32>,
    /// Channel utilization in percent
    pub channel_utilization: Option<f32>,
    /// Transmit air time in percent
    pub air_util_tx: Option<f32>,
    /// Seconds since boot
    pub uptime_seconds: Option<u32>,
}

/// GPS position report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<i32>,
}

/// User-facing identity of a node
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeInfo {
    pub long_name: String,
    pub short_name: String,
    pub hw_model: Option<String>,
}

/// One edge of the neighbor topology
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub node_id: NodeId,
    pub snr: Option<f32>,
}

/// Neighbors a node currently hears directly
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NeighborInfo {
    pub neighbors: Vec<Neighbor>,
}

/// Decoded payload of a [`crate::Packet`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Payload {
    /// UTF-8 text message
    Text(String),
    /// Device telemetry
    Telemetry(DeviceTelemetry),
    /// Position report
    Position(Position),
    /// Node identity announcement
    NodeInfo(NodeInfo),
    /// Neighbor topology report
    NeighborInfo(NeighborInfo),
    /// Anything the decoder does not model, kept verbatim
    Unknown {
        /// Radio port number
        port: u32,
        /// Raw bytes
        data: Vec<u8>,
    },
}

impl Payload {
    /// Category of this payload
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Text(_) => PayloadKind::Text,
            Payload::Telemetry(_) => PayloadKind::Telemetry,
            Payload::Position(_) => PayloadKind::Position,
            Payload::NodeInfo(_) => PayloadKind::NodeInfo,
            Payload::NeighborInfo(_) => PayloadKind::NeighborInfo,
            Payload::Unknown { .. } => PayloadKind::Unknown,
        }
    }

    /// Canonical byte form used for fingerprints and persistence
    ///
    /// Text and unknown payloads are their raw bytes; structured payloads
    /// are CBOR encoded.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        match self {
            Payload::Text(text) => text.as_bytes().to_vec(),
            Payload::Unknown { data, .. } => data.clone(),
            Payload::Telemetry(t) => serde_cbor::to_vec(t).unwrap_or_default(),
            Payload::Position(p) => serde_cbor::to_vec(p).unwrap_or_default(),
            Payload::NodeInfo(n) => serde_cbor::to_vec(n).unwrap_or_default(),
            Payload::NeighborInfo(n) => serde_cbor::to_vec(n).unwrap_or_default(),
        }
    }

    /// Short human readable summary for logs and the packet log
    pub fn summary(&self) -> String {
        match self {
            Payload::Text(text) => {
                let mut preview: String = text.chars().take(40).collect();
                if text.chars().count() > 40 {
                    preview.push('…');
                }
                preview
            }
            Payload::Telemetry(t) => format!(
                "battery={} voltage={}",
                t.battery_level.map(|b| b.to_string()).unwrap_or_else(|| "-".into()),
                t.voltage.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "-".into())
            ),
            Payload::Position(p) => format!("{:.5},{:.5}", p.latitude, p.longitude),
            Payload::NodeInfo(n) => format!("{} ({})", n.long_name, n.short_name),
            Payload::NeighborInfo(n) => format!("{} neighbors", n.neighbors.len()),
            Payload::Unknown { port, data } => format!("port {} ({} bytes)", port, data.len()),
        }
    }
}
