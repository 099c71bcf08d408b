//! Row types returned by [`crate::TrafficStore`] queries

use chrono::{DateTime, TimeZone, Utc};
use dualmesh_core::{NetworkSource, NodeId};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::error::{Result, StateError};

/// Convert a timestamp to the stored unix-millisecond form
pub fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| StateError::InvalidData(format!("timestamp {} out of range", ms)))
}

fn network(row: &SqliteRow) -> Result<NetworkSource> {
    let raw: String = row.try_get("network")?;
    raw.parse().map_err(StateError::InvalidData)
}

fn node(row: &SqliteRow, column: &str) -> Result<NodeId> {
    let raw: i64 = row.try_get(column)?;
    u32::try_from(raw)
        .map(NodeId)
        .map_err(|_| StateError::InvalidData(format!("{} {} is not a node id", column, raw)))
}

fn f32_column(row: &SqliteRow, column: &str) -> Result<Option<f32>> {
    let raw: Option<f64> = row.try_get(column)?;
    Ok(raw.map(|v| v as f32))
}

/// One row of the packet log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketRecord {
    /// Row id
    pub id: i64,
    /// When the packet was received
    pub timestamp: DateTime<Utc>,
    /// Network the packet arrived on
    pub network: NetworkSource,
    /// Sender node
    pub sender: NodeId,
    /// Destination node or broadcast
    pub destination: NodeId,
    /// Radio packet id
    pub packet_id: u32,
    /// Channel index
    pub channel: u8,
    /// Payload kind name
    pub kind: String,
    /// Short human readable payload summary
    pub summary: String,
    /// Signal to noise ratio
    pub snr: Option<f32>,
    /// Received signal strength
    pub rssi: Option<i32>,
    /// Hops taken
    pub hop_count: Option<u8>,
    /// Link instance that delivered it
    pub via_transport: String,
}

impl PacketRecord {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        let packet_id: i64 = row.try_get("packet_id")?;
        let channel: i64 = row.try_get("channel")?;
        let hop_count: Option<i64> = row.try_get("hop_count")?;
        Ok(Self {
            id: row.try_get("id")?,
            timestamp: from_millis(row.try_get("timestamp")?)?,
            network: network(row)?,
            sender: node(row, "sender")?,
            destination: node(row, "destination")?,
            packet_id: packet_id as u32,
            channel: channel as u8,
            kind: row.try_get("kind")?,
            summary: row.try_get("summary")?,
            snr: f32_column(row, "snr")?,
            rssi: row.try_get::<Option<i64>, _>("rssi")?.map(|v| v as i32),
            hop_count: hop_count.map(|v| v as u8),
            via_transport: row.try_get("via_transport")?,
        })
    }
}

/// Direction of a logged message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageDirection {
    /// Heard on the mesh
    Inbound,
    /// Sent by this node
    Outbound,
}

impl MessageDirection {
    /// Stored form
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageDirection::Inbound => "inbound",
            MessageDirection::Outbound => "outbound",
        }
    }

    fn parse(raw: &str) -> Result<Self> {
        match raw {
            "inbound" => Ok(MessageDirection::Inbound),
            "outbound" => Ok(MessageDirection::Outbound),
            other => Err(StateError::InvalidData(format!(
                "unknown message direction {}",
                other
            ))),
        }
    }
}

/// One row of the message log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Row id
    pub id: i64,
    /// When the message was heard or sent
    pub timestamp: DateTime<Utc>,
    /// Network it travelled on
    pub network: NetworkSource,
    /// Sender node
    pub sender: NodeId,
    /// Destination node or broadcast
    pub destination: NodeId,
    /// Channel index
    pub channel: u8,
    /// Message text
    pub text: String,
    /// Inbound or outbound
    pub direction: MessageDirection,
}

impl MessageRecord {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        let channel: i64 = row.try_get("channel")?;
        let direction: String = row.try_get("direction")?;
        Ok(Self {
            id: row.try_get("id")?,
            timestamp: from_millis(row.try_get("timestamp")?)?,
            network: network(row)?,
            sender: node(row, "sender")?,
            destination: node(row, "destination")?,
            channel: channel as u8,
            text: row.try_get("text")?,
            direction: MessageDirection::parse(&direction)?,
        })
    }
}

/// Latest known state of one node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeStatsRecord {
    /// Node id
    pub node_id: NodeId,
    /// Network the node was last heard on
    pub network: Option<NetworkSource>,
    /// Last update
    pub timestamp: Option<DateTime<Utc>>,
    /// Long name from node info
    pub long_name: Option<String>,
    /// Short name from node info
    pub short_name: Option<String>,
    /// Hardware model
    pub hw_model: Option<String>,
    /// Battery percentage
    pub battery_level: Option<u32>,
    /// Battery voltage
    pub voltage: Option<f32>,
    /// Channel utilization percentage
    pub channel_utilization: Option<f32>,
    /// Transmit air time percentage
    pub air_util_tx: Option<f32>,
    /// Uptime
    pub uptime_seconds: Option<u32>,
    /// Last latitude
    pub latitude: Option<f64>,
    /// Last longitude
    pub longitude: Option<f64>,
    /// Last altitude
    pub altitude: Option<i32>,
    /// Last SNR
    pub snr: Option<f32>,
    /// Last RSSI
    pub rssi: Option<i32>,
    /// Last hop count
    pub hop_count: Option<u8>,
    /// Packets heard from this node
    pub packet_count: u64,
}

impl NodeStatsRecord {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        let network: String = row.try_get("network")?;
        let packet_count: i64 = row.try_get("packet_count")?;
        Ok(Self {
            node_id: node(row, "node_id")?,
            network: Some(network.parse().map_err(StateError::InvalidData)?),
            timestamp: Some(from_millis(row.try_get("timestamp")?)?),
            long_name: row.try_get("long_name")?,
            short_name: row.try_get("short_name")?,
            hw_model: row.try_get("hw_model")?,
            battery_level: row
                .try_get::<Option<i64>, _>("battery_level")?
                .map(|v| v as u32),
            voltage: f32_column(row, "voltage")?,
            channel_utilization: f32_column(row, "channel_utilization")?,
            air_util_tx: f32_column(row, "air_util_tx")?,
            uptime_seconds: row
                .try_get::<Option<i64>, _>("uptime_seconds")?
                .map(|v| v as u32),
            latitude: row.try_get("latitude")?,
            longitude: row.try_get("longitude")?,
            altitude: row.try_get::<Option<i64>, _>("altitude")?.map(|v| v as i32),
            snr: f32_column(row, "snr")?,
            rssi: row.try_get::<Option<i64>, _>("rssi")?.map(|v| v as i32),
            hop_count: row.try_get::<Option<i64>, _>("hop_count")?.map(|v| v as u8),
            packet_count: packet_count.max(0) as u64,
        })
    }
}

/// One neighbor-topology edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborRecord {
    /// Reporting node
    pub node_id: NodeId,
    /// Neighbor it hears
    pub neighbor_id: NodeId,
    /// Link quality reported by the node
    pub snr: Option<f32>,
    /// Network the report arrived on
    pub network: NetworkSource,
    /// Last report
    pub timestamp: DateTime<Utc>,
}

impl NeighborRecord {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            node_id: node(row, "node_id")?,
            neighbor_id: node(row, "neighbor_id")?,
            snr: f32_column(row, "snr")?,
            network: network(row)?,
            timestamp: from_millis(row.try_get("timestamp")?)?,
        })
    }
}

/// Traffic seen on one network over a time range
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkTraffic {
    /// Network name
    pub network: String,
    /// Packets logged
    pub packets: u64,
    /// Distinct senders
    pub unique_senders: u64,
}

/// Packet count for one sender
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderActivity {
    /// Sender node
    pub node_id: NodeId,
    /// Packets logged
    pub packets: u64,
}

/// Row counts per table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCounts {
    /// Packet log rows
    pub packets: u64,
    /// Message log rows
    pub messages: u64,
    /// Node stats rows
    pub node_stats: u64,
    /// Neighbor rows
    pub neighbors: u64,
}

/// Rows removed by a cleanup pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Packet log rows removed
    pub packets: u64,
    /// Message log rows removed
    pub messages: u64,
    /// Node stats rows removed
    pub node_stats: u64,
    /// Neighbor rows removed
    pub neighbors: u64,
}

impl CleanupReport {
    /// Total rows removed
    pub fn total(&self) -> u64 {
        self.packets + self.messages + self.node_stats + self.neighbors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_roundtrip_precision() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(from_millis(to_millis(at)).unwrap(), at);
    }

    #[test]
    fn test_message_direction() {
        assert_eq!(
            MessageDirection::parse("outbound").unwrap(),
            MessageDirection::Outbound
        );
        assert!(MessageDirection::parse("sideways").is_err());
    }

    #[test]
    fn test_cleanup_total() {
        let report = CleanupReport {
            packets: 3,
            messages: 1,
            node_stats: 0,
            neighbors: 2,
        };
        assert_eq!(report.total(), 6);
    }
}
