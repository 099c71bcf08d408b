//! SQLite traffic store
//!
//! Four tables, all carrying a unix-millisecond `timestamp` column that the
//! shared cleanup routine keys on:
//!
//! - `packets` - every accepted packet
//! - `messages` - broadcast text heard on the mesh and everything we sent
//! - `node_stats` - latest telemetry/position/signal snapshot per node
//! - `neighbors` - topology edges from neighbor-info reports

use chrono::{DateTime, Utc};
use dualmesh_core::{NodeId, OutboundMessage, Packet, Payload};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Row, Sqlite, Transaction};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{RetentionPolicy, StoreConfig};
use crate::error::{Result, StateError};
use crate::records::{
    to_millis, CleanupReport, MessageDirection, MessageRecord, NeighborRecord, NetworkTraffic,
    NodeStatsRecord, PacketRecord, SenderActivity, TableCounts,
};

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS packets (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp INTEGER NOT NULL,
        network TEXT NOT NULL,
        sender INTEGER NOT NULL,
        destination INTEGER NOT NULL,
        packet_id INTEGER NOT NULL,
        channel INTEGER NOT NULL,
        kind TEXT NOT NULL,
        summary TEXT NOT NULL,
        snr REAL,
        rssi INTEGER,
        hop_count INTEGER,
        via_transport TEXT NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_packets_timestamp ON packets(timestamp)",
    "CREATE INDEX IF NOT EXISTS idx_packets_sender ON packets(sender, timestamp)",
    r#"CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp INTEGER NOT NULL,
        network TEXT NOT NULL,
        sender INTEGER NOT NULL,
        destination INTEGER NOT NULL,
        channel INTEGER NOT NULL,
        text TEXT NOT NULL,
        direction TEXT NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages(timestamp)",
    r#"CREATE TABLE IF NOT EXISTS node_stats (
        node_id INTEGER PRIMARY KEY,
        network TEXT NOT NULL,
        timestamp INTEGER NOT NULL,
        long_name TEXT,
        short_name TEXT,
        hw_model TEXT,
        battery_level INTEGER,
        voltage REAL,
        channel_utilization REAL,
        air_util_tx REAL,
        uptime_seconds INTEGER,
        latitude REAL,
        longitude REAL,
        altitude INTEGER,
        snr REAL,
        rssi INTEGER,
        hop_count INTEGER,
        packet_count INTEGER NOT NULL DEFAULT 0
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_node_stats_timestamp ON node_stats(timestamp)",
    r#"CREATE TABLE IF NOT EXISTS neighbors (
        node_id INTEGER NOT NULL,
        neighbor_id INTEGER NOT NULL,
        snr REAL,
        network TEXT NOT NULL,
        timestamp INTEGER NOT NULL,
        PRIMARY KEY (node_id, neighbor_id)
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_neighbors_timestamp ON neighbors(timestamp)",
];

/// Tables subject to retention, in cleanup order
const RETAINED_TABLES: [&str; 4] = ["packets", "messages", "node_stats", "neighbors"];

fn node_param(node: NodeId) -> i64 {
    node.as_u32() as i64
}

fn horizon_millis(horizon: Duration) -> i64 {
    i64::try_from(horizon.as_millis()).unwrap_or(i64::MAX)
}

/// Durable packet/message/node history
#[derive(Debug, Clone)]
pub struct TrafficStore {
    pool: SqlitePool,
    path: Option<PathBuf>,
}

impl TrafficStore {
    /// Open (or create) the store at `path`
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let config = StoreConfig {
            path: path.as_ref().to_path_buf(),
            ..StoreConfig::default()
        };
        Self::open_with(&config).await
    }

    /// Open using a full store configuration
    pub async fn open_with(config: &StoreConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        let store = Self {
            pool,
            path: Some(config.path.clone()),
        };
        store.init_schema().await?;
        info!(path = %config.path.display(), "Opened traffic store");
        Ok(store)
    }

    /// Private in-memory store, used by tests and dry runs
    pub async fn in_memory() -> Result<Self> {
        let options: SqliteConnectOptions = "sqlite::memory:"
            .parse()
            .map_err(|e: sqlx::Error| StateError::Connection(e.to_string()))?;
        // A single connection that never expires keeps the database alive
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        let store = Self { pool, path: None };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Database file, if the store is file-backed
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Close all connections
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Persist an accepted inbound packet
    ///
    /// Writes the packet log row, refreshes the sender's node stats and,
    /// depending on the payload, the message log or neighbor edges. All in
    /// one transaction.
    pub async fn save(&self, packet: &Packet) -> Result<()> {
        let timestamp = to_millis(packet.received_at());
        let network = packet.network().as_str();
        let sender = node_param(packet.sender());
        let signal = packet.signal();
        let snr = signal.and_then(|s| s.snr).map(f64::from);
        let rssi = signal.and_then(|s| s.rssi).map(i64::from);
        let hop_count = signal.and_then(|s| s.hop_count).map(i64::from);

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"INSERT INTO packets
               (timestamp, network, sender, destination, packet_id, channel, kind, summary,
                snr, rssi, hop_count, via_transport)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(timestamp)
        .bind(network)
        .bind(sender)
        .bind(node_param(packet.destination()))
        .bind(packet.packet_id() as i64)
        .bind(packet.channel() as i64)
        .bind(packet.kind().as_str())
        .bind(packet.payload().summary())
        .bind(snr)
        .bind(rssi)
        .bind(hop_count)
        .bind(packet.via_transport())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"INSERT INTO node_stats (node_id, network, timestamp, snr, rssi, hop_count, packet_count)
               VALUES (?, ?, ?, ?, ?, ?, 1)
               ON CONFLICT(node_id) DO UPDATE SET
                   network = excluded.network,
                   timestamp = excluded.timestamp,
                   snr = COALESCE(excluded.snr, node_stats.snr),
                   rssi = COALESCE(excluded.rssi, node_stats.rssi),
                   hop_count = COALESCE(excluded.hop_count, node_stats.hop_count),
                   packet_count = node_stats.packet_count + 1"#,
        )
        .bind(sender)
        .bind(network)
        .bind(timestamp)
        .bind(snr)
        .bind(rssi)
        .bind(hop_count)
        .execute(&mut *tx)
        .await?;

        Self::save_payload(&mut tx, packet, timestamp).await?;

        tx.commit().await?;
        debug!(
            network,
            from = %packet.sender(),
            kind = %packet.kind(),
            "Persisted packet"
        );
        Ok(())
    }

    async fn save_payload(
        tx: &mut Transaction<'static, Sqlite>,
        packet: &Packet,
        timestamp: i64,
    ) -> Result<()> {
        let sender = node_param(packet.sender());
        let network = packet.network().as_str();

        match packet.payload() {
            Payload::Text(text) => {
                if packet.is_broadcast() {
                    sqlx::query(
                        r#"INSERT INTO messages
                           (timestamp, network, sender, destination, channel, text, direction)
                           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
                    )
                    .bind(timestamp)
                    .bind(network)
                    .bind(sender)
                    .bind(node_param(packet.destination()))
                    .bind(packet.channel() as i64)
                    .bind(text.as_str())
                    .bind(MessageDirection::Inbound.as_str())
                    .execute(&mut **tx)
                    .await?;
                }
            }
            Payload::Telemetry(t) => {
                sqlx::query(
                    r#"UPDATE node_stats SET
                           battery_level = COALESCE(?, battery_level),
                           voltage = COALESCE(?, voltage),
                           channel_utilization = COALESCE(?, channel_utilization),
                           air_util_tx = COALESCE(?, air_util_tx),
                           uptime_seconds = COALESCE(?, uptime_seconds)
                       WHERE node_id = ?"#,
                )
                .bind(t.battery_level.map(i64::from))
                .bind(t.voltage.map(f64::from))
                .bind(t.channel_utilization.map(f64::from))
                .bind(t.air_util_tx.map(f64::from))
                .bind(t.uptime_seconds.map(i64::from))
                .bind(sender)
                .execute(&mut **tx)
                .await?;
            }
            Payload::Position(p) => {
                sqlx::query(
                    r#"UPDATE node_stats SET
                           latitude = ?,
                           longitude = ?,
                           altitude = COALESCE(?, altitude)
                       WHERE node_id = ?"#,
                )
                .bind(p.latitude)
                .bind(p.longitude)
                .bind(p.altitude.map(i64::from))
                .bind(sender)
                .execute(&mut **tx)
                .await?;
            }
            Payload::NodeInfo(info) => {
                sqlx::query(
                    r#"UPDATE node_stats SET
                           long_name = ?,
                           short_name = ?,
                           hw_model = COALESCE(?, hw_model)
                       WHERE node_id = ?"#,
                )
                .bind(info.long_name.as_str())
                .bind(info.short_name.as_str())
                .bind(info.hw_model.as_deref())
                .bind(sender)
                .execute(&mut **tx)
                .await?;
            }
            Payload::NeighborInfo(report) => {
                for neighbor in &report.neighbors {
                    sqlx::query(
                        r#"INSERT INTO neighbors (node_id, neighbor_id, snr, network, timestamp)
                           VALUES (?, ?, ?, ?, ?)
                           ON CONFLICT(node_id, neighbor_id) DO UPDATE SET
                               snr = excluded.snr,
                               network = excluded.network,
                               timestamp = excluded.timestamp"#,
                    )
                    .bind(sender)
                    .bind(node_param(neighbor.node_id))
                    .bind(neighbor.snr.map(f64::from))
                    .bind(network)
                    .bind(timestamp)
                    .execute(&mut **tx)
                    .await?;
                }
            }
            Payload::Unknown { .. } => {}
        }
        Ok(())
    }

    /// Log a message sent by this node
    pub async fn save_outbound(&self, message: &OutboundMessage, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO messages
               (timestamp, network, sender, destination, channel, text, direction)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(to_millis(at))
        .bind(message.network.as_str())
        .bind(node_param(message.from))
        .bind(node_param(message.destination))
        .bind(message.channel as i64)
        .bind(message.text.as_str())
        .bind(MessageDirection::Outbound.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Remove rows older than the retention horizons
    pub async fn cleanup(&self, policy: &RetentionPolicy) -> Result<CleanupReport> {
        self.cleanup_at(Utc::now(), policy).await
    }

    /// Remove rows with `timestamp < now - horizon`, then compact
    ///
    /// Rows exactly at the cutoff are kept.
    pub async fn cleanup_at(
        &self,
        now: DateTime<Utc>,
        policy: &RetentionPolicy,
    ) -> Result<CleanupReport> {
        let now_ms = to_millis(now);
        let horizons = [
            policy.packets,
            policy.messages,
            policy.node_stats,
            policy.neighbors,
        ];

        let mut removed = [0u64; 4];
        for ((table, horizon), slot) in RETAINED_TABLES
            .iter()
            .zip(horizons)
            .zip(removed.iter_mut())
        {
            let cutoff = now_ms.saturating_sub(horizon_millis(horizon));
            let sql = format!("DELETE FROM {} WHERE timestamp < ?", table);
            let result = sqlx::query(&sql).bind(cutoff).execute(&self.pool).await?;
            *slot = result.rows_affected();
        }

        let report = CleanupReport {
            packets: removed[0],
            messages: removed[1],
            node_stats: removed[2],
            neighbors: removed[3],
        };

        if report.total() > 0 {
            self.compact().await?;
            info!(
                packets = report.packets,
                messages = report.messages,
                node_stats = report.node_stats,
                neighbors = report.neighbors,
                "Retention cleanup removed rows"
            );
        } else {
            debug!("Retention cleanup found nothing to remove");
        }
        Ok(report)
    }

    /// Reclaim free pages
    pub async fn compact(&self) -> Result<()> {
        if self.path.is_none() {
            return Ok(());
        }
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }

    /// Lightweight integrity check (`PRAGMA quick_check`)
    pub async fn integrity_check(&self) -> Result<()> {
        let rows: Vec<String> = sqlx::query_scalar("PRAGMA quick_check")
            .fetch_all(&self.pool)
            .await?;
        if rows.len() == 1 && rows[0] == "ok" {
            Ok(())
        } else {
            warn!(problems = rows.len(), "Store integrity check failed");
            Err(StateError::Integrity(rows.join("; ")))
        }
    }

    /// Most recent packets, newest first
    pub async fn recent_packets(&self, limit: u32) -> Result<Vec<PacketRecord>> {
        let rows = sqlx::query("SELECT * FROM packets ORDER BY timestamp DESC, id DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(PacketRecord::from_row).collect()
    }

    /// Most recent message log entries, newest first
    pub async fn recent_messages(&self, limit: u32) -> Result<Vec<MessageRecord>> {
        let rows = sqlx::query("SELECT * FROM messages ORDER BY timestamp DESC, id DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(MessageRecord::from_row).collect()
    }

    /// Latest snapshot for one node
    pub async fn node_stats(&self, node: NodeId) -> Result<Option<NodeStatsRecord>> {
        let row = sqlx::query("SELECT * FROM node_stats WHERE node_id = ?")
            .bind(node_param(node))
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(NodeStatsRecord::from_row).transpose()
    }

    /// Neighbors reported by `node`, best link first
    pub async fn neighbors_of(&self, node: NodeId) -> Result<Vec<NeighborRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM neighbors WHERE node_id = ? ORDER BY snr DESC, neighbor_id ASC",
        )
        .bind(node_param(node))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(NeighborRecord::from_row).collect()
    }

    /// Packet counts per network since `since`
    pub async fn traffic_summary(&self, since: DateTime<Utc>) -> Result<Vec<NetworkTraffic>> {
        let rows = sqlx::query(
            r#"SELECT network, COUNT(*) AS packets, COUNT(DISTINCT sender) AS senders
               FROM packets WHERE timestamp >= ?
               GROUP BY network ORDER BY network"#,
        )
        .bind(to_millis(since))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<NetworkTraffic> {
                let packets: i64 = row.try_get("packets")?;
                let senders: i64 = row.try_get("senders")?;
                Ok(NetworkTraffic {
                    network: row.try_get("network")?,
                    packets: packets as u64,
                    unique_senders: senders as u64,
                })
            })
            .collect()
    }

    /// Busiest senders since `since`
    pub async fn top_senders(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<SenderActivity>> {
        let rows = sqlx::query(
            r#"SELECT sender, COUNT(*) AS packets FROM packets
               WHERE timestamp >= ?
               GROUP BY sender ORDER BY packets DESC, sender ASC LIMIT ?"#,
        )
        .bind(to_millis(since))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<SenderActivity> {
                let sender: i64 = row.try_get("sender")?;
                let packets: i64 = row.try_get("packets")?;
                Ok(SenderActivity {
                    node_id: NodeId(sender as u32),
                    packets: packets as u64,
                })
            })
            .collect()
    }

    /// Row count of every table
    pub async fn table_counts(&self) -> Result<TableCounts> {
        let mut counts = [0u64; 4];
        for (table, slot) in RETAINED_TABLES.iter().zip(counts.iter_mut()) {
            let sql = format!("SELECT COUNT(*) FROM {}", table);
            let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
            *slot = count as u64;
        }
        Ok(TableCounts {
            packets: counts[0],
            messages: counts[1],
            node_stats: counts[2],
            neighbors: counts[3],
        })
    }
}
