//! Store and retention configuration

use dualmesh_core::config::humantime_serde;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const HOUR: u64 = 60 * 60;
const DAY: u64 = 24 * HOUR;

/// Maximum age per table before cleanup removes a row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Raw packet log
    #[serde(with = "humantime_serde", default = "default_packets")]
    pub packets: Duration,
    /// Broadcast and outbound message log
    #[serde(with = "humantime_serde", default = "default_messages")]
    pub messages: Duration,
    /// Per-node rolling statistics
    #[serde(with = "humantime_serde", default = "default_node_stats")]
    pub node_stats: Duration,
    /// Neighbor topology edges
    #[serde(with = "humantime_serde", default = "default_neighbors")]
    pub neighbors: Duration,
}

impl RetentionPolicy {
    /// Same horizon for every table
    pub fn uniform_hours(hours: u64) -> Self {
        let horizon = Duration::from_secs(hours * HOUR);
        Self {
            packets: horizon,
            messages: horizon,
            node_stats: horizon,
            neighbors: horizon,
        }
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            packets: default_packets(),
            messages: default_messages(),
            node_stats: default_node_stats(),
            neighbors: default_neighbors(),
        }
    }
}

fn default_packets() -> Duration {
    Duration::from_secs(48 * HOUR)
}

fn default_messages() -> Duration {
    Duration::from_secs(7 * DAY)
}

fn default_node_stats() -> Duration {
    Duration::from_secs(30 * DAY)
}

fn default_neighbors() -> Duration {
    Duration::from_secs(30 * DAY)
}

/// Traffic store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file
    #[serde(default = "default_path")]
    pub path: PathBuf,

    /// Connection pool size
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Capacity of the single-writer queue
    #[serde(default = "default_queue")]
    pub write_queue: usize,

    /// Interval between cleanup passes
    #[serde(with = "humantime_serde", default = "default_cleanup_interval")]
    pub cleanup_interval: Duration,

    /// Retention horizons
    #[serde(default)]
    pub retention: RetentionPolicy,
}

fn default_path() -> PathBuf {
    PathBuf::from("data/traffic.db")
}

fn default_max_connections() -> u32 {
    4
}

fn default_queue() -> usize {
    1024
}

fn default_cleanup_interval() -> Duration {
    Duration::from_secs(6 * HOUR)
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            max_connections: default_max_connections(),
            write_queue: default_queue(),
            cleanup_interval: default_cleanup_interval(),
            retention: RetentionPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_retention() {
        let policy = RetentionPolicy::default();
        assert_eq!(policy.packets, Duration::from_secs(48 * 3600));
        assert_eq!(policy.neighbors, Duration::from_secs(30 * 86400));
    }

    #[test]
    fn test_parse_toml() {
        let config: StoreConfig = toml::from_str(
            r#"
            path = "/var/lib/dualmesh/traffic.db"

            [retention]
            packets = "24h"
            "#,
        )
        .unwrap();

        assert_eq!(config.retention.packets, Duration::from_secs(24 * 3600));
        assert_eq!(config.retention.messages, Duration::from_secs(7 * 86400));
        assert_eq!(config.write_queue, 1024);
    }
}
