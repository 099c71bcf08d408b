//! Node configuration file
//!
//! Everything the daemon needs lives in one TOML file. Every section is
//! optional; see `config/dualmesh.example.toml` for the full layout.

use anyhow::{bail, Context};
use dualmesh_core::NetworkSource;
use dualmesh_health::WatchdogConfig;
use dualmesh_link::{FramingPreset, LinkConfig, LinkConfigBuilder, DEFAULT_TCP_PORT};
use dualmesh_router::RouterConfig;
use dualmesh_state::StoreConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Built-in `ping` responder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponderConfig {
    /// Answer pings at all
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Message that triggers a reply (case insensitive)
    #[serde(default = "default_keyword")]
    pub keyword: String,
    /// Reply text
    #[serde(default = "default_reply")]
    pub reply: String,
}

fn default_true() -> bool {
    true
}

fn default_keyword() -> String {
    "ping".to_string()
}

fn default_reply() -> String {
    "pong".to_string()
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            keyword: default_keyword(),
            reply: default_reply(),
        }
    }
}

/// Complete daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Radio link for network A
    #[serde(default = "default_net_a")]
    pub net_a: LinkConfig,

    /// Radio link for network B
    #[serde(default = "default_net_b")]
    pub net_b: LinkConfig,

    /// Dedup and routing
    #[serde(default)]
    pub router: RouterConfig,

    /// Traffic database
    #[serde(default)]
    pub store: StoreConfig,

    /// Health watchdog
    #[serde(default)]
    pub health: WatchdogConfig,

    /// Built-in responder
    #[serde(default)]
    pub responder: ResponderConfig,
}

fn default_net_a() -> LinkConfig {
    LinkConfigBuilder::new()
        .serial("/dev/ttyUSB0")
        .framing(FramingPreset::ProtocolA)
        .build()
}

fn default_net_b() -> LinkConfig {
    LinkConfigBuilder::new()
        .tcp("127.0.0.1", DEFAULT_TCP_PORT)
        .framing(FramingPreset::ProtocolB)
        .build()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            net_a: default_net_a(),
            net_b: default_net_b(),
            router: RouterConfig::default(),
            store: StoreConfig::default(),
            health: WatchdogConfig::default(),
            responder: ResponderConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load and validate a TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: NodeConfig =
            toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Link configuration for `network`
    pub fn link(&self, network: NetworkSource) -> &LinkConfig {
        match network {
            NetworkSource::NetA => &self.net_a,
            NetworkSource::NetB => &self.net_b,
        }
    }

    /// Networks with an enabled link
    pub fn enabled_networks(&self) -> Vec<NetworkSource> {
        NetworkSource::ALL
            .into_iter()
            .filter(|network| self.link(*network).enabled)
            .collect()
    }

    /// Directory probed by the filesystem health check
    pub fn data_dir(&self) -> PathBuf {
        match self.store.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Reject configurations the bridge cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.enabled_networks().is_empty() {
            bail!("both networks are disabled; enable net_a or net_b");
        }

        let primary = self.router.primary_network;
        if !self.link(primary).enabled {
            bail!(
                "primary network {} is disabled; replies to unknown senders would have nowhere to go",
                primary
            );
        }

        let both_enabled = self.net_a.enabled && self.net_b.enabled;
        if both_enabled && self.net_a.transport.peer() == self.net_b.transport.peer() {
            bail!(
                "net_a and net_b both use {}; each radio allows a single connection",
                self.net_a.transport.peer()
            );
        }

        // Replies are stamped with our id and their echoes matched against it
        for network in self.enabled_networks() {
            if self.router.own_ids.get(network).is_none() {
                bail!(
                    "router.own_ids.{} must be set while {} is enabled",
                    network,
                    network
                );
            }
        }

        if self.router.dedup_window.is_zero() {
            bail!("router.dedup_window must be greater than zero");
        }

        if self.health.failure_threshold == 0 {
            bail!("health.failure_threshold must be at least 1");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dualmesh_core::NodeId;
    use std::time::Duration;

    fn with_own_ids() -> NodeConfig {
        let mut config = NodeConfig::default();
        config.router.own_ids.net_a = Some(NodeId(0x10));
        config.router.own_ids.net_b = Some(NodeId(0x20));
        config
    }

    #[test]
    fn test_default_needs_only_own_ids() {
        let err = NodeConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains("router.own_ids.net_a"));
        with_own_ids().validate().unwrap();
    }

    #[test]
    fn test_rejects_missing_own_id() {
        let mut config = with_own_ids();
        config.router.own_ids.net_b = None;
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "router.own_ids.net_b must be set while net_b is enabled"
        );

        // A disabled network needs no id
        config.net_b.enabled = false;
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_example_shape() {
        let config: NodeConfig = toml::from_str(
            r#"
            [net_a.transport]
            type = "serial"
            device = "/dev/ttyACM0"

            [net_b]
            framing = "protocol_b"
            silence_timeout = "3m"

            [net_b.transport]
            type = "tcp"
            host = "192.168.1.40"

            [router]
            primary_network = "net_b"
            dedup_window = "10s"

            [router.own_ids]
            net_a = 3735928559
            net_b = 16

            [store]
            path = "/var/lib/dualmesh/traffic.db"

            [health]
            escalate = true
            "#,
        )
        .unwrap();

        config.validate().unwrap();
        assert_eq!(config.net_b.transport.peer(), "192.168.1.40:4403");
        assert_eq!(config.net_b.silence_timeout, Duration::from_secs(180));
        assert_eq!(config.router.primary_network, NetworkSource::NetB);
        assert_eq!(config.router.dedup_window, Duration::from_secs(10));
        assert_eq!(config.data_dir(), PathBuf::from("/var/lib/dualmesh"));
        assert!(config.health.escalate);
        assert!(config.responder.enabled);
    }

    #[test]
    fn test_rejects_both_disabled() {
        let mut config = with_own_ids();
        config.net_a.enabled = false;
        config.net_b.enabled = false;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("both networks"));
    }

    #[test]
    fn test_rejects_disabled_primary() {
        let mut config = with_own_ids();
        config.net_a.enabled = false;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("primary network net_a"));

        config.router.primary_network = NetworkSource::NetB;
        config.validate().unwrap();
        assert_eq!(config.enabled_networks(), vec![NetworkSource::NetB]);
    }

    #[test]
    fn test_rejects_shared_peer() {
        let mut config = with_own_ids();
        config.net_a = LinkConfigBuilder::new().tcp("127.0.0.1", DEFAULT_TCP_PORT).build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dualmesh.toml");
        std::fs::write(&path, "[net_b]\nenabled = false\n\n[router.own_ids]\nnet_a = 16\n")
            .unwrap();

        let config = NodeConfig::load(&path).unwrap();
        assert_eq!(config.enabled_networks(), vec![NetworkSource::NetA]);

        assert!(NodeConfig::load(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_example_file() {
        let config: NodeConfig =
            toml::from_str(include_str!("../../../config/dualmesh.example.toml")).unwrap();
        config.validate().unwrap();
        assert_eq!(config.store.retention.messages, Duration::from_secs(7 * 86400));
        assert!(config.health.watch_links);
        assert!(config.net_b.remote_reboot.is_none());
    }

    #[test]
    fn test_data_dir_relative() {
        let mut config = NodeConfig::default();
        config.store.path = PathBuf::from("traffic.db");
        assert_eq!(config.data_dir(), PathBuf::from("."));
    }
}
