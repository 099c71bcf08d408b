//! Router configuration

use dualmesh_core::config::humantime_serde;
use dualmesh_core::{NetworkSource, NodeId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// This node's own identifier on each network
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnNodeIds {
    /// Id of our radio on network A
    #[serde(default)]
    pub net_a: Option<NodeId>,
    /// Id of our radio on network B
    #[serde(default)]
    pub net_b: Option<NodeId>,
}

impl OwnNodeIds {
    /// Own id on `network`, if known
    pub fn get(&self, network: NetworkSource) -> Option<NodeId> {
        match network {
            NetworkSource::NetA => self.net_a,
            NetworkSource::NetB => self.net_b,
        }
    }

    /// Whether `node` is one of our own radios
    pub fn contains(&self, node: NodeId) -> bool {
        self.net_a == Some(node) || self.net_b == Some(node)
    }
}

/// Configuration for the [`crate::DualNetworkRouter`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Network used for senders that were never heard
    #[serde(default = "default_primary")]
    pub primary_network: NetworkSource,

    /// Our own node ids
    #[serde(default)]
    pub own_ids: OwnNodeIds,

    /// How long a fingerprint suppresses repeats
    #[serde(with = "humantime_serde", default = "default_dedup_window")]
    pub dedup_window: Duration,

    /// Upper bound on remembered fingerprints
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,

    /// Capacity of the accepted-packet channel to the command layer
    #[serde(default = "default_accepted_queue")]
    pub accepted_queue: usize,
}

fn default_primary() -> NetworkSource {
    NetworkSource::NetA
}

fn default_dedup_window() -> Duration {
    Duration::from_secs(5)
}

fn default_dedup_capacity() -> usize {
    4096
}

fn default_accepted_queue() -> usize {
    256
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            primary_network: default_primary(),
            own_ids: OwnNodeIds::default(),
            dedup_window: default_dedup_window(),
            dedup_capacity: default_dedup_capacity(),
            accepted_queue: default_accepted_queue(),
        }
    }
}
