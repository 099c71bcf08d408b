//! Which network each sender was last heard on

use chrono::{DateTime, Utc};
use dualmesh_core::{NetworkSource, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Where and when a sender was last heard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderEntry {
    /// Network that delivered the sender's latest accepted packet
    pub network: NetworkSource,
    /// Reception time of that packet
    pub last_seen: DateTime<Utc>,
}

/// Sender to network attribution table
///
/// One entry per sender, replaced wholesale on every accepted packet so a
/// reply always follows the most recent network. Entries are never removed;
/// the table is rebuilt from live traffic after a restart.
#[derive(Debug, Clone, Default)]
pub struct SenderNetworkMap {
    entries: HashMap<NodeId, SenderEntry>,
}

impl SenderNetworkMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `sender` was heard on `network`
    ///
    /// Returns the entry that was replaced, if any.
    pub fn record(
        &mut self,
        sender: NodeId,
        network: NetworkSource,
        seen_at: DateTime<Utc>,
    ) -> Option<SenderEntry> {
        let entry = SenderEntry {
            network,
            last_seen: seen_at,
        };
        let previous = self.entries.insert(sender, entry);

        match previous {
            Some(prev) if prev.network != network => {
                debug!(
                    sender = %sender,
                    from = %prev.network,
                    to = %network,
                    "Sender moved networks"
                );
            }
            None => trace!(sender = %sender, network = %network, "New sender"),
            _ => {}
        }
        previous
    }

    /// Network a reply to `sender` should use, if the sender is known
    pub fn lookup(&self, sender: NodeId) -> Option<NetworkSource> {
        self.entries.get(&sender).map(|entry| entry.network)
    }

    /// Full entry for `sender`
    pub fn entry(&self, sender: NodeId) -> Option<&SenderEntry> {
        self.entries.get(&sender)
    }

    /// Number of senders last heard on `network`
    pub fn count_on(&self, network: NetworkSource) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.network == network)
            .count()
    }

    /// All entries, most recently heard first
    pub fn snapshot(&self) -> Vec<(NodeId, SenderEntry)> {
        let mut entries: Vec<_> = self.entries.iter().map(|(k, v)| (*k, *v)).collect();
        entries.sort_by(|a, b| b.1.last_seen.cmp(&a.1.last_seen).then(a.0.cmp(&b.0)));
        entries
    }

    /// Number of known senders
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no sender was heard yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
