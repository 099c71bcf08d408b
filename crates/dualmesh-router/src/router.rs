//! The dual-network router
//!
//! Both supervisors feed one inbound channel. For every packet the router
//! decides whether it is new, remembers which network the sender was heard
//! on, and hands it to persistence and the command layer. Replies go back
//! through [`RouterHandle::route`] on the network the sender was last
//! heard on, never on the other one.
//!
//! Dedup window, sender map and counters share a single
//! `parking_lot::Mutex`. It is never held across an `.await`; sends happen
//! after the lookup has released it.

use dualmesh_core::{NetworkSource, NodeId, OutboundMessage, Packet, BROADCAST};
use dualmesh_link::ConnectionState;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use crate::config::RouterConfig;
use crate::dedup::{DedupEngine, DedupStats, Fingerprint};
use crate::error::{Result, RoutingError};
use crate::link::{OutboundLink, TrafficSink};
use crate::sender_map::{SenderEntry, SenderNetworkMap};

/// What happened to an ingested packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingOutcome {
    /// New packet, persisted and forwarded to the command layer
    Accepted,
    /// Seen inside the dedup window, dropped
    Duplicate,
    /// Our own self-addressed echo, dropped
    Filtered,
}

impl fmt::Display for ProcessingOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingOutcome::Accepted => write!(f, "accepted"),
            ProcessingOutcome::Duplicate => write!(f, "duplicate"),
            ProcessingOutcome::Filtered => write!(f, "filtered"),
        }
    }
}

/// A reply that left the bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    /// Network it was sent on
    pub network: NetworkSource,
    /// Radio packet id assigned by the link
    pub packet_id: u32,
    /// Recipient
    pub destination: NodeId,
}

/// Per-network router counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkCounters {
    /// Packets accepted
    pub accepted: u64,
    /// Packets dropped as duplicates
    pub duplicates: u64,
    /// Self-addressed echoes dropped
    pub filtered: u64,
    /// Replies sent
    pub routed: u64,
    /// Replies that could not be sent
    pub routing_failures: u64,
}

/// Router counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouterStats {
    /// Counters for each network, indexed by [`NetworkSource::index`]
    pub networks: [NetworkCounters; 2],
    /// Our own broadcasts heard coming back
    pub own_broadcasts_seen: u64,
    /// Senders with a known network
    pub known_senders: usize,
    /// Accepted packets dropped because the command layer was full
    pub dispatch_dropped: u64,
}

impl RouterStats {
    /// Counters for one network
    pub fn network(&self, network: NetworkSource) -> &NetworkCounters {
        &self.networks[network.index()]
    }

    /// Accepted packets over both networks
    pub fn total_accepted(&self) -> u64 {
        self.networks.iter().map(|c| c.accepted).sum()
    }

    /// Duplicates over both networks
    pub fn total_duplicates(&self) -> u64 {
        self.networks.iter().map(|c| c.duplicates).sum()
    }
}

struct RouterState {
    dedup: DedupEngine,
    senders: SenderNetworkMap,
    stats: RouterStats,
}

/// Attribution, dedup and reply routing for both networks
pub struct DualNetworkRouter {
    config: RouterConfig,
    state: Mutex<RouterState>,
    links: [Option<Arc<dyn OutboundLink>>; 2],
    sink: Arc<dyn TrafficSink>,
}

impl DualNetworkRouter {
    /// Create a router with no links attached
    pub fn new(config: RouterConfig, sink: Arc<dyn TrafficSink>) -> Self {
        let dedup = DedupEngine::new(config.dedup_window, config.dedup_capacity);
        Self {
            config,
            state: Mutex::new(RouterState {
                dedup,
                senders: SenderNetworkMap::new(),
                stats: RouterStats::default(),
            }),
            links: [None, None],
            sink,
        }
    }

    /// Attach the link serving `link.network()`
    pub fn with_link(mut self, link: Arc<dyn OutboundLink>) -> Self {
        let index = link.network().index();
        self.links[index] = Some(link);
        self
    }

    /// Wrap in a shareable handle
    pub fn into_handle(self) -> RouterHandle {
        RouterHandle {
            router: Arc::new(self),
        }
    }

    /// Our own node id on `network`
    pub fn own_id(&self, network: NetworkSource) -> Option<NodeId> {
        self.config.own_ids.get(network)
    }

    /// Configured primary network
    pub fn primary_network(&self) -> NetworkSource {
        self.config.primary_network
    }

    /// Process one inbound packet
    pub fn ingest(&self, packet: &Packet) -> ProcessingOutcome {
        self.ingest_at(packet, Instant::now())
    }

    /// Process one inbound packet at an explicit instant
    pub fn ingest_at(&self, packet: &Packet, now: Instant) -> ProcessingOutcome {
        let network = packet.network();
        let own = self.own_id(network);
        let from_self = own == Some(packet.sender());

        let mut state = self.state.lock();

        if from_self && !packet.is_broadcast() && own == Some(packet.destination()) {
            state.stats.networks[network.index()].filtered += 1;
            trace!(
                network = %network,
                packet_id = packet.packet_id(),
                "Filtered self-addressed echo"
            );
            return ProcessingOutcome::Filtered;
        }

        if from_self && packet.is_broadcast() {
            state.stats.own_broadcasts_seen += 1;
        }

        let fingerprint = Fingerprint::of_packet(packet);
        if !state.dedup.should_process_at(fingerprint, now) {
            state.stats.networks[network.index()].duplicates += 1;
            debug!(
                network = %network,
                from = %packet.sender(),
                via = packet.via_transport(),
                fingerprint = %fingerprint,
                "Dropped duplicate packet"
            );
            return ProcessingOutcome::Duplicate;
        }

        state
            .senders
            .record(packet.sender(), network, packet.received_at());
        state.stats.networks[network.index()].accepted += 1;
        drop(state);

        self.sink.record_inbound(packet);
        trace!(
            network = %network,
            from = %packet.sender(),
            kind = %packet.kind(),
            "Accepted packet"
        );
        ProcessingOutcome::Accepted
    }

    /// Network a reply to `sender` would use
    pub fn resolve_network(&self, sender: NodeId) -> NetworkSource {
        self.state
            .lock()
            .senders
            .lookup(sender)
            .unwrap_or(self.config.primary_network)
    }

    /// Send `text` to `destination` on the network `sender` was last heard on
    ///
    /// Unknown senders go to the primary network. When that network's link
    /// is not connected the reply fails with
    /// [`RoutingError::NetworkUnavailable`]; it is never re-sent on the other
    /// network. Without our own id on that network the reply is refused with
    /// [`RoutingError::NoOwnId`].
    pub async fn route(
        &self,
        sender: NodeId,
        destination: NodeId,
        text: impl Into<String>,
    ) -> Result<Sent> {
        let network = self.resolve_network(sender);
        let Some(from) = self.own_id(network) else {
            self.count_failure(network);
            warn!(network = %network, "Reply dropped, own node id unknown");
            return Err(RoutingError::NoOwnId(network));
        };
        let message = OutboundMessage::text(network, from, destination, text);
        self.send_on(message).await
    }

    /// Send a prepared message on its own network
    pub async fn send_on(&self, message: OutboundMessage) -> Result<Sent> {
        let network = message.network;

        let link = match &self.links[network.index()] {
            Some(link) => Arc::clone(link),
            None => {
                self.count_failure(network);
                return Err(RoutingError::NoLink(network));
            }
        };

        let state = link.state();
        if state != ConnectionState::Connected {
            self.count_failure(network);
            warn!(network = %network, link_state = %state, "Reply dropped, network unavailable");
            return Err(RoutingError::NetworkUnavailable { network, state });
        }

        // Recorded before the write so an echo read right after it is caught
        let recorded = message.is_broadcast();
        if recorded {
            self.state.lock().dedup.record_outbound(&message);
        }

        let destination = message.destination;
        match link.send(message.clone()).await {
            Ok(packet_id) => {
                self.state.lock().stats.networks[network.index()].routed += 1;
                self.sink.record_outbound(&message);
                debug!(network = %network, to = %destination, packet_id, "Reply sent");
                Ok(Sent {
                    network,
                    packet_id,
                    destination,
                })
            }
            Err(e) => {
                {
                    let mut state = self.state.lock();
                    state.stats.networks[network.index()].routing_failures += 1;
                    if recorded {
                        state.dedup.forget(&Fingerprint::of_outbound(&message));
                    }
                }
                warn!(network = %network, code = e.error_code(), "Reply send failed: {}", e);
                Err(RoutingError::SendFailed {
                    network,
                    reason: e.to_string(),
                })
            }
        }
    }

    fn count_failure(&self, network: NetworkSource) {
        self.state.lock().stats.networks[network.index()].routing_failures += 1;
    }

    /// Where `sender` was last heard
    pub fn sender_entry(&self, sender: NodeId) -> Option<SenderEntry> {
        self.state.lock().senders.entry(sender).copied()
    }

    /// Counters snapshot
    pub fn stats(&self) -> RouterStats {
        let state = self.state.lock();
        let mut stats = state.stats.clone();
        stats.known_senders = state.senders.len();
        stats
    }

    /// Dedup counters snapshot
    pub fn dedup_stats(&self) -> DedupStats {
        self.state.lock().dedup.stats()
    }
}

impl fmt::Debug for DualNetworkRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DualNetworkRouter")
            .field("primary_network", &self.config.primary_network)
            .field("net_a_link", &self.links[0].is_some())
            .field("net_b_link", &self.links[1].is_some())
            .finish()
    }
}

/// Shareable handle to the router, given to the command layer
#[derive(Debug, Clone)]
pub struct RouterHandle {
    router: Arc<DualNetworkRouter>,
}

impl RouterHandle {
    /// Reply to `destination` on the network `sender` was last heard on
    pub async fn route(
        &self,
        sender: NodeId,
        destination: NodeId,
        text: impl Into<String>,
    ) -> Result<Sent> {
        self.router.route(sender, destination, text).await
    }

    /// Reply to a packet: direct messages go back to the sender, channel
    /// broadcasts are answered on the channel
    pub async fn reply_to(&self, packet: &Packet, text: impl Into<String>) -> Result<Sent> {
        let destination = if packet.is_broadcast() {
            BROADCAST
        } else {
            packet.sender()
        };
        self.router.route(packet.sender(), destination, text).await
    }

    /// Send a prepared message on its own network
    pub async fn send_on(&self, message: OutboundMessage) -> Result<Sent> {
        self.router.send_on(message).await
    }

    /// Process one inbound packet
    pub fn ingest(&self, packet: &Packet) -> ProcessingOutcome {
        self.router.ingest(packet)
    }

    /// Network a reply to `sender` would use
    pub fn resolve_network(&self, sender: NodeId) -> NetworkSource {
        self.router.resolve_network(sender)
    }

    /// Where `sender` was last heard
    pub fn sender_entry(&self, sender: NodeId) -> Option<SenderEntry> {
        self.router.sender_entry(sender)
    }

    /// Whether `node` is one of our own radios
    pub fn is_own_node(&self, node: NodeId) -> bool {
        self.router.config.own_ids.contains(node)
    }

    /// Counters snapshot
    pub fn stats(&self) -> RouterStats {
        self.router.stats()
    }

    /// Dedup counters snapshot
    pub fn dedup_stats(&self) -> DedupStats {
        self.router.dedup_stats()
    }

    /// Drain the merged supervisor channel until shutdown
    ///
    /// Accepted packets are forwarded on `accepted`. The loop ends when
    /// `shutdown` flips to true or every supervisor has dropped its sender.
    pub async fn run(
        self,
        mut inbound: mpsc::Receiver<Packet>,
        accepted: mpsc::Sender<Packet>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("Router started");
        let mut command_layer_open = true;

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Router shutdown requested");
                        break;
                    }
                }

                packet = inbound.recv() => {
                    let Some(packet) = packet else {
                        debug!("All supervisors stopped");
                        break;
                    };

                    if self.ingest(&packet) != ProcessingOutcome::Accepted || !command_layer_open {
                        continue;
                    }
                    // Never wait on the command layer: it replies through the
                    // supervisors, which wait on this loop
                    match accepted.try_send(packet) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(packet)) => {
                            self.router.state.lock().stats.dispatch_dropped += 1;
                            warn!(
                                from = %packet.sender(),
                                network = %packet.network(),
                                "Command layer busy, accepted packet not dispatched"
                            );
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            warn!("Command layer closed its channel, accepted packets are no longer forwarded");
                            command_layer_open = false;
                        }
                    }
                }
            }
        }

        let stats = self.stats();
        info!(
            accepted = stats.total_accepted(),
            duplicates = stats.total_duplicates(),
            own_broadcasts = stats.own_broadcasts_seen,
            dispatch_dropped = stats.dispatch_dropped,
            "Router stopped"
        );
    }
}
