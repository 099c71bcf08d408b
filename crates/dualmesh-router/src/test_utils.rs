//! Test doubles for the router seams

use async_trait::async_trait;
use dualmesh_core::{NetworkSource, OutboundMessage, Packet};
use dualmesh_link::{ConnectionState, LinkError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::link::{OutboundLink, TrafficSink};

#[derive(Debug)]
struct MockLinkState {
    state: ConnectionState,
    sent: Vec<OutboundMessage>,
    fail_sends: bool,
}

/// Scriptable [`OutboundLink`]
///
/// Clones share state, so a test can keep one clone and hand another to
/// the router.
#[derive(Debug, Clone)]
pub struct MockLink {
    network: NetworkSource,
    inner: Arc<Mutex<MockLinkState>>,
    next_id: Arc<AtomicU32>,
}

impl MockLink {
    /// A connected link on `network`
    pub fn connected(network: NetworkSource) -> Self {
        Self::with_state(network, ConnectionState::Connected)
    }

    /// A link in an explicit state
    pub fn with_state(network: NetworkSource, state: ConnectionState) -> Self {
        Self {
            network,
            inner: Arc::new(Mutex::new(MockLinkState {
                state,
                sent: Vec::new(),
                fail_sends: false,
            })),
            next_id: Arc::new(AtomicU32::new(1)),
        }
    }

    /// Change the reported state
    pub fn set_state(&self, state: ConnectionState) {
        self.inner.lock().state = state;
    }

    /// Make sends fail with a write error
    pub fn set_fail_sends(&self, fail: bool) {
        self.inner.lock().fail_sends = fail;
    }

    /// Messages sent so far
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.inner.lock().sent.clone()
    }
}

#[async_trait]
impl OutboundLink for MockLink {
    fn network(&self) -> NetworkSource {
        self.network
    }

    fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    async fn send(&self, message: OutboundMessage) -> dualmesh_link::Result<u32> {
        let mut inner = self.inner.lock();
        if inner.state != ConnectionState::Connected {
            return Err(LinkError::Disconnected);
        }
        if inner.fail_sends {
            return Err(LinkError::WriteError("mock write failure".into()));
        }
        inner.sent.push(message);
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

/// [`TrafficSink`] that keeps everything in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    inbound: Arc<Mutex<Vec<Packet>>>,
    outbound: Arc<Mutex<Vec<OutboundMessage>>>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Inbound packets recorded
    pub fn inbound(&self) -> Vec<Packet> {
        self.inbound.lock().clone()
    }

    /// Outbound messages recorded
    pub fn outbound(&self) -> Vec<OutboundMessage> {
        self.outbound.lock().clone()
    }
}

impl TrafficSink for MemorySink {
    fn record_inbound(&self, packet: &Packet) {
        self.inbound.lock().push(packet.clone());
    }

    fn record_outbound(&self, message: &OutboundMessage) {
        self.outbound.lock().push(message.clone());
    }
}
