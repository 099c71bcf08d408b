//! Outbound seams of the router
//!
//! The router only needs two things from the rest of the bridge: a way to
//! send on a network ([`OutboundLink`]) and somewhere to record traffic
//! ([`TrafficSink`]). Both are traits so the routing rules can be tested
//! without radios or a database.

use async_trait::async_trait;
use dualmesh_core::{NetworkSource, OutboundMessage, Packet};
use dualmesh_link::{ConnectionState, SupervisorHandle};
use dualmesh_state::{StateError, TrafficWriter};
use tracing::debug;

/// A link the router can send replies through
#[async_trait]
pub trait OutboundLink: Send + Sync {
    /// Network this link serves
    fn network(&self) -> NetworkSource;

    /// Current connection state
    fn state(&self) -> ConnectionState;

    /// Send over the live connection, returning the radio packet id
    async fn send(&self, message: OutboundMessage) -> dualmesh_link::Result<u32>;
}

#[async_trait]
impl OutboundLink for SupervisorHandle {
    fn network(&self) -> NetworkSource {
        SupervisorHandle::network(self)
    }

    fn state(&self) -> ConnectionState {
        SupervisorHandle::state(self)
    }

    async fn send(&self, message: OutboundMessage) -> dualmesh_link::Result<u32> {
        SupervisorHandle::send(self, message).await
    }
}

/// Fire-and-forget traffic recorder
///
/// Implementations must not block; failures are theirs to log.
pub trait TrafficSink: Send + Sync {
    /// Record an accepted inbound packet
    fn record_inbound(&self, packet: &Packet);

    /// Record a message we sent
    fn record_outbound(&self, message: &OutboundMessage);
}

impl TrafficSink for TrafficWriter {
    fn record_inbound(&self, packet: &Packet) {
        // Queue-full drops are already logged by the writer
        if let Err(StateError::ChannelClosed) = self.submit(packet.clone()) {
            debug!("Traffic writer gone, packet not persisted");
        }
    }

    fn record_outbound(&self, message: &OutboundMessage) {
        if let Err(StateError::ChannelClosed) = self.submit_outbound(message.clone()) {
            debug!("Traffic writer gone, outbound message not persisted");
        }
    }
}

/// Sink that records nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl TrafficSink for NullSink {
    fn record_inbound(&self, _packet: &Packet) {}

    fn record_outbound(&self, _message: &OutboundMessage) {}
}
