//! Dualmesh Router - Attribution, deduplication and reply routing
//!
//! The router sits between the two link supervisors and the command layer:
//!
//! - **[`DedupEngine`]**: Suppresses repeats of the same logical packet,
//!   including our own broadcasts echoing back
//! - **[`SenderNetworkMap`]**: Remembers which network each sender was last
//!   heard on
//! - **[`DualNetworkRouter`]**: Ingests packets from both networks and routes
//!   replies back to the right one
//!
//! # Example
//!
//! ```rust,ignore
//! use dualmesh_router::{DualNetworkRouter, RouterConfig};
//! use std::sync::Arc;
//!
//! let router = DualNetworkRouter::new(RouterConfig::default(), Arc::new(writer))
//!     .with_link(Arc::new(net_a_handle))
//!     .with_link(Arc::new(net_b_handle))
//!     .into_handle();
//!
//! tokio::spawn(router.clone().run(inbound_rx, accepted_tx, shutdown_rx));
//!
//! while let Some(packet) = accepted_rx.recv().await {
//!     if packet.text() == Some("ping") {
//!         router.reply_to(&packet, "pong").await?;
//!     }
//! }
//! ```

pub mod config;
pub mod dedup;
pub mod error;
pub mod link;
pub mod router;
pub mod sender_map;
pub mod test_utils;

pub use config::{OwnNodeIds, RouterConfig};
pub use dedup::{DedupEngine, DedupStats, Fingerprint, PAYLOAD_PREFIX_LEN};
pub use error::{Result, RoutingError};
pub use link::{NullSink, OutboundLink, TrafficSink};
pub use router::{
    DualNetworkRouter, NetworkCounters, ProcessingOutcome, RouterHandle, RouterStats, Sent,
};
pub use sender_map::{SenderEntry, SenderNetworkMap};
pub use test_utils::{MemorySink, MockLink};
