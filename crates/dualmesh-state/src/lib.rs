//! Dualmesh State - Traffic persistence
//!
//! Durable history of everything the bridge accepts or sends, kept in a
//! single SQLite file:
//!
//! - **store**: [`TrafficStore`], schema, upserts, retention and queries (sqlx)
//! - **writer**: [`TrafficWriter`], the bounded single-writer queue the router feeds
//! - **cleanup**: Periodic retention pass
//! - **records**: Row types returned by queries
//!
//! ## Example
//!
//! ```ignore
//! use dualmesh_state::{StoreConfig, TrafficStore, TrafficWriter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StoreConfig::default();
//!     let store = TrafficStore::open_with(&config).await?;
//!     let (writer, _task) = TrafficWriter::spawn(store.clone(), config.write_queue);
//!
//!     // writer.submit(packet)?;
//!     let report = store.cleanup(&config.retention).await?;
//!     println!("removed {} rows", report.total());
//!     Ok(())
//! }
//! ```

pub mod cleanup;
pub mod config;
pub mod error;
pub mod records;
pub mod store;
pub mod writer;

pub use cleanup::run_cleanup_loop;
pub use config::{RetentionPolicy, StoreConfig};
pub use error::{Result, StateError};
pub use records::{
    CleanupReport, MessageDirection, MessageRecord, NeighborRecord, NetworkTraffic,
    NodeStatsRecord, PacketRecord, SenderActivity, TableCounts,
};
pub use store::TrafficStore;
pub use writer::{TrafficWriter, WriterStats};
