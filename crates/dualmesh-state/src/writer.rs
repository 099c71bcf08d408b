//! Single-writer persistence queue
//!
//! Routing never waits on the database. Accepted packets and outbound
//! messages are handed to [`TrafficWriter`], which drops them with a warning
//! when its bounded queue is full. One background task owns all writes and
//! logs failures instead of propagating them.

use chrono::{DateTime, Utc};
use dualmesh_core::{OutboundMessage, Packet};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Result, StateError};
use crate::store::TrafficStore;

enum WriteOp {
    Packet(Box<Packet>),
    Outbound(OutboundMessage, DateTime<Utc>),
    Flush(oneshot::Sender<()>),
}

/// Writer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Rows committed
    pub written: u64,
    /// Items discarded because the queue was full
    pub dropped: u64,
    /// Items the store rejected
    pub failed: u64,
}

/// Cloneable front end of the writer task
#[derive(Debug, Clone)]
pub struct TrafficWriter {
    tx: mpsc::Sender<WriteOp>,
    stats: Arc<Mutex<WriterStats>>,
}

impl TrafficWriter {
    /// Start the writer task over `store`
    pub fn spawn(store: TrafficStore, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let stats = Arc::new(Mutex::new(WriterStats::default()));
        let task = tokio::spawn(run_writer(store, rx, stats.clone()));
        (Self { tx, stats }, task)
    }

    /// Queue an accepted packet
    ///
    /// Never blocks. A full queue drops the packet.
    pub fn submit(&self, packet: Packet) -> Result<()> {
        self.enqueue(WriteOp::Packet(Box::new(packet)))
    }

    /// Queue a message this node sent
    pub fn submit_outbound(&self, message: OutboundMessage) -> Result<()> {
        self.enqueue(WriteOp::Outbound(message, Utc::now()))
    }

    fn enqueue(&self, op: WriteOp) -> Result<()> {
        match self.tx.try_send(op) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = {
                    let mut stats = self.stats.lock();
                    stats.dropped += 1;
                    stats.dropped
                };
                warn!(dropped, "Persistence queue full, dropping record");
                Err(StateError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(StateError::ChannelClosed),
        }
    }

    /// Wait until everything queued so far has been written
    pub async fn flush(&self) -> Result<()> {
        let (reply, done) = oneshot::channel();
        self.tx.send(WriteOp::Flush(reply)).await?;
        done.await.map_err(|_| StateError::ChannelClosed)
    }

    /// Current counters
    pub fn stats(&self) -> WriterStats {
        *self.stats.lock()
    }
}

async fn run_writer(
    store: TrafficStore,
    mut rx: mpsc::Receiver<WriteOp>,
    stats: Arc<Mutex<WriterStats>>,
) {
    debug!("Traffic writer started");

    while let Some(op) = rx.recv().await {
        let outcome = match op {
            WriteOp::Packet(packet) => store.save(&packet).await,
            WriteOp::Outbound(message, at) => store.save_outbound(&message, at).await,
            WriteOp::Flush(reply) => {
                let _ = reply.send(());
                continue;
            }
        };

        let mut stats = stats.lock();
        match outcome {
            Ok(()) => stats.written += 1,
            Err(e) => {
                stats.failed += 1;
                warn!(code = e.error_code(), "Failed to persist record: {}", e);
            }
        }
    }

    info!("Traffic writer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use dualmesh_core::{NetworkSource, NodeId, Payload, BROADCAST};

    fn text(sender: u32) -> Packet {
        Packet::new(
            NetworkSource::NetA,
            NodeId(sender),
            BROADCAST,
            sender,
            Payload::Text("hi".into()),
        )
    }

    #[tokio::test]
    async fn test_submit_and_flush() {
        let store = TrafficStore::in_memory().await.unwrap();
        let (writer, _task) = TrafficWriter::spawn(store.clone(), 16);

        writer.submit(text(1)).unwrap();
        writer.submit(text(2)).unwrap();
        writer
            .submit_outbound(OutboundMessage::text(
                NetworkSource::NetA,
                NodeId(9),
                NodeId(1),
                "pong",
            ))
            .unwrap();
        writer.flush().await.unwrap();

        assert_eq!(writer.stats().written, 3);
        let counts = store.table_counts().await.unwrap();
        assert_eq!(counts.packets, 2);
        assert_eq!(counts.messages, 3);
    }

    #[tokio::test]
    async fn test_full_queue_drops() {
        // No task draining the queue
        let (tx, _rx) = mpsc::channel(1);
        let writer = TrafficWriter {
            tx,
            stats: Arc::new(Mutex::new(WriterStats::default())),
        };

        writer.submit(text(1)).unwrap();
        assert!(matches!(writer.submit(text(2)), Err(StateError::QueueFull)));
        assert_eq!(writer.stats().dropped, 1);
    }

    #[tokio::test]
    async fn test_closed_writer() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let writer = TrafficWriter {
            tx,
            stats: Arc::new(Mutex::new(WriterStats::default())),
        };
        assert!(matches!(
            writer.submit(text(1)),
            Err(StateError::ChannelClosed)
        ));
        assert!(writer.flush().await.is_err());
    }
}
