//! Integration tests for the file-backed traffic store

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use dualmesh_core::{
    Neighbor, NeighborInfo, NetworkSource, NodeId, OutboundMessage, Packet, Payload, BROADCAST,
};
use dualmesh_state::{RetentionPolicy, StoreConfig, TrafficStore, TrafficWriter};
use std::time::Duration;

fn neighbors_at(sender: u32, heard: u32, at: chrono::DateTime<Utc>) -> Packet {
    Packet::new(
        NetworkSource::NetB,
        NodeId(sender),
        BROADCAST,
        sender,
        Payload::NeighborInfo(NeighborInfo {
            neighbors: vec![Neighbor {
                node_id: NodeId(heard),
                snr: Some(6.5),
            }],
        }),
    )
    .with_received_at(at)
}

fn text_at(sender: u32, at: chrono::DateTime<Utc>) -> Packet {
    Packet::new(
        NetworkSource::NetA,
        NodeId(sender),
        BROADCAST,
        sender,
        Payload::Text(format!("from {}", sender)),
    )
    .with_received_at(at)
}

// ============================================================================
// Retention
// ============================================================================

#[tokio::test]
async fn test_retention_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let store = TrafficStore::open(dir.path().join("traffic.db")).await.unwrap();

    let now = Utc.timestamp_millis_opt(1_760_000_000_000).unwrap();
    let cutoff = now - ChronoDuration::hours(48);

    store.save(&text_at(1, cutoff)).await.unwrap();
    store
        .save(&text_at(2, cutoff - ChronoDuration::milliseconds(1)))
        .await
        .unwrap();
    store.save(&text_at(3, now)).await.unwrap();

    let report = store
        .cleanup_at(now, &RetentionPolicy::uniform_hours(48))
        .await
        .unwrap();
    assert_eq!(report.packets, 1);
    assert_eq!(report.messages, 1);

    let remaining: Vec<NodeId> = store
        .recent_packets(10)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.sender)
        .collect();
    assert_eq!(remaining, vec![NodeId(3), NodeId(1)]);
}

// Each table gets its own horizon so one cutoff cannot mask another
fn staggered_policy() -> RetentionPolicy {
    RetentionPolicy {
        packets: Duration::from_secs(3600),
        messages: Duration::from_secs(3600),
        node_stats: Duration::from_secs(24 * 3600),
        neighbors: Duration::from_secs(72 * 3600),
    }
}

#[tokio::test]
async fn test_node_stats_retention_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let store = TrafficStore::open(dir.path().join("traffic.db")).await.unwrap();

    let now = Utc.timestamp_millis_opt(1_760_000_000_000).unwrap();
    let cutoff = now - ChronoDuration::hours(24);

    store.save(&text_at(1, cutoff)).await.unwrap();
    store
        .save(&text_at(2, cutoff - ChronoDuration::milliseconds(1)))
        .await
        .unwrap();
    store.save(&text_at(3, now)).await.unwrap();

    let report = store.cleanup_at(now, &staggered_policy()).await.unwrap();
    assert_eq!(report.node_stats, 1);

    assert!(store.node_stats(NodeId(1)).await.unwrap().is_some());
    assert!(store.node_stats(NodeId(2)).await.unwrap().is_none());
    assert!(store.node_stats(NodeId(3)).await.unwrap().is_some());
    assert_eq!(store.table_counts().await.unwrap().node_stats, 2);
}

#[tokio::test]
async fn test_neighbors_retention_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let store = TrafficStore::open(dir.path().join("traffic.db")).await.unwrap();

    let now = Utc.timestamp_millis_opt(1_760_000_000_000).unwrap();
    let cutoff = now - ChronoDuration::hours(72);

    store.save(&neighbors_at(1, 0xA1, cutoff)).await.unwrap();
    store
        .save(&neighbors_at(2, 0xA2, cutoff - ChronoDuration::milliseconds(1)))
        .await
        .unwrap();
    store.save(&neighbors_at(3, 0xA3, now)).await.unwrap();

    let report = store.cleanup_at(now, &staggered_policy()).await.unwrap();
    assert_eq!(report.neighbors, 1);

    let kept = store.neighbors_of(NodeId(1)).await.unwrap();
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].neighbor_id, NodeId(0xA1));
    assert!(store.neighbors_of(NodeId(2)).await.unwrap().is_empty());
    assert_eq!(store.neighbors_of(NodeId(3)).await.unwrap().len(), 1);
    assert_eq!(store.table_counts().await.unwrap().neighbors, 2);
}

#[tokio::test]
async fn test_retention_per_table() {
    let dir = tempfile::tempdir().unwrap();
    let store = TrafficStore::open(dir.path().join("traffic.db")).await.unwrap();
    let now = Utc::now();

    store
        .save(&text_at(7, now - ChronoDuration::days(3)))
        .await
        .unwrap();

    // Packets expire after 48h, messages and node stats live longer
    let report = store
        .cleanup_at(now, &RetentionPolicy::default())
        .await
        .unwrap();
    assert_eq!(report.packets, 1);
    assert_eq!(report.messages, 0);
    assert_eq!(report.node_stats, 0);

    let counts = store.table_counts().await.unwrap();
    assert_eq!(counts.packets, 0);
    assert_eq!(counts.messages, 1);
    assert_eq!(counts.node_stats, 1);
}

#[tokio::test]
async fn test_cleanup_on_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = TrafficStore::open(dir.path().join("traffic.db")).await.unwrap();
    let report = store.cleanup(&RetentionPolicy::default()).await.unwrap();
    assert_eq!(report.total(), 0);
}

// ============================================================================
// Durability
// ============================================================================

#[tokio::test]
async fn test_reopen_keeps_history() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("traffic.db");

    {
        let store = TrafficStore::open(&path).await.unwrap();
        store.save(&text_at(0xAA, Utc::now())).await.unwrap();
        store
            .save_outbound(
                &OutboundMessage::text(NetworkSource::NetB, NodeId(1), NodeId(0xAA), "pong"),
                Utc::now(),
            )
            .await
            .unwrap();
        store.close().await;
    }

    let store = TrafficStore::open(&path).await.unwrap();
    let counts = store.table_counts().await.unwrap();
    assert_eq!(counts.packets, 1);
    assert_eq!(counts.messages, 2);
    let stats = store.node_stats(NodeId(0xAA)).await.unwrap().unwrap();
    assert_eq!(stats.packet_count, 1);
    store.integrity_check().await.unwrap();
}

#[tokio::test]
async fn test_garbage_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("traffic.db");
    std::fs::write(&path, vec![0x5Au8; 8192]).unwrap();

    let err = TrafficStore::open(&path).await.unwrap_err();
    assert!(err.is_storage_failure());
}

#[tokio::test]
async fn test_open_with_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        path: dir.path().join("traffic.db"),
        max_connections: 2,
        ..StoreConfig::default()
    };
    let store = TrafficStore::open_with(&config).await.unwrap();
    assert_eq!(store.path(), Some(config.path.as_path()));
}

// ============================================================================
// Writer
// ============================================================================

#[tokio::test]
async fn test_writer_against_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = TrafficStore::open(dir.path().join("traffic.db")).await.unwrap();
    let (writer, task) = TrafficWriter::spawn(store.clone(), 64);

    for sender in 0..20 {
        writer.submit(text_at(sender, Utc::now())).unwrap();
    }
    writer.flush().await.unwrap();
    assert_eq!(store.table_counts().await.unwrap().packets, 20);

    let since = Utc::now() - ChronoDuration::minutes(5);
    let top = store.top_senders(since, 5).await.unwrap();
    assert_eq!(top.len(), 5);

    drop(writer);
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
}
