//! Minimal command layer: answers pings
//!
//! Consumes the router's accepted-packet stream and replies through
//! [`RouterHandle::reply_to`], so the answer goes out on whichever network
//! the sender was last heard on.

use dualmesh_core::Packet;
use dualmesh_router::RouterHandle;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::ResponderConfig;

/// Reply text for `packet`, if it is a ping
pub fn reply_for(config: &ResponderConfig, packet: &Packet) -> Option<String> {
    let text = packet.text()?.trim();
    if !text.eq_ignore_ascii_case(&config.keyword) {
        return None;
    }

    let mut reply = config.reply.clone();
    if let Some(hops) = packet.signal().and_then(|s| s.hop_count) {
        reply.push_str(&format!(" ({} hops)", hops));
    }
    Some(reply)
}

/// Answer pings until shutdown or the router stops
pub async fn run_responder(
    router: RouterHandle,
    mut accepted: mpsc::Receiver<Packet>,
    config: ResponderConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(keyword = %config.keyword, enabled = config.enabled, "Responder started");
    let mut answered = 0u64;

    loop {
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }

            packet = accepted.recv() => {
                let Some(packet) = packet else { break };
                debug!(
                    sender = %packet.sender(),
                    network = %packet.network(),
                    kind = %packet.kind(),
                    "Accepted packet"
                );

                if !config.enabled || router.is_own_node(packet.sender()) {
                    continue;
                }
                let Some(reply) = reply_for(&config, &packet) else { continue };

                match router.reply_to(&packet, reply).await {
                    Ok(sent) => {
                        answered += 1;
                        info!(
                            to = %sent.destination,
                            network = %sent.network,
                            packet_id = sent.packet_id,
                            "Answered ping"
                        );
                    }
                    Err(e) => warn!(
                        sender = %packet.sender(),
                        code = e.error_code(),
                        "Ping reply failed: {}", e
                    ),
                }
            }
        }
    }

    info!(answered, "Responder stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use dualmesh_core::{NetworkSource, NodeId, Payload, SignalMetrics, BROADCAST};
    use dualmesh_router::{DualNetworkRouter, MockLink, NullSink, OwnNodeIds, RouterConfig};
    use std::sync::Arc;
    use std::time::Duration;

    fn text(network: NetworkSource, sender: u32, destination: NodeId, body: &str) -> Packet {
        Packet::new(network, NodeId(sender), destination, 1, Payload::Text(body.into()))
    }

    #[test]
    fn test_reply_for() {
        let config = ResponderConfig::default();
        let ping = text(NetworkSource::NetA, 0xAA, BROADCAST, "  PING ");
        assert_eq!(reply_for(&config, &ping).as_deref(), Some("pong"));

        let chatter = text(NetworkSource::NetA, 0xAA, BROADCAST, "ping me later");
        assert!(reply_for(&config, &chatter).is_none());

        let relayed = ping.with_signal(SignalMetrics {
            snr: Some(6.5),
            rssi: Some(-90),
            hop_count: Some(2),
        });
        assert_eq!(reply_for(&config, &relayed).as_deref(), Some("pong (2 hops)"));
    }

    #[test]
    fn test_reply_ignores_non_text() {
        let config = ResponderConfig::default();
        let packet = Packet::new(
            NetworkSource::NetB,
            NodeId(1),
            BROADCAST,
            9,
            Payload::Unknown { port: 70, data: b"ping".to_vec() },
        );
        assert!(reply_for(&config, &packet).is_none());
    }

    #[tokio::test]
    async fn test_replies_on_sender_network() {
        let link_a = MockLink::connected(NetworkSource::NetA);
        let link_b = MockLink::connected(NetworkSource::NetB);
        let router = DualNetworkRouter::new(
            RouterConfig {
                own_ids: OwnNodeIds {
                    net_a: Some(NodeId(0x10)),
                    net_b: Some(NodeId(0x20)),
                },
                ..Default::default()
            },
            Arc::new(NullSink),
        )
        .with_link(Arc::new(link_a.clone()))
        .with_link(Arc::new(link_b.clone()))
        .into_handle();

        let (accepted_tx, accepted_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_responder(
            router.clone(),
            accepted_rx,
            ResponderConfig::default(),
            shutdown_rx,
        ));

        let ping = text(NetworkSource::NetB, 0xAA, NodeId(0x20), "ping");
        router.ingest(&ping);
        accepted_tx.send(ping).await.unwrap();

        // Our own radio saying ping is ignored
        let own = text(NetworkSource::NetA, 0x10, BROADCAST, "ping");
        accepted_tx.send(own).await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while link_b.sent().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let sent = link_b.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].destination, NodeId(0xAA));
        assert_eq!(sent[0].from, NodeId(0x20));
        assert_eq!(sent[0].text, "pong");
        assert!(link_a.sent().is_empty());

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stops_when_shutdown_sender_dropped() {
        let router = DualNetworkRouter::new(RouterConfig::default(), Arc::new(NullSink))
            .into_handle();
        let (_accepted_tx, accepted_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_responder(
            router,
            accepted_rx,
            ResponderConfig::default(),
            shutdown_rx,
        ));

        drop(shutdown_tx);
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("responder kept running without a shutdown sender")
            .unwrap();
    }
}
