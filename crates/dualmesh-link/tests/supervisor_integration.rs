//! Integration tests for the link supervisor
//!
//! These tests run the full supervisor task against scripted transports:
//! - Packet emission and shutdown
//! - Recovery from transport errors
//! - Startup out-of-band reboot
//! - Outbound sends through the handle
//! - The one-connection-per-peer constraint over real sockets

use async_trait::async_trait;
use dualmesh_core::{NetworkSource, NodeId, OutboundMessage, Payload, BROADCAST};
use dualmesh_link::{
    CompactCodec, ConnectionState, ConnectionSupervisor, FramingPreset, LinkConfig,
    LinkConfigBuilder, LinkError, MockTransport, MockTransportControl, PeerLeases, PeerRebooter,
    SupervisorHandle, TcpTransport, Transport,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

// ============================================================================
// Helpers
// ============================================================================

fn fast_config() -> LinkConfig {
    LinkConfigBuilder::new()
        .retries(2, Duration::from_millis(50))
        .connect_timeout(Duration::from_secs(1))
        .reconnect_cooldown(Duration::from_secs(2))
        .startup_connect_cycles(2)
        .build()
}

fn text_frame(from: u32, text: &str) -> bytes::Bytes {
    CompactCodec::encode_envelope(NodeId(from), BROADCAST, 7, 0, &Payload::Text(text.into()))
}

struct Running {
    handle: SupervisorHandle,
    control: MockTransportControl,
    packets: mpsc::Receiver<dualmesh_core::Packet>,
    shutdown: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

fn spawn_supervisor(
    config: LinkConfig,
    setup: impl FnOnce(&MockTransportControl),
) -> Running {
    let (transport, control) = MockTransport::new("mock:net_b");
    setup(&control);
    let (packet_tx, packets) = mpsc::channel(32);
    let (supervisor, handle) = ConnectionSupervisor::new(
        NetworkSource::NetB,
        transport,
        Arc::new(CompactCodec::new()),
        config,
        packet_tx,
    );
    let (shutdown, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(supervisor.run(shutdown_rx));
    Running {
        handle,
        control,
        packets,
        shutdown,
        task,
    }
}

async fn wait_for_state(handle: &SupervisorHandle, state: ConnectionState) {
    let mut rx = handle.subscribe_state();
    tokio::time::timeout(Duration::from_secs(120), rx.wait_for(|s| *s == state))
        .await
        .expect("state not reached")
        .expect("supervisor dropped");
}

// ============================================================================
// Supervisor lifecycle
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_emits_packets_and_shuts_down() {
    let mut running = spawn_supervisor(fast_config(), |_| {});
    wait_for_state(&running.handle, ConnectionState::Connected).await;

    running.control.push_frame(text_frame(0xAA, "ping"));
    let packet = tokio::time::timeout(Duration::from_secs(5), running.packets.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(packet.sender(), NodeId(0xAA));
    assert_eq!(packet.network(), NetworkSource::NetB);
    assert_eq!(packet.text(), Some("ping"));

    running.shutdown.send_replace(true);
    running.task.await.unwrap();
    assert_eq!(running.handle.state(), ConnectionState::Disconnected);
    assert!(!running.control.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_reconnects_after_transport_error() {
    let running = spawn_supervisor(fast_config(), |_| {});
    wait_for_state(&running.handle, ConnectionState::Connected).await;
    assert_eq!(running.control.connect_count(), 1);

    running.control.inject_error();
    tokio::time::timeout(Duration::from_secs(60), async {
        while running.handle.stats().connects < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("link did not reconnect");
    assert_eq!(running.handle.state(), ConnectionState::Connected);

    let stats = running.handle.stats();
    assert_eq!(stats.transport_errors, 1);
    assert_eq!(stats.connects, 2);
}

#[tokio::test(start_paused = true)]
async fn test_keeps_retrying_after_cooldown() {
    let running = spawn_supervisor(fast_config(), |c| c.set_fail_connect(true));

    // Two startup cycles of two attempts each, then steady-state cycles
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(running.control.connect_count() > 4);
    assert_eq!(running.handle.state(), ConnectionState::Disconnected);

    running.control.set_fail_connect(false);
    wait_for_state(&running.handle, ConnectionState::Connected).await;
    assert_eq!(running.handle.stats().remote_reboots, 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_while_offline() {
    let running = spawn_supervisor(fast_config(), |c| c.set_fail_connect(true));
    tokio::time::sleep(Duration::from_secs(10)).await;

    running.handle.shutdown().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), running.task)
        .await
        .unwrap()
        .unwrap();
}

// ============================================================================
// Startup reboot
// ============================================================================

struct UnwedgingRebooter {
    calls: AtomicUsize,
    control: MockTransportControl,
}

#[async_trait]
impl PeerRebooter for UnwedgingRebooter {
    async fn reboot_peer(&self, network: NetworkSource) -> dualmesh_link::Result<()> {
        assert_eq!(network, NetworkSource::NetB);
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.control.set_fail_connect(false);
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_startup_reboot_then_connect() {
    let (transport, control) = MockTransport::new("mock:net_b");
    control.set_fail_connect(true);
    let rebooter = Arc::new(UnwedgingRebooter {
        calls: AtomicUsize::new(0),
        control: control.clone(),
    });

    let (packet_tx, _packets) = mpsc::channel(8);
    let (supervisor, handle) = ConnectionSupervisor::new(
        NetworkSource::NetB,
        transport,
        Arc::new(CompactCodec::new()),
        fast_config(),
        packet_tx,
    );
    let supervisor = supervisor.with_rebooter(rebooter.clone(), Duration::from_secs(5));
    let (_shutdown, shutdown_rx) = watch::channel(false);
    tokio::spawn(supervisor.run(shutdown_rx));

    wait_for_state(&handle, ConnectionState::Connected).await;
    assert_eq!(rebooter.calls.load(Ordering::SeqCst), 1);
    assert_eq!(handle.stats().remote_reboots, 1);
    // 2 cycles x 2 attempts, then one attempt after the reboot
    assert_eq!(control.connect_count(), 5);
}

// ============================================================================
// Outbound
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_send_through_handle() {
    let running = spawn_supervisor(fast_config(), |_| {});
    wait_for_state(&running.handle, ConnectionState::Connected).await;

    let message = OutboundMessage::text(NetworkSource::NetB, NodeId(1), NodeId(0xAA), "pong");
    running.handle.send(message.clone()).await.unwrap();
    assert_eq!(running.control.sent_frames().len(), 1);

    running.shutdown.send_replace(true);
    running.task.await.unwrap();
    assert!(matches!(
        running.handle.send(message).await,
        Err(LinkError::SupervisorStopped)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_send_while_disconnected_fails() {
    let running = spawn_supervisor(fast_config(), |c| c.set_fail_connect(true));
    tokio::time::sleep(Duration::from_secs(1)).await;

    let message = OutboundMessage::text(NetworkSource::NetB, NodeId(1), NodeId(0xAA), "pong");
    assert!(matches!(
        running.handle.send(message).await,
        Err(LinkError::Disconnected)
    ));
}

// ============================================================================
// Single connection per peer
// ============================================================================

#[tokio::test]
async fn test_second_link_to_same_peer_never_steals_connection() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();
    tokio::spawn(async move {
        let mut sockets = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            sockets.push(socket);
        }
    });

    let leases = PeerLeases::new();
    let mut first = TcpTransport::new(address.to_string(), FramingPreset::ProtocolA, leases.clone());
    first.connect().await.unwrap();

    // A diagnostic tool building its own transport is refused
    let mut second = TcpTransport::new(address.to_string(), FramingPreset::ProtocolA, leases.clone());
    assert!(matches!(
        second.connect().await,
        Err(LinkError::PeerBusy { .. })
    ));

    // Reconnecting the live transport is a no-op
    first.connect().await.unwrap();
    assert!(first.is_connected());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
}
