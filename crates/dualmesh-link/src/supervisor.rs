//! Connection supervisor - keeps one radio link alive
//!
//! One [`ConnectionSupervisor`] runs per physical network. It owns the
//! transport, turns frames into [`Packet`]s and emits them while the link
//! is `Connected`, and serializes outbound writes from its command queue.
//!
//! # State machine
//!
//! ```text
//!                 connect ok
//!  Disconnected ─────────────► Connected ──── probe failures ───► Degraded
//!       ▲  │                     │  ▲                                │
//!       │  └── Connecting ◄──────┘  └──────── reconnect ok ──────────┤
//!       │        (retries,      transport error / silence            │
//!       │         timeout)                                           │
//!       └──────────── cooldown ◄───────── connect failed ◄───────────┘
//! ```
//!
//! `Disconnected` is terminal only after shutdown. Every connect attempt is
//! bounded by `connect_timeout` and every wait in the loop also watches the
//! shutdown signal.

use dualmesh_core::{NetworkSource, OutboundMessage, Packet};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::config::LinkConfig;
use crate::decoder::PacketDecoder;
use crate::error::{LinkError, Result};
use crate::reboot::PeerRebooter;
use crate::transport::{ConnectionState, Transport};

/// Counters kept by a supervisor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupervisorStats {
    /// Frames read from the transport
    pub frames_received: u64,
    /// Packets handed to the router
    pub packets_emitted: u64,
    /// Frames the decoder rejected
    pub decode_errors: u64,
    /// Read/write failures that dropped the connection
    pub transport_errors: u64,
    /// Successful connects
    pub connects: u64,
    /// Connect cycles that exhausted their retries
    pub connect_failures: u64,
    /// Reconnects caused by the silence timer
    pub silence_resets: u64,
    /// Transitions into `Degraded`
    pub degraded_entries: u64,
    /// Out-of-band reboots issued at startup
    pub remote_reboots: u64,
    /// Outbound messages written
    pub packets_sent: u64,
    /// Outbound messages that failed
    pub send_failures: u64,
}

#[derive(Debug, Default)]
struct Shared {
    stats: SupervisorStats,
    escalated: bool,
}

/// Commands accepted by a running supervisor
#[derive(Debug)]
pub enum SupervisorCommand {
    /// Send a message on this link
    Send {
        /// Message to send
        message: OutboundMessage,
        /// Receives the packet id on success
        reply: oneshot::Sender<Result<u32>>,
    },
    /// Drop the connection and connect again
    Reconnect,
    /// Stop the supervisor
    Shutdown,
}

/// Handle for controlling a running [`ConnectionSupervisor`]
#[derive(Clone)]
pub struct SupervisorHandle {
    network: NetworkSource,
    command_tx: mpsc::Sender<SupervisorCommand>,
    state_rx: watch::Receiver<ConnectionState>,
    shared: Arc<Mutex<Shared>>,
}

impl SupervisorHandle {
    /// Network served by this link
    pub fn network(&self) -> NetworkSource {
        self.network
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Whether the link is `Connected`
    pub fn is_alive(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Watch state transitions (also used as the sibling signal)
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Send a message over the live connection
    ///
    /// Returns the packet id assigned to the frame.
    pub async fn send(&self, message: OutboundMessage) -> Result<u32> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(SupervisorCommand::Send { message, reply })
            .await
            .map_err(|_| LinkError::SupervisorStopped)?;
        rx.await.map_err(|_| LinkError::SupervisorStopped)?
    }

    /// Snapshot of the supervisor counters
    pub fn stats(&self) -> SupervisorStats {
        self.shared.lock().stats.clone()
    }

    /// Whether reconnect cycles have failed often enough to escalate
    pub fn is_escalated(&self) -> bool {
        self.shared.lock().escalated
    }

    /// Ask the supervisor to drop and re-establish the connection
    pub async fn reconnect(&self) -> Result<()> {
        self.command_tx
            .send(SupervisorCommand::Reconnect)
            .await
            .map_err(|_| LinkError::SupervisorStopped)
    }

    /// Stop the supervisor
    pub async fn shutdown(&self) -> Result<()> {
        self.command_tx
            .send(SupervisorCommand::Shutdown)
            .await
            .map_err(|_| LinkError::SupervisorStopped)
    }
}

impl std::fmt::Debug for SupervisorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisorHandle")
            .field("network", &self.network)
            .field("state", &self.state())
            .finish()
    }
}

/// Owns the lifecycle of one transport connection
pub struct ConnectionSupervisor<T: Transport> {
    network: NetworkSource,
    transport: T,
    decoder: Arc<dyn PacketDecoder>,
    config: LinkConfig,
    packet_tx: mpsc::Sender<Packet>,
    command_rx: mpsc::Receiver<SupervisorCommand>,
    state_tx: watch::Sender<ConnectionState>,
    sibling: Option<watch::Receiver<ConnectionState>>,
    rebooter: Option<(Arc<dyn PeerRebooter>, Duration)>,
    shared: Arc<Mutex<Shared>>,
    last_frame_at: Instant,
    probe_failures: u32,
    failed_cycles: u32,
    next_attempt_at: Instant,
}

impl<T: Transport> ConnectionSupervisor<T> {
    /// Create a supervisor and its handle
    ///
    /// Packets are emitted on `packet_tx` tagged with `network`.
    pub fn new(
        network: NetworkSource,
        transport: T,
        decoder: Arc<dyn PacketDecoder>,
        config: LinkConfig,
        packet_tx: mpsc::Sender<Packet>,
    ) -> (Self, SupervisorHandle) {
        let (command_tx, command_rx) = mpsc::channel(64);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let shared = Arc::new(Mutex::new(Shared::default()));

        let handle = SupervisorHandle {
            network,
            command_tx,
            state_rx,
            shared: Arc::clone(&shared),
        };

        let now = Instant::now();
        let supervisor = Self {
            network,
            transport,
            decoder,
            config,
            packet_tx,
            command_rx,
            state_tx,
            sibling: None,
            rebooter: None,
            shared,
            last_frame_at: now,
            probe_failures: 0,
            failed_cycles: 0,
            next_attempt_at: now,
        };

        (supervisor, handle)
    }

    /// Use the other network's state as evidence for the silence timer
    pub fn with_sibling(mut self, sibling: watch::Receiver<ConnectionState>) -> Self {
        self.sibling = Some(sibling);
        self
    }

    /// Enable the startup out-of-band reboot, waiting `settle` afterwards
    pub fn with_rebooter(mut self, rebooter: Arc<dyn PeerRebooter>, settle: Duration) -> Self {
        self.rebooter = Some((rebooter, settle));
        self
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Whether the link is `Connected`
    pub fn is_alive(&self) -> bool {
        self.state() == ConnectionState::Connected && self.transport.is_connected()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(network = %self.network, from = %previous, to = %state, "Link state changed");
        }
    }

    /// Open the transport
    ///
    /// Runs up to `connect_retries` attempts, each bounded by
    /// `connect_timeout`. A no-op when already connected.
    pub async fn connect(&mut self) -> Result<()> {
        if self.is_alive() {
            return Ok(());
        }

        self.set_state(ConnectionState::Connecting);
        let attempts = self.config.connect_retries.max(1);
        let mut last_error = LinkError::Disconnected;

        for attempt in 1..=attempts {
            info!(
                network = %self.network,
                transport = self.transport.name(),
                attempt,
                "Connecting"
            );
            let result =
                tokio::time::timeout(self.config.connect_timeout, self.transport.connect()).await;
            match result {
                Ok(Ok(())) => {
                    self.on_connected();
                    return Ok(());
                }
                Ok(Err(e)) => {
                    warn!(network = %self.network, attempt, error = %e, code = e.error_code(), "Connect attempt failed");
                    let retriable = e.is_retriable();
                    last_error = e;
                    if !retriable {
                        break;
                    }
                }
                Err(_) => {
                    warn!(network = %self.network, attempt, "Connect attempt timed out");
                    last_error = LinkError::ConnectionTimeout {
                        duration_ms: self.config.connect_timeout.as_millis() as u64,
                    };
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.config.retry_backoff * attempt).await;
            }
        }

        self.on_connect_failed();
        Err(last_error)
    }

    /// Close the transport
    pub async fn disconnect(&mut self) -> Result<()> {
        let result = self.transport.disconnect().await;
        self.set_state(ConnectionState::Disconnected);
        result
    }

    fn on_connected(&mut self) {
        let now = Instant::now();
        self.last_frame_at = now;
        self.probe_failures = 0;
        self.failed_cycles = 0;
        {
            let mut shared = self.shared.lock();
            shared.stats.connects += 1;
            if shared.escalated {
                info!(network = %self.network, "Link recovered, escalation cleared");
            }
            shared.escalated = false;
        }
        self.set_state(ConnectionState::Connected);
        info!(network = %self.network, transport = self.transport.name(), "Link connected");
    }

    fn on_connect_failed(&mut self) {
        self.failed_cycles += 1;
        self.next_attempt_at = Instant::now() + self.config.reconnect_cooldown;
        self.set_state(ConnectionState::Disconnected);

        let mut shared = self.shared.lock();
        shared.stats.connect_failures += 1;
        if self.failed_cycles >= self.config.escalate_after_cycles && !shared.escalated {
            shared.escalated = true;
            error!(
                network = %self.network,
                cycles = self.failed_cycles,
                "Link cannot be re-established, escalating"
            );
        } else {
            warn!(
                network = %self.network,
                cycles = self.failed_cycles,
                retry_in = ?self.config.reconnect_cooldown,
                "Connect cycle failed"
            );
        }
    }

    async fn teardown(&mut self, state: ConnectionState, retry_after: Duration) {
        if let Err(e) = self.transport.disconnect().await {
            debug!(network = %self.network, error = %e, "Disconnect failed");
        }
        self.probe_failures = 0;
        self.set_state(state);
        self.next_attempt_at = Instant::now() + retry_after;
    }

    /// Connect cycles tried before the steady-state loop
    async fn startup(&mut self) {
        let cycles = self.config.startup_connect_cycles.max(1);
        for cycle in 1..=cycles {
            if self.connect().await.is_ok() {
                return;
            }
            if cycle < cycles {
                tokio::time::sleep_until(self.next_attempt_at).await;
            }
        }

        let Some((rebooter, settle)) = self.rebooter.clone() else {
            return;
        };

        warn!(network = %self.network, cycles, "Radio unreachable at startup, rebooting it");
        self.shared.lock().stats.remote_reboots += 1;
        if let Err(e) = rebooter.reboot_peer(self.network).await {
            error!(network = %self.network, error = %e, "Remote reboot failed");
        }
        tokio::time::sleep(settle).await;

        if self.connect().await.is_err() {
            warn!(network = %self.network, "Radio still unreachable after reboot");
        }
    }

    /// Run the supervisor until shutdown
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            network = %self.network,
            transport = self.transport.name(),
            "Starting link supervisor"
        );

        tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => {}
            _ = self.startup() => {}
        }

        let interval = self.config.health_interval;
        let mut probe = tokio::time::interval_at(Instant::now() + interval, interval);
        probe.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            if self.state() == ConnectionState::Connected {
                tokio::select! {
                    biased;

                    _ = wait_for_shutdown(&mut shutdown) => break,

                    Some(cmd) = self.command_rx.recv() => {
                        if !self.handle_command(cmd).await {
                            break;
                        }
                    }

                    result = self.transport.read_frame() => {
                        self.handle_read(result).await;
                    }

                    _ = probe.tick() => {
                        self.check_liveness().await;
                    }
                }
            } else {
                let wake = tokio::time::sleep_until(self.next_attempt_at);
                tokio::select! {
                    biased;

                    _ = wait_for_shutdown(&mut shutdown) => break,

                    Some(cmd) = self.command_rx.recv() => {
                        if !self.handle_command(cmd).await {
                            break;
                        }
                    }

                    _ = wake => {
                        let connected = tokio::select! {
                            _ = wait_for_shutdown(&mut shutdown) => break,
                            result = self.connect() => result.is_ok(),
                        };
                        if connected {
                            probe.reset();
                        }
                    }
                }
            }
        }

        if let Err(e) = self.transport.disconnect().await {
            warn!(network = %self.network, error = %e, "Error disconnecting transport");
        }
        self.set_state(ConnectionState::Disconnected);
        info!(network = %self.network, "Link supervisor stopped");
    }

    /// Returns false when the supervisor should stop
    async fn handle_command(&mut self, cmd: SupervisorCommand) -> bool {
        match cmd {
            SupervisorCommand::Send { message, reply } => {
                let result = self.send_message(&message).await;
                let _ = reply.send(result);
            }
            SupervisorCommand::Reconnect => {
                info!(network = %self.network, "Reconnect requested");
                self.teardown(ConnectionState::Disconnected, Duration::ZERO).await;
            }
            SupervisorCommand::Shutdown => {
                info!(network = %self.network, "Link shutdown requested");
                return false;
            }
        }
        true
    }

    async fn send_message(&mut self, message: &OutboundMessage) -> Result<u32> {
        if message.network != self.network {
            return Err(LinkError::InvalidConfig(format!(
                "message for {} submitted to the {} link",
                message.network, self.network
            )));
        }
        if self.state() != ConnectionState::Connected {
            self.shared.lock().stats.send_failures += 1;
            return Err(LinkError::Disconnected);
        }

        let packet_id = rand::random::<u32>();
        let frame = match self.decoder.encode(message, packet_id) {
            Ok(frame) => frame,
            Err(e) => {
                self.shared.lock().stats.send_failures += 1;
                return Err(e.into());
            }
        };

        match self.transport.write_frame(&frame).await {
            Ok(()) => {
                self.shared.lock().stats.packets_sent += 1;
                debug!(
                    network = %self.network,
                    to = %message.destination,
                    packet_id,
                    "Message sent"
                );
                Ok(packet_id)
            }
            Err(e) => {
                warn!(network = %self.network, error = %e, "Write failed");
                {
                    let mut shared = self.shared.lock();
                    shared.stats.send_failures += 1;
                    shared.stats.transport_errors += 1;
                }
                if e.is_retriable() {
                    self.teardown(ConnectionState::Disconnected, self.config.retry_backoff).await;
                }
                Err(e)
            }
        }
    }

    async fn handle_read(&mut self, result: Result<Option<bytes::Bytes>>) {
        match result {
            Ok(Some(frame)) => {
                self.last_frame_at = Instant::now();
                self.shared.lock().stats.frames_received += 1;
                self.handle_frame(&frame).await;
            }
            Ok(None) => {}
            Err(e) if e.is_protocol_error() => {
                self.shared.lock().stats.decode_errors += 1;
                debug!(network = %self.network, error = %e, "Dropped malformed frame");
            }
            Err(e) => {
                warn!(network = %self.network, error = %e, code = e.error_code(), "Transport error");
                self.shared.lock().stats.transport_errors += 1;
                self.teardown(ConnectionState::Disconnected, self.config.retry_backoff).await;
            }
        }
    }

    async fn handle_frame(&mut self, frame: &[u8]) {
        let packet = match self.decoder.decode(frame, self.network) {
            Ok(Some(packet)) => packet.with_via_transport(self.transport.name()),
            Ok(None) => {
                trace!(network = %self.network, "Frame carried no mesh packet");
                return;
            }
            Err(e) => {
                self.shared.lock().stats.decode_errors += 1;
                warn!(network = %self.network, error = %e, size = frame.len(), "Failed to decode frame");
                return;
            }
        };

        if self.state() != ConnectionState::Connected {
            return;
        }

        trace!(
            network = %self.network,
            from = %packet.sender(),
            kind = %packet.kind(),
            "Emitting packet"
        );
        if self.packet_tx.send(packet).await.is_err() {
            debug!(network = %self.network, "Packet receiver dropped");
            return;
        }
        self.shared.lock().stats.packets_emitted += 1;
    }

    fn sibling_alive(&self) -> bool {
        match &self.sibling {
            Some(sibling) => *sibling.borrow() == ConnectionState::Connected,
            None => true,
        }
    }

    async fn check_liveness(&mut self) {
        let silent_for = self.last_frame_at.elapsed();
        if silent_for >= self.config.silence_timeout && self.sibling_alive() {
            warn!(
                network = %self.network,
                silent_for = ?silent_for,
                "Link silent for too long, reconnecting"
            );
            self.shared.lock().stats.silence_resets += 1;
            self.teardown(ConnectionState::Disconnected, Duration::ZERO).await;
            return;
        }

        match self.transport.probe().await {
            Ok(()) => {
                if self.probe_failures > 0 {
                    info!(network = %self.network, "Link probe recovered");
                }
                self.probe_failures = 0;
            }
            Err(e) => {
                self.probe_failures += 1;
                warn!(
                    network = %self.network,
                    failures = self.probe_failures,
                    error = %e,
                    "Link probe failed"
                );
                if self.probe_failures >= self.config.degraded_threshold {
                    self.shared.lock().stats.degraded_entries += 1;
                    self.teardown(ConnectionState::Degraded, Duration::ZERO).await;
                }
            }
        }
    }
}

/// Resolves once shutdown is requested or the sender is gone
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LinkConfigBuilder;
    use crate::decoder::CompactCodec;
    use crate::test_utils::{MockTransport, MockTransportControl};
    use dualmesh_core::{NodeId, Payload, BROADCAST};

    fn test_config() -> LinkConfig {
        LinkConfigBuilder::new()
            .tcp("mock", 4403)
            .retries(2, Duration::from_millis(100))
            .connect_timeout(Duration::from_secs(1))
            .reconnect_cooldown(Duration::from_secs(5))
            .build()
    }

    fn supervisor(
        config: LinkConfig,
    ) -> (
        ConnectionSupervisor<MockTransport>,
        SupervisorHandle,
        MockTransportControl,
        mpsc::Receiver<Packet>,
    ) {
        let (transport, control) = MockTransport::new("mock:net_a");
        let (packet_tx, packet_rx) = mpsc::channel(16);
        let (sup, handle) = ConnectionSupervisor::new(
            NetworkSource::NetA,
            transport,
            Arc::new(CompactCodec::new()),
            config,
            packet_tx,
        );
        (sup, handle, control, packet_rx)
    }

    fn text_frame(from: u32, text: &str) -> bytes::Bytes {
        CompactCodec::encode_envelope(NodeId(from), BROADCAST, 1, 0, &Payload::Text(text.into()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_success() {
        let (mut sup, handle, control, _rx) = supervisor(test_config());

        sup.connect().await.unwrap();
        assert_eq!(handle.state(), ConnectionState::Connected);
        assert!(sup.is_alive());
        assert_eq!(control.connect_count(), 1);
        assert_eq!(handle.stats().connects, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_when_connected_is_noop() {
        let (mut sup, _handle, control, _rx) = supervisor(test_config());

        sup.connect().await.unwrap();
        sup.connect().await.unwrap();
        assert_eq!(control.connect_count(), 1);
        assert!(control.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_exhausts_retries() {
        let (mut sup, handle, control, _rx) = supervisor(test_config());
        control.set_fail_connect(true);

        assert!(sup.connect().await.is_err());
        assert_eq!(control.connect_count(), 2);
        assert_eq!(handle.state(), ConnectionState::Disconnected);
        assert_eq!(handle.stats().connect_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout_is_bounded() {
        let (mut sup, handle, control, _rx) = supervisor(test_config());
        control.set_connect_delay(Some(Duration::from_secs(3600)));

        let started = Instant::now();
        let result = sup.connect().await;
        assert!(matches!(result, Err(LinkError::ConnectionTimeout { .. })));
        // Two attempts of 1s plus one 100ms backoff
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(handle.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_escalation_after_failed_cycles() {
        let config = LinkConfigBuilder::new()
            .retries(1, Duration::from_millis(10))
            .escalate_after_cycles(3)
            .build();
        let (mut sup, handle, control, _rx) = supervisor(config);
        control.set_fail_connect(true);

        for _ in 0..2 {
            let _ = sup.connect().await;
        }
        assert!(!handle.is_escalated());
        let _ = sup.connect().await;
        assert!(handle.is_escalated());

        control.set_fail_connect(false);
        sup.connect().await.unwrap();
        assert!(!handle.is_escalated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_decode_error_is_counted_not_emitted() {
        let (mut sup, handle, _control, mut rx) = supervisor(test_config());
        sup.connect().await.unwrap();

        sup.handle_read(Ok(Some(bytes::Bytes::from_static(&[1, 2, 3])))).await;
        assert_eq!(handle.stats().decode_errors, 1);
        assert!(rx.try_recv().is_err());

        sup.handle_read(Ok(Some(text_frame(0xAA, "hi")))).await;
        let packet = rx.try_recv().unwrap();
        assert_eq!(packet.network(), NetworkSource::NetA);
        assert_eq!(packet.via_transport(), "mock:net_a");
        assert_eq!(handle.stats().packets_emitted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_connected_emits_nothing() {
        let (mut sup, _handle, _control, mut rx) = supervisor(test_config());
        sup.handle_frame(&text_frame(0xAA, "hi")).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_requires_connection() {
        let (mut sup, handle, control, _rx) = supervisor(test_config());
        let message =
            OutboundMessage::text(NetworkSource::NetA, NodeId(1), NodeId(0xAA), "pong");

        assert!(matches!(
            sup.send_message(&message).await,
            Err(LinkError::Disconnected)
        ));

        sup.connect().await.unwrap();
        sup.send_message(&message).await.unwrap();
        assert_eq!(control.sent_frames().len(), 1);
        assert_eq!(handle.stats().packets_sent, 1);

        let wrong = OutboundMessage::text(NetworkSource::NetB, NodeId(1), NodeId(0xAA), "x");
        assert!(sup.send_message(&wrong).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_degraded_after_probe_failures() {
        let config = LinkConfigBuilder::new()
            .health(Duration::from_secs(1), 2)
            .build();
        let (mut sup, handle, control, _rx) = supervisor(config);
        sup.connect().await.unwrap();
        control.set_probe_ok(false);

        sup.check_liveness().await;
        assert_eq!(handle.state(), ConnectionState::Connected);
        sup.check_liveness().await;
        assert_eq!(handle.state(), ConnectionState::Degraded);
        assert_eq!(handle.stats().degraded_entries, 1);
        assert!(!control.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_respects_sibling() {
        let config = LinkConfigBuilder::new()
            .silence_timeout(Duration::from_secs(10))
            .build();
        let (sup, handle, control, _rx) = supervisor(config);
        let (sibling_tx, sibling_rx) = watch::channel(ConnectionState::Disconnected);
        let mut sup = sup.with_sibling(sibling_rx);
        sup.connect().await.unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;

        // Sibling down: silence alone proves nothing
        sup.check_liveness().await;
        assert_eq!(handle.state(), ConnectionState::Connected);

        sibling_tx.send_replace(ConnectionState::Connected);
        sup.check_liveness().await;
        assert_eq!(handle.state(), ConnectionState::Disconnected);
        assert_eq!(handle.stats().silence_resets, 1);
        assert!(!control.is_connected());
    }
}
