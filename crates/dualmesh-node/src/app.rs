//! Wires links, router, store, watchdog and responder together

use anyhow::Context;
use dualmesh_core::{NetworkSource, Packet};
use dualmesh_health::{
    FilesystemProbe, HealthWatchdog, LinkEscalationProbe, RebootSemaphore, StoreIntegrityProbe,
};
use dualmesh_link::{
    CommandRebooter, CompactCodec, ConnectionState, ConnectionSupervisor, LinkConfig,
    PacketDecoder, PeerLeases, SupervisorHandle, TcpTransport, Transport, TransportConfig,
};
use dualmesh_router::DualNetworkRouter;
use dualmesh_state::{run_cleanup_loop, TrafficStore, TrafficWriter};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::NodeConfig;
use crate::responder::run_responder;

type StartFn = Box<
    dyn FnOnce(Option<watch::Receiver<ConnectionState>>, watch::Receiver<bool>) -> JoinHandle<()>
        + Send,
>;

/// A supervisor built but not yet running
///
/// Sibling wiring needs both handles before either supervisor starts.
struct PendingLink {
    handle: SupervisorHandle,
    start: StartFn,
}

fn prepare<T: Transport + 'static>(
    network: NetworkSource,
    transport: T,
    decoder: Arc<dyn PacketDecoder>,
    config: LinkConfig,
    packet_tx: mpsc::Sender<Packet>,
) -> PendingLink {
    let rebooter = config.remote_reboot.clone().map(CommandRebooter::new);
    let (mut supervisor, handle) =
        ConnectionSupervisor::new(network, transport, decoder, config, packet_tx);
    if let Some(rebooter) = rebooter {
        let settle = rebooter.settle();
        supervisor = supervisor.with_rebooter(Arc::new(rebooter), settle);
    }

    PendingLink {
        handle,
        start: Box::new(move |sibling, shutdown| {
            let supervisor = match sibling {
                Some(sibling) => supervisor.with_sibling(sibling),
                None => supervisor,
            };
            tokio::spawn(supervisor.run(shutdown))
        }),
    }
}

fn open_link(
    network: NetworkSource,
    config: &LinkConfig,
    leases: &PeerLeases,
    decoder: Arc<dyn PacketDecoder>,
    packet_tx: mpsc::Sender<Packet>,
) -> anyhow::Result<PendingLink> {
    info!(%network, peer = %config.transport.peer(), framing = ?config.framing, "Opening link");

    match &config.transport {
        TransportConfig::Tcp { .. } => {
            let transport = TcpTransport::from_config(config, leases.clone())?;
            Ok(prepare(network, transport, decoder, config.clone(), packet_tx))
        }
        #[cfg(feature = "serial")]
        TransportConfig::Serial { .. } => {
            let transport = dualmesh_link::SerialTransport::from_config(config, leases.clone())?;
            Ok(prepare(network, transport, decoder, config.clone(), packet_tx))
        }
        #[cfg(not(feature = "serial"))]
        TransportConfig::Serial { device, .. } => anyhow::bail!(
            "{} is configured for serial device {} but this build has no serial support \
             (rebuild with --features serial)",
            network,
            device.display()
        ),
    }
}

/// Run the bridge until ctrl-c
pub async fn run(config: NodeConfig) -> anyhow::Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    // Persistence
    let store = TrafficStore::open_with(&config.store)
        .await
        .with_context(|| format!("opening {}", config.store.path.display()))?;
    let (writer, _writer_task) = TrafficWriter::spawn(store.clone(), config.store.write_queue);
    tasks.push(tokio::spawn(run_cleanup_loop(
        store.clone(),
        config.store.cleanup_interval,
        config.store.retention,
        shutdown_rx.clone(),
    )));

    // Links
    let leases = PeerLeases::new();
    let decoder: Arc<dyn PacketDecoder> = Arc::new(CompactCodec::new());
    let (packet_tx, packet_rx) = mpsc::channel(config.router.accepted_queue);

    let mut pending = Vec::new();
    for network in config.enabled_networks() {
        pending.push(open_link(
            network,
            config.link(network),
            &leases,
            decoder.clone(),
            packet_tx.clone(),
        )?);
    }
    drop(packet_tx);

    let handles: Vec<SupervisorHandle> = pending.iter().map(|link| link.handle.clone()).collect();
    for link in pending {
        let sibling = handles
            .iter()
            .find(|other| other.network() != link.handle.network())
            .map(|other| other.subscribe_state());
        tasks.push((link.start)(sibling, shutdown_rx.clone()));
    }

    // Router and command layer
    let mut router = DualNetworkRouter::new(config.router.clone(), Arc::new(writer.clone()));
    for handle in &handles {
        router = router.with_link(Arc::new(handle.clone()));
    }
    let router = router.into_handle();

    let (accepted_tx, accepted_rx) = mpsc::channel(config.router.accepted_queue);
    tasks.push(tokio::spawn(router.clone().run(
        packet_rx,
        accepted_tx,
        shutdown_rx.clone(),
    )));
    tasks.push(tokio::spawn(run_responder(
        router.clone(),
        accepted_rx,
        config.responder.clone(),
        shutdown_rx.clone(),
    )));

    // Health
    let mut watchdog = HealthWatchdog::new(config.health.clone())
        .with_probe(Arc::new(FilesystemProbe::new(config.data_dir())))
        .with_probe(Arc::new(StoreIntegrityProbe::new(store.clone())))
        .with_signal(Arc::new(RebootSemaphore::new(&config.health.semaphore_path)));
    if config.health.watch_links {
        for handle in &handles {
            watchdog = watchdog.with_probe(Arc::new(LinkEscalationProbe::new(handle.clone())));
        }
    }
    let watchdog = Arc::new(watchdog);
    {
        let watchdog = watchdog.clone();
        let shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move { watchdog.run(shutdown).await }));
    }

    info!(
        links = handles.len(),
        primary = %config.router.primary_network,
        "Bridge running (ctrl-c to stop)"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    let _ = shutdown_tx.send(true);

    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "Task ended abnormally");
        }
    }

    if let Err(e) = writer.flush().await {
        warn!(error = %e, "Final flush failed");
    }
    let writer_stats = writer.stats();
    let router_stats = router.stats();
    info!(
        accepted = router_stats.total_accepted(),
        duplicates = router_stats.total_duplicates(),
        written = writer_stats.written,
        dropped = writer_stats.dropped,
        "Final statistics"
    );
    store.close().await;

    Ok(())
}
