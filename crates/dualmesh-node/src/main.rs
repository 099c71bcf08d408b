//! dualmesh - bridge between two incompatible radio mesh networks
//!
//! Connects one radio per network, merges and deduplicates their traffic,
//! records it in SQLite and answers on whichever network a sender was last
//! heard on.

mod app;
mod config;
mod responder;

use clap::Parser;
use dualmesh_core::{NetworkSource, NodeId};
use dualmesh_link::find_serial_devices;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use config::NodeConfig;

#[derive(Parser)]
#[command(name = "dualmesh")]
#[command(about = "Dual radio mesh bridge")]
struct Args {
    /// Configuration file (defaults are used when omitted)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Database path (overrides the config file)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Network used for senders never heard before (net_a or net_b)
    #[arg(long)]
    primary: Option<NetworkSource>,

    /// Our radio's node id on network A (e.g. !deadbeef)
    #[arg(long)]
    own_id_a: Option<NodeId>,

    /// Our radio's node id on network B
    #[arg(long)]
    own_id_b: Option<NodeId>,

    /// Never signal a host reboot, whatever the config says
    #[arg(long)]
    no_escalate: bool,

    /// List serial devices that look like radios and exit
    #[arg(long)]
    list_devices: bool,

    /// Enable verbose logging
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.list_devices {
        let devices = find_serial_devices();
        if devices.is_empty() {
            println!("No serial devices found");
        }
        for device in devices {
            let marker = if device.likely_radio { "*" } else { " " };
            println!(
                "{} {} {}",
                marker,
                device.path.display(),
                device.product.as_deref().unwrap_or("")
            );
        }
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => NodeConfig::load(path)?,
        None => NodeConfig::default(),
    };
    if let Some(db) = args.db {
        config.store.path = db;
    }
    if let Some(primary) = args.primary {
        config.router.primary_network = primary;
    }
    if let Some(id) = args.own_id_a {
        config.router.own_ids.net_a = Some(id);
    }
    if let Some(id) = args.own_id_b {
        config.router.own_ids.net_b = Some(id);
    }
    if args.no_escalate {
        config.health.escalate = false;
    }
    config.validate()?;

    info!("dualmesh v{}", env!("CARGO_PKG_VERSION"));
    for network in config.enabled_networks() {
        info!("{}: {}", network, config.link(network).transport.peer());
    }
    info!("Database: {}", config.store.path.display());
    info!(
        "Reboot escalation: {}",
        if config.health.escalate { "enabled" } else { "disabled" }
    );

    app::run(config).await
}
