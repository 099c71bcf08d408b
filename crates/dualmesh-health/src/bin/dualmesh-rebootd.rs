//! dualmesh-rebootd - executes reboot requests left by the bridge
//!
//! Runs as root next to the unprivileged bridge process and polls the
//! RAM-backed semaphore file.

use clap::Parser;
use dualmesh_health::{
    DryRunExecutor, RebootExecutor, RebootSemaphore, RebootWatcher, SystemExecutor,
    DEFAULT_SEMAPHORE_PATH,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "dualmesh-rebootd")]
#[command(about = "Reboot watcher for the dualmesh bridge")]
struct Args {
    /// Semaphore file to watch
    #[arg(long, default_value = DEFAULT_SEMAPHORE_PATH)]
    lock_path: PathBuf,

    /// Poll interval (e.g. "5s")
    #[arg(long, default_value = "5s", value_parser = humantime::parse_duration)]
    interval: Duration,

    /// Log the reboot commands instead of running them
    #[arg(long)]
    dry_run: bool,

    /// Handle a pending request once and exit
    #[arg(long)]
    once: bool,

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

    info!("dualmesh-rebootd v{}", env!("CARGO_PKG_VERSION"));
    info!("Semaphore: {}", args.lock_path.display());
    if args.dry_run {
        info!("Dry run: reboot commands will only be logged");
    }

    let executor: Arc<dyn RebootExecutor> = if args.dry_run {
        Arc::new(DryRunExecutor::new())
    } else {
        Arc::new(SystemExecutor)
    };
    let watcher = RebootWatcher::new(RebootSemaphore::new(&args.lock_path), executor)
        .with_poll_interval(args.interval);

    if args.once {
        match watcher.poll_once().await? {
            Some(request) => info!(request_id = %request.request_id, "Request handled"),
            None => info!("No pending request"),
        }
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let run = watcher.run(shutdown_rx);
    tokio::pin!(run);

    tokio::select! {
        _ = &mut run => return Ok(()),
        signal = tokio::signal::ctrl_c() => signal?,
    }

    info!("Shutting down...");
    let _ = shutdown_tx.send(true);
    run.await;
    Ok(())
}
