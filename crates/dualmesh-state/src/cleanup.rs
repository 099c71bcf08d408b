//! Periodic retention cleanup

use chrono::Utc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::RetentionPolicy;
use crate::store::TrafficStore;

/// Run cleanup every `interval` until `shutdown` flips to true
///
/// The first pass runs immediately. A failed pass is logged and retried on
/// the next tick.
pub async fn run_cleanup_loop(
    store: TrafficStore,
    interval: Duration,
    policy: RetentionPolicy,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!(interval = ?interval, "Retention cleanup scheduled");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match store.cleanup_at(Utc::now(), &policy).await {
                    Ok(report) => debug!(removed = report.total(), "Cleanup pass done"),
                    Err(e) => warn!(code = e.error_code(), "Cleanup pass failed: {}", e),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    debug!("Retention cleanup stopped");
}
