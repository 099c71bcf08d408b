//! Health watchdog
//!
//! Runs every [`HealthProbe`] on a fixed interval and counts consecutive
//! failed checks. When the streak reaches the configured threshold (and
//! escalation is enabled) a single [`RebootRequest`] goes out through the
//! [`RebootSignal`]. The next successful check resets the streak.

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::WatchdogConfig;
use crate::probes::HealthProbe;
use crate::semaphore::{RebootRequest, RebootSignal};

/// Outcome of a health check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every probe passed
    Ok,
    /// At least one probe failed
    Degraded,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Ok => write!(f, "ok"),
            HealthStatus::Degraded => write!(f, "degraded"),
        }
    }
}

/// A failed probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeFailure {
    /// Probe name
    pub probe: String,
    /// Failure reason
    pub reason: String,
}

/// Result of the most recent check
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Overall status
    pub status: HealthStatus,
    /// Probes that failed
    pub failures: Vec<ProbeFailure>,
    /// Length of the current failure streak
    pub consecutive_failures: u32,
    /// Whether this streak already produced a reboot request
    pub escalated: bool,
}

impl Default for HealthReport {
    fn default() -> Self {
        Self {
            status: HealthStatus::Ok,
            failures: Vec::new(),
            consecutive_failures: 0,
            escalated: false,
        }
    }
}

#[derive(Debug, Default)]
struct WatchdogState {
    consecutive_failures: u32,
    escalated: bool,
    last_check: Option<Instant>,
    last_report: HealthReport,
}

/// Periodic health checker with reboot escalation
pub struct HealthWatchdog {
    config: WatchdogConfig,
    probes: Vec<Arc<dyn HealthProbe>>,
    signal: Option<Arc<dyn RebootSignal>>,
    state: Mutex<WatchdogState>,
}

impl HealthWatchdog {
    /// Create a watchdog without probes
    pub fn new(config: WatchdogConfig) -> Self {
        Self {
            config,
            probes: Vec::new(),
            signal: None,
            state: Mutex::new(WatchdogState::default()),
        }
    }

    /// Add a probe
    pub fn with_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probes.push(probe);
        self
    }

    /// Set where reboot requests go
    pub fn with_signal(mut self, signal: Arc<dyn RebootSignal>) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Configuration in use
    pub fn config(&self) -> &WatchdogConfig {
        &self.config
    }

    /// Most recent report
    pub fn last_report(&self) -> HealthReport {
        self.state.lock().last_report.clone()
    }

    /// Length of the current failure streak
    pub fn consecutive_failures(&self) -> u32 {
        self.state.lock().consecutive_failures
    }

    /// Run all probes and update the failure streak
    ///
    /// A call within `cooldown` of the previous check returns the previous
    /// status without probing.
    pub async fn check_health(&self) -> HealthStatus {
        {
            let state = self.state.lock();
            if let Some(last) = state.last_check {
                if last.elapsed() < self.config.cooldown {
                    debug!("Health check skipped (cooldown)");
                    return state.last_report.status;
                }
            }
        }

        let mut failures = Vec::new();
        for probe in &self.probes {
            if let Err(e) = probe.check().await {
                warn!(probe = probe.name(), error = %e, "Health probe failed");
                failures.push(ProbeFailure {
                    probe: probe.name().to_string(),
                    reason: e.to_string(),
                });
            }
        }

        let escalation = {
            let mut state = self.state.lock();
            state.last_check = Some(Instant::now());

            if failures.is_empty() {
                if state.consecutive_failures > 0 {
                    info!(
                        after = state.consecutive_failures,
                        "Health restored"
                    );
                }
                state.consecutive_failures = 0;
                state.escalated = false;
            } else {
                state.consecutive_failures += 1;
                warn!(
                    consecutive = state.consecutive_failures,
                    threshold = self.config.failure_threshold,
                    failed = failures.len(),
                    "Health check degraded"
                );
            }

            let due = !failures.is_empty()
                && self.config.escalate
                && !state.escalated
                && state.consecutive_failures >= self.config.failure_threshold;

            state.last_report = HealthReport {
                status: if failures.is_empty() {
                    HealthStatus::Ok
                } else {
                    HealthStatus::Degraded
                },
                failures: failures.clone(),
                consecutive_failures: state.consecutive_failures,
                escalated: state.escalated,
            };

            due.then(|| self.reboot_request(state.consecutive_failures, &failures))
        };

        if let Some(request) = escalation {
            self.escalate(request).await;
        }

        self.state.lock().last_report.status
    }

    fn reboot_request(&self, streak: u32, failures: &[ProbeFailure]) -> RebootRequest {
        let detail: Vec<String> = failures
            .iter()
            .map(|f| format!("{}: {}", f.probe, f.reason))
            .collect();
        RebootRequest::watchdog(
            format!("{} consecutive failed health checks ({})", streak, detail.join("; ")),
            self.config.requester.clone(),
        )
    }

    async fn escalate(&self, request: RebootRequest) {
        let Some(signal) = &self.signal else {
            warn!("Failure threshold reached but no reboot signal is configured");
            return;
        };

        match signal.signal(&request).await {
            Ok(()) => {
                error!(
                    request_id = %request.request_id,
                    reason = %request.reason,
                    "Escalated to host reboot"
                );
                let mut state = self.state.lock();
                state.escalated = true;
                state.last_report.escalated = true;
            }
            // Left unescalated so the next failed check retries
            Err(e) => warn!(error = %e, "Failed to signal reboot"),
        }
    }

    /// Check on the configured interval until shutdown
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval = ?self.config.interval,
            probes = self.probes.len(),
            escalate = self.config.escalate,
            "Health watchdog started"
        );

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }

                _ = ticker.tick() => {
                    let status = self.check_health().await;
                    debug!(%status, "Health check finished");
                }
            }
        }

        info!("Health watchdog stopped");
    }
}

impl fmt::Debug for HealthWatchdog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthWatchdog")
            .field("probes", &self.probes.iter().map(|p| p.name()).collect::<Vec<_>>())
            .field("escalate", &self.config.escalate)
            .finish()
    }
}
