//! Reboot watcher
//!
//! The privileged side of the semaphore. It polls the lock file, consumes
//! a pending [`RebootRequest`] and turns it into commands: a watchdog
//! escalation flushes disks and forces the reboot, an operator request
//! asks systemd for an orderly one.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::error::{HealthError, Result};
use crate::semaphore::{RebootKind, RebootRequest, RebootSemaphore};

/// Default semaphore poll interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// A command line to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedCommand {
    /// Program
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
}

impl PlannedCommand {
    fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

impl fmt::Display for PlannedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Commands that carry out a reboot of the given kind, in order
pub fn reboot_plan(kind: RebootKind) -> Vec<PlannedCommand> {
    match kind {
        RebootKind::WatchdogEscalation => vec![
            PlannedCommand::new("sync", &[]),
            PlannedCommand::new("systemctl", &["reboot", "--force", "--force"]),
        ],
        RebootKind::UserRequest => vec![PlannedCommand::new("systemctl", &["reboot"])],
    }
}

/// Runs planned commands
#[async_trait]
pub trait RebootExecutor: Send + Sync {
    /// Run one command to completion
    async fn run(&self, command: &PlannedCommand) -> Result<()>;
}

/// Runs commands on the host
#[derive(Debug, Clone, Default)]
pub struct SystemExecutor;

#[async_trait]
impl RebootExecutor for SystemExecutor {
    async fn run(&self, command: &PlannedCommand) -> Result<()> {
        let status = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|e| HealthError::CommandFailed {
                command: command.to_string(),
                reason: e.to_string(),
            })?;

        if !status.success() {
            return Err(HealthError::CommandFailed {
                command: command.to_string(),
                reason: format!("exited with {}", status),
            });
        }
        Ok(())
    }
}

/// Logs commands instead of running them
#[derive(Debug, Clone, Default)]
pub struct DryRunExecutor {
    executed: Arc<Mutex<Vec<PlannedCommand>>>,
}

impl DryRunExecutor {
    /// Create an executor with an empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands that would have run
    pub fn executed(&self) -> Vec<PlannedCommand> {
        self.executed.lock().clone()
    }
}

#[async_trait]
impl RebootExecutor for DryRunExecutor {
    async fn run(&self, command: &PlannedCommand) -> Result<()> {
        info!(command = %command, "Dry run; not executing");
        self.executed.lock().push(command.clone());
        Ok(())
    }
}

/// Polls the semaphore and executes reboot requests
pub struct RebootWatcher {
    semaphore: RebootSemaphore,
    executor: Arc<dyn RebootExecutor>,
    poll_interval: Duration,
}

impl RebootWatcher {
    /// Create a watcher
    pub fn new(semaphore: RebootSemaphore, executor: Arc<dyn RebootExecutor>) -> Self {
        Self {
            semaphore,
            executor,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Consume and execute a pending request, if any
    pub async fn poll_once(&self) -> Result<Option<RebootRequest>> {
        let Some(request) = self.semaphore.take().await? else {
            return Ok(None);
        };

        warn!(
            request_id = %request.request_id,
            kind = %request.kind,
            requester = %request.requester,
            reason = %request.reason,
            "Reboot request received"
        );
        self.execute(&request).await?;
        Ok(Some(request))
    }

    async fn execute(&self, request: &RebootRequest) -> Result<()> {
        let plan = reboot_plan(request.kind);
        let last = plan.len().saturating_sub(1);

        for (i, command) in plan.iter().enumerate() {
            match self.executor.run(command).await {
                Ok(()) => info!(command = %command, "Command completed"),
                // Preparation steps failing must not block the reboot itself
                Err(e) if i < last => warn!(error = %e, "Preparation step failed; continuing"),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Poll until shutdown
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            path = %self.semaphore.path().display(),
            interval = ?self.poll_interval,
            "Reboot watcher started"
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
                    if let Err(e) = self.poll_once().await {
                        error!(error = %e, code = e.error_code(), "Reboot poll failed");
                    }
                }
            }
        }

        info!("Reboot watcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watcher(dir: &tempfile::TempDir) -> (RebootWatcher, RebootSemaphore, DryRunExecutor) {
        let semaphore = RebootSemaphore::new(dir.path().join("reboot.lock"));
        let executor = DryRunExecutor::new();
        let watcher = RebootWatcher::new(semaphore.clone(), Arc::new(executor.clone()));
        (watcher, semaphore, executor)
    }

    #[test]
    fn test_plans() {
        let hard = reboot_plan(RebootKind::WatchdogEscalation);
        assert_eq!(hard.len(), 2);
        assert_eq!(hard[0].to_string(), "sync");
        assert_eq!(hard[1].to_string(), "systemctl reboot --force --force");

        let soft = reboot_plan(RebootKind::UserRequest);
        assert_eq!(soft, vec![PlannedCommand::new("systemctl", &["reboot"])]);
    }

    #[tokio::test]
    async fn test_idle_poll() {
        let dir = tempfile::tempdir().unwrap();
        let (watcher, _, executor) = watcher(&dir);
        assert!(watcher.poll_once().await.unwrap().is_none());
        assert!(executor.executed().is_empty());
    }

    #[tokio::test]
    async fn test_escalation_forces_reboot() {
        let dir = tempfile::tempdir().unwrap();
        let (watcher, semaphore, executor) = watcher(&dir);

        let request = RebootRequest::watchdog("3 consecutive failed health checks", "test");
        semaphore.post(&request).await.unwrap();

        let handled = watcher.poll_once().await.unwrap().unwrap();
        assert_eq!(handled.request_id, request.request_id);
        assert_eq!(executor.executed(), reboot_plan(RebootKind::WatchdogEscalation));

        // Consumed exactly once
        assert!(watcher.poll_once().await.unwrap().is_none());
        assert_eq!(executor.executed().len(), 2);
    }

    #[tokio::test]
    async fn test_user_request_graceful() {
        let dir = tempfile::tempdir().unwrap();
        let (watcher, semaphore, executor) = watcher(&dir);

        semaphore
            .post(&RebootRequest::user("maintenance", "operator"))
            .await
            .unwrap();
        watcher.poll_once().await.unwrap();
        assert_eq!(executor.executed(), reboot_plan(RebootKind::UserRequest));
    }

    #[tokio::test]
    async fn test_system_executor_reports_failure() {
        let err = SystemExecutor
            .run(&PlannedCommand::new("false", &[]))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "COMMAND_FAILED");
        SystemExecutor.run(&PlannedCommand::new("true", &[])).await.unwrap();
    }
}
