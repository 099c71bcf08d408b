//! Out-of-band radio reboot
//!
//! A radio that wedges its network stack keeps answering ARP but refuses
//! API connections. The only cure is a reboot through a side channel
//! (vendor CLI over BLE, a smart plug, ...). The supervisor uses a
//! [`PeerRebooter`] once at startup when the initial connect cycles fail.

use async_trait::async_trait;
use dualmesh_core::NetworkSource;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::RemoteRebootConfig;
use crate::error::{LinkError, Result};

/// Reboots the radio behind a network
#[async_trait]
pub trait PeerRebooter: Send + Sync {
    /// Ask the radio serving `network` to reboot
    async fn reboot_peer(&self, network: NetworkSource) -> Result<()>;
}

/// Reboots a radio by running an external command
#[derive(Debug, Clone)]
pub struct CommandRebooter {
    config: RemoteRebootConfig,
}

impl CommandRebooter {
    /// Create from configuration
    pub fn new(config: RemoteRebootConfig) -> Self {
        Self { config }
    }

    /// Wait recommended after a reboot before connecting
    pub fn settle(&self) -> std::time::Duration {
        self.config.settle
    }
}

#[async_trait]
impl PeerRebooter for CommandRebooter {
    async fn reboot_peer(&self, network: NetworkSource) -> Result<()> {
        info!(%network, program = %self.config.program, "Rebooting radio out of band");

        let child = Command::new(&self.config.program)
            .args(&self.config.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.config.timeout, child)
            .await
            .map_err(|_| {
                LinkError::RebootFailed(format!(
                    "{} timed out after {:?}",
                    self.config.program, self.config.timeout
                ))
            })?
            .map_err(|e| LinkError::RebootFailed(format!("{}: {}", self.config.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(%network, status = %output.status, stderr = %stderr.trim(), "Reboot command failed");
            return Err(LinkError::RebootFailed(format!(
                "{} exited with {}",
                self.config.program, output.status
            )));
        }

        info!(%network, "Reboot command completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(program: &str, args: &[&str]) -> RemoteRebootConfig {
        RemoteRebootConfig {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            timeout: Duration::from_secs(5),
            settle: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_successful_command() {
        let rebooter = CommandRebooter::new(config("true", &[]));
        rebooter.reboot_peer(NetworkSource::NetB).await.unwrap();
    }

    #[tokio::test]
    async fn test_failing_command() {
        let rebooter = CommandRebooter::new(config("false", &[]));
        assert!(matches!(
            rebooter.reboot_peer(NetworkSource::NetB).await,
            Err(LinkError::RebootFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let rebooter = CommandRebooter::new(config("/nonexistent/radio-cli", &[]));
        assert!(rebooter.reboot_peer(NetworkSource::NetA).await.is_err());
    }

    #[tokio::test]
    async fn test_command_timeout() {
        let mut cfg = config("sleep", &["5"]);
        cfg.timeout = Duration::from_millis(50);
        let rebooter = CommandRebooter::new(cfg);
        assert!(matches!(
            rebooter.reboot_peer(NetworkSource::NetA).await,
            Err(LinkError::RebootFailed(_))
        ));
    }
}
