//! Watchdog and semaphore configuration

use dualmesh_core::config::humantime_serde;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default RAM-backed location of the reboot semaphore
pub const DEFAULT_SEMAPHORE_PATH: &str = "/dev/shm/dualmesh-reboot.lock";

/// Health watchdog configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// Time between scheduled checks
    #[serde(with = "humantime_serde", default = "default_interval")]
    pub interval: Duration,

    /// Minimum spacing between two checks
    #[serde(with = "humantime_serde", default = "default_cooldown")]
    pub cooldown: Duration,

    /// Consecutive failed checks before escalating
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Signal a reboot when the threshold is reached
    #[serde(default)]
    pub escalate: bool,

    /// Fail the check when a link has given up reconnecting
    #[serde(default)]
    pub watch_links: bool,

    /// Reboot semaphore location
    #[serde(default = "default_semaphore_path")]
    pub semaphore_path: PathBuf,

    /// Name recorded as the requester of watchdog reboots
    #[serde(default = "default_requester")]
    pub requester: String,
}

fn default_interval() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_cooldown() -> Duration {
    Duration::from_secs(30)
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_semaphore_path() -> PathBuf {
    PathBuf::from(DEFAULT_SEMAPHORE_PATH)
}

fn default_requester() -> String {
    "dualmesh-watchdog".to_string()
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            cooldown: default_cooldown(),
            failure_threshold: default_failure_threshold(),
            escalate: false,
            watch_links: false,
            semaphore_path: default_semaphore_path(),
            requester: default_requester(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WatchdogConfig::default();
        assert_eq!(config.failure_threshold, 3);
        assert!(!config.escalate);
        assert_eq!(
            config.semaphore_path,
            PathBuf::from("/dev/shm/dualmesh-reboot.lock")
        );
    }

    #[test]
    fn test_parse_toml() {
        let config: WatchdogConfig = toml::from_str(
            r#"
            interval = "2m"
            escalate = true
            "#,
        )
        .unwrap();
        assert_eq!(config.interval, Duration::from_secs(120));
        assert!(config.escalate);
        assert_eq!(config.cooldown, Duration::from_secs(30));
    }
}
