//! Configuration types for a single radio link
//!
//! One [`LinkConfig`] describes one physical network: how to reach the
//! radio, how the byte stream is framed, and the timing of the
//! supervisor's health checks and reconnection attempts.

use dualmesh_core::config::humantime_serde;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Maximum payload size for a LoRa packet
pub const LORA_MAX_PAYLOAD: usize = 237;

/// Default baud rate for radio serial devices
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Default TCP API port exposed by networked radios
pub const DEFAULT_TCP_PORT: u16 = 4403;

/// Configuration for one physical network link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Whether this network is used at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// How to reach the radio
    #[serde(default)]
    pub transport: TransportConfig,

    /// Stream framing used by the radio
    #[serde(default)]
    pub framing: FramingPreset,

    /// Upper bound for a single connect call
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,

    /// Immediate connect attempts per cycle
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,

    /// Backoff between immediate attempts (multiplied by the attempt number)
    #[serde(with = "humantime_serde", default = "default_retry_backoff")]
    pub retry_backoff: Duration,

    /// Wait before the next cycle after a failed one
    #[serde(with = "humantime_serde", default = "default_reconnect_cooldown")]
    pub reconnect_cooldown: Duration,

    /// Reconnect when nothing was heard for this long
    #[serde(with = "humantime_serde", default = "default_silence_timeout")]
    pub silence_timeout: Duration,

    /// Interval between link probes
    #[serde(with = "humantime_serde", default = "default_health_interval")]
    pub health_interval: Duration,

    /// Consecutive probe failures before the link is considered degraded
    #[serde(default = "default_degraded_threshold")]
    pub degraded_threshold: u32,

    /// Failed reconnect cycles before the link asks for escalation
    #[serde(default = "default_escalate_after_cycles")]
    pub escalate_after_cycles: u32,

    /// Connect cycles tried at startup before a remote reboot is considered
    #[serde(default = "default_startup_cycles")]
    pub startup_connect_cycles: u32,

    /// Out-of-band reboot of the radio, used only at startup
    #[serde(default)]
    pub remote_reboot: Option<RemoteRebootConfig>,
}

/// Physical transport to the radio
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Serial port connection
    Serial {
        /// Path to serial device (e.g., /dev/ttyUSB0, /dev/ttyACM0)
        device: PathBuf,
        /// Baud rate (default: 115200)
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },
    /// TCP connection to a networked radio
    Tcp {
        /// Host address
        host: String,
        /// Port number
        #[serde(default = "default_tcp_port")]
        port: u16,
    },
}

impl TransportConfig {
    /// Identifier of the remote end, used for leases and logs
    pub fn peer(&self) -> String {
        match self {
            TransportConfig::Serial { device, .. } => device.display().to_string(),
            TransportConfig::Tcp { host, port } => format!("{}:{}", host, port),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::Serial {
            device: PathBuf::from("/dev/ttyUSB0"),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

/// Frame layout spoken by the radio firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FramingPreset {
    /// `0x94 0xC3` magic, big-endian u16 length
    #[default]
    ProtocolA,
    /// `>` inbound / `<` outbound marker, little-endian u16 length
    ProtocolB,
}

/// Command used to reboot a radio out of band
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteRebootConfig {
    /// Program to run (e.g. a vendor CLI)
    pub program: String,
    /// Arguments passed to the program
    #[serde(default)]
    pub args: Vec<String>,
    /// Upper bound for the command
    #[serde(with = "humantime_serde", default = "default_reboot_timeout")]
    pub timeout: Duration,
    /// Wait after the reboot before connecting again
    #[serde(with = "humantime_serde", default = "default_reboot_settle")]
    pub settle: Duration,
}

fn default_enabled() -> bool {
    true
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_tcp_port() -> u16 {
    DEFAULT_TCP_PORT
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_connect_retries() -> u32 {
    3
}

fn default_retry_backoff() -> Duration {
    Duration::from_secs(2)
}

fn default_reconnect_cooldown() -> Duration {
    Duration::from_secs(30)
}

fn default_silence_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_health_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_degraded_threshold() -> u32 {
    3
}

fn default_escalate_after_cycles() -> u32 {
    10
}

fn default_startup_cycles() -> u32 {
    3
}

fn default_reboot_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_reboot_settle() -> Duration {
    Duration::from_secs(45)
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            transport: TransportConfig::default(),
            framing: FramingPreset::default(),
            connect_timeout: default_connect_timeout(),
            connect_retries: default_connect_retries(),
            retry_backoff: default_retry_backoff(),
            reconnect_cooldown: default_reconnect_cooldown(),
            silence_timeout: default_silence_timeout(),
            health_interval: default_health_interval(),
            degraded_threshold: default_degraded_threshold(),
            escalate_after_cycles: default_escalate_after_cycles(),
            startup_connect_cycles: default_startup_cycles(),
            remote_reboot: None,
        }
    }
}

/// Builder for LinkConfig
#[derive(Debug, Default)]
pub struct LinkConfigBuilder {
    config: LinkConfig,
}

impl LinkConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a serial device
    pub fn serial(mut self, device: impl Into<PathBuf>) -> Self {
        self.config.transport = TransportConfig::Serial {
            device: device.into(),
            baud_rate: DEFAULT_BAUD_RATE,
        };
        self
    }

    /// Use a serial device with a custom baud rate
    pub fn serial_with_baud(mut self, device: impl Into<PathBuf>, baud_rate: u32) -> Self {
        self.config.transport = TransportConfig::Serial {
            device: device.into(),
            baud_rate,
        };
        self
    }

    /// Use a TCP connection
    pub fn tcp(mut self, host: impl Into<String>, port: u16) -> Self {
        self.config.transport = TransportConfig::Tcp {
            host: host.into(),
            port,
        };
        self
    }

    /// Set the framing preset
    pub fn framing(mut self, framing: FramingPreset) -> Self {
        self.config.framing = framing;
        self
    }

    /// Set the per-attempt connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set immediate retries and their backoff
    pub fn retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.config.connect_retries = retries.max(1);
        self.config.retry_backoff = backoff;
        self
    }

    /// Set the cooldown between failed cycles
    pub fn reconnect_cooldown(mut self, cooldown: Duration) -> Self {
        self.config.reconnect_cooldown = cooldown;
        self
    }

    /// Set the silence timeout
    pub fn silence_timeout(mut self, timeout: Duration) -> Self {
        self.config.silence_timeout = timeout;
        self
    }

    /// Set the probe interval and degraded threshold
    pub fn health(mut self, interval: Duration, degraded_threshold: u32) -> Self {
        self.config.health_interval = interval;
        self.config.degraded_threshold = degraded_threshold.max(1);
        self
    }

    /// Set how many failed cycles raise the escalation flag
    pub fn escalate_after_cycles(mut self, cycles: u32) -> Self {
        self.config.escalate_after_cycles = cycles.max(1);
        self
    }

    /// Set the number of startup cycles
    pub fn startup_connect_cycles(mut self, cycles: u32) -> Self {
        self.config.startup_connect_cycles = cycles.max(1);
        self
    }

    /// Configure the out-of-band reboot command
    pub fn remote_reboot(mut self, reboot: RemoteRebootConfig) -> Self {
        self.config.remote_reboot = Some(reboot);
        self
    }

    /// Enable or disable the link
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    /// Build the configuration
    pub fn build(self) -> LinkConfig {
        self.config
    }
}
