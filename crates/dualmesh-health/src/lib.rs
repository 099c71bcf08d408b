//! Host health supervision for the dualmesh bridge
//!
//! The bridge runs unattended on small single-board computers. This crate
//! watches the things that break there (SD cards going read-only, a
//! corrupted database, radios that never come back) and, as a last
//! resort, asks a privileged helper to reboot the host.
//!
//! - [`HealthWatchdog`] runs [`HealthProbe`]s and counts failure streaks
//! - [`RebootSemaphore`] carries a [`RebootRequest`] across processes
//! - [`RebootWatcher`] executes requests (the `dualmesh-rebootd` binary)

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod probes;
pub mod semaphore;
pub mod test_utils;
pub mod watchdog;
pub mod watcher;

pub use config::{WatchdogConfig, DEFAULT_SEMAPHORE_PATH};
pub use error::{HealthError, Result};
pub use probes::{FilesystemProbe, HealthProbe, LinkEscalationProbe, StoreIntegrityProbe};
pub use semaphore::{is_ram_backed, RebootKind, RebootRequest, RebootSemaphore, RebootSignal};
pub use test_utils::{MockProbe, RecordingSignal};
pub use watchdog::{HealthReport, HealthStatus, HealthWatchdog, ProbeFailure};
pub use watcher::{
    reboot_plan, DryRunExecutor, PlannedCommand, RebootExecutor, RebootWatcher, SystemExecutor,
    DEFAULT_POLL_INTERVAL,
};
