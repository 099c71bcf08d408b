//! Health probes
//!
//! A probe answers one question about the host ("can we still write to
//! disk?", "is the database intact?") and fails with a reason when the
//! answer is no. The watchdog runs every probe on each check.

use async_trait::async_trait;
use dualmesh_link::SupervisorHandle;
use dualmesh_state::TrafficStore;
use std::path::{Path, PathBuf};
use tracing::trace;
use uuid::Uuid;

use crate::error::{HealthError, Result};

/// A single health check
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Short name used in logs and reboot reasons
    fn name(&self) -> &str;

    /// Run the check
    async fn check(&self) -> Result<()>;
}

/// Writes a token file into the data directory and reads it back
///
/// Catches full disks and filesystems remounted read-only after an SD card
/// error.
#[derive(Debug, Clone)]
pub struct FilesystemProbe {
    dir: PathBuf,
}

impl FilesystemProbe {
    /// Probe the given directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory being probed
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl HealthProbe for FilesystemProbe {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn check(&self) -> Result<()> {
        let token = Uuid::new_v4().to_string();
        let path = self.dir.join(format!(".dualmesh-probe-{}", token));

        let fail = |op: &str, e: std::io::Error| {
            HealthError::probe(self.name(), format!("{} {}: {}", op, path.display(), e))
        };

        tokio::fs::write(&path, token.as_bytes())
            .await
            .map_err(|e| fail("write", e))?;

        let read_back = tokio::fs::read(&path).await;
        // Best effort; a leftover token file is harmless
        let _ = tokio::fs::remove_file(&path).await;

        let read_back = read_back.map_err(|e| fail("read", e))?;
        if read_back != token.as_bytes() {
            return Err(HealthError::probe(self.name(), "read back different bytes"));
        }

        trace!(dir = %self.dir.display(), "Filesystem probe ok");
        Ok(())
    }
}

/// Runs SQLite `PRAGMA quick_check` on the traffic store
#[derive(Debug, Clone)]
pub struct StoreIntegrityProbe {
    store: TrafficStore,
}

impl StoreIntegrityProbe {
    /// Probe the given store
    pub fn new(store: TrafficStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl HealthProbe for StoreIntegrityProbe {
    fn name(&self) -> &str {
        "store"
    }

    async fn check(&self) -> Result<()> {
        self.store
            .integrity_check()
            .await
            .map_err(|e| HealthError::probe(self.name(), e))
    }
}

/// Fails while a radio link has exhausted its reconnect cycles
#[derive(Debug, Clone)]
pub struct LinkEscalationProbe {
    name: String,
    link: SupervisorHandle,
}

impl LinkEscalationProbe {
    /// Probe the given link
    pub fn new(link: SupervisorHandle) -> Self {
        Self {
            name: format!("link:{}", link.network()),
            link,
        }
    }
}

#[async_trait]
impl HealthProbe for LinkEscalationProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> Result<()> {
        if self.link.is_escalated() {
            return Err(HealthError::probe(
                &self.name,
                format!("link {} gave up reconnecting", self.link.state()),
            ));
        }
        Ok(())
    }
}
