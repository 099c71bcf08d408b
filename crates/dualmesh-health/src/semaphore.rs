//! Cross-process reboot semaphore
//!
//! The bridge never reboots the host itself. It writes a [`RebootRequest`]
//! into a lock file on a RAM-backed filesystem and a small privileged
//! watcher (`dualmesh-rebootd`) picks it up. Both sides hold an exclusive
//! `fs2` lock while touching the file, and the file is truncated in place
//! rather than replaced so every process locks the same inode.
//!
//! A tmpfs location means a request never survives the reboot it caused.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{HealthError, Result};

/// Why a reboot was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebootKind {
    /// Health checks kept failing; reboot hard
    WatchdogEscalation,
    /// An operator asked for a reboot; reboot gracefully
    UserRequest,
}

impl RebootKind {
    /// Higher ranks are never replaced by lower ones while pending
    fn rank(self) -> u8 {
        match self {
            RebootKind::UserRequest => 0,
            RebootKind::WatchdogEscalation => 1,
        }
    }
}

impl fmt::Display for RebootKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebootKind::WatchdogEscalation => write!(f, "watchdog_escalation"),
            RebootKind::UserRequest => write!(f, "user_request"),
        }
    }
}

/// Payload stored in the semaphore file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebootRequest {
    /// Unique id, logged by both sides
    pub request_id: Uuid,
    /// Kind of reboot
    pub kind: RebootKind,
    /// Human readable cause
    pub reason: String,
    /// Component or user that asked
    pub requester: String,
    /// When the request was written
    pub requested_at: DateTime<Utc>,
}

impl RebootRequest {
    /// Create a request of the given kind
    pub fn new(kind: RebootKind, reason: impl Into<String>, requester: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            kind,
            reason: reason.into(),
            requester: requester.into(),
            requested_at: Utc::now(),
        }
    }

    /// Request raised by the health watchdog
    pub fn watchdog(reason: impl Into<String>, requester: impl Into<String>) -> Self {
        Self::new(RebootKind::WatchdogEscalation, reason, requester)
    }

    /// Request raised by an operator
    pub fn user(reason: impl Into<String>, requester: impl Into<String>) -> Self {
        Self::new(RebootKind::UserRequest, reason, requester)
    }
}

/// Something that can deliver a reboot request
#[async_trait]
pub trait RebootSignal: Send + Sync {
    /// Deliver the request
    async fn signal(&self, request: &RebootRequest) -> Result<()>;
}

/// Lock-file based reboot semaphore
#[derive(Debug, Clone)]
pub struct RebootSemaphore {
    path: PathBuf,
}

impl RebootSemaphore {
    /// Semaphore at `path`; warns when the path is not RAM-backed
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match std::fs::read_to_string("/proc/mounts") {
            Ok(mounts) if !is_ram_backed(&path, &mounts) => {
                warn!(
                    path = %path.display(),
                    "Reboot semaphore is not on tmpfs; a stale request could survive a reboot"
                );
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "Cannot read /proc/mounts"),
        }
        Self { path }
    }

    /// Lock file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a request unless a higher-ranked one is already pending
    ///
    /// Returns `false` when the pending request was kept.
    pub async fn post(&self, request: &RebootRequest) -> Result<bool> {
        let path = self.path.clone();
        let request = request.clone();
        tokio::task::spawn_blocking(move || post_blocking(&path, &request)).await?
    }

    /// Remove and return the pending request
    pub async fn take(&self) -> Result<Option<RebootRequest>> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || take_blocking(&path)).await?
    }

    /// Pending request without consuming it
    pub async fn peek(&self) -> Result<Option<RebootRequest>> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || peek_blocking(&path)).await?
    }
}

#[async_trait]
impl RebootSignal for RebootSemaphore {
    async fn signal(&self, request: &RebootRequest) -> Result<()> {
        if self.post(request).await? {
            info!(
                request_id = %request.request_id,
                kind = %request.kind,
                reason = %request.reason,
                path = %self.path.display(),
                "Reboot requested"
            );
        } else {
            info!(
                request_id = %request.request_id,
                "Higher priority reboot already pending; request not written"
            );
        }
        Ok(())
    }
}

fn open_locked(path: &Path, create: bool) -> Result<File> {
    if create {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = OpenOptions::new()
        .create(create)
        .read(true)
        .write(true)
        .open(path)?;
    file.lock_exclusive()
        .map_err(|e| HealthError::Semaphore(format!("lock {}: {}", path.display(), e)))?;
    Ok(file)
}

fn read_request(file: &mut File) -> Result<Option<RebootRequest>> {
    let mut contents = String::new();
    file.seek(SeekFrom::Start(0))?;
    file.read_to_string(&mut contents)?;
    if contents.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&contents)?))
}

fn clear(file: &mut File) -> Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.sync_all()?;
    Ok(())
}

fn post_blocking(path: &Path, request: &RebootRequest) -> Result<bool> {
    let mut file = open_locked(path, true)?;

    // A garbled file is overwritten
    if let Ok(Some(pending)) = read_request(&mut file) {
        if pending.kind.rank() > request.kind.rank() {
            return Ok(false);
        }
    }

    let json = serde_json::to_vec(request)?;
    clear(&mut file)?;
    file.write_all(&json)?;
    file.sync_all()?;
    Ok(true)
}

fn take_blocking(path: &Path) -> Result<Option<RebootRequest>> {
    let mut file = match open_locked(path, false) {
        Ok(file) => file,
        Err(HealthError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let request = read_request(&mut file);
    // Cleared even when unparseable so a bad write cannot wedge the watcher
    clear(&mut file)?;
    request
}

fn peek_blocking(path: &Path) -> Result<Option<RebootRequest>> {
    let mut file = match open_locked(path, false) {
        Ok(file) => file,
        Err(HealthError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    read_request(&mut file)
}

/// Whether `path` lives on a tmpfs or ramfs mount according to `mounts`
///
/// `mounts` uses the `/proc/mounts` format. The longest mount point that
/// prefixes the path decides.
pub fn is_ram_backed(path: &Path, mounts: &str) -> bool {
    let mut best: Option<(usize, &str)> = None;

    for line in mounts.lines() {
        let mut fields = line.split_whitespace();
        let (Some(_device), Some(mount_point), Some(fs_type)) =
            (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };

        if !path.starts_with(mount_point) {
            continue;
        }
        let depth = Path::new(mount_point).components().count();
        if best.map_or(true, |(d, _)| depth >= d) {
            best = Some((depth, fs_type));
        }
    }

    matches!(best, Some((_, "tmpfs")) | Some((_, "ramfs")))
}
