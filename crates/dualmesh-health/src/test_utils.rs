//! Test doubles for probes, reboot signals and reboot executors

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{HealthError, Result};
use crate::probes::HealthProbe;
use crate::semaphore::{RebootRequest, RebootSignal};

/// Probe whose outcome is switched from the test
#[derive(Debug, Clone)]
pub struct MockProbe {
    name: String,
    failing: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl MockProbe {
    /// A passing probe
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failing: Arc::new(AtomicBool::new(false)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A failing probe
    pub fn failing(name: impl Into<String>) -> Self {
        let probe = Self::new(name);
        probe.set_failing(true);
        probe
    }

    /// Switch the outcome of later checks
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of checks run
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthProbe for MockProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(HealthError::probe(&self.name, "mock failure"));
        }
        Ok(())
    }
}

/// Signal that keeps every request it receives
#[derive(Debug, Clone, Default)]
pub struct RecordingSignal {
    requests: Arc<Mutex<Vec<RebootRequest>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingSignal {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Make later signals fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Requests delivered so far
    pub fn requests(&self) -> Vec<RebootRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl RebootSignal for RecordingSignal {
    async fn signal(&self, request: &RebootRequest) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(HealthError::Semaphore("mock signal failure".into()));
        }
        self.requests.lock().push(request.clone());
        Ok(())
    }
}
