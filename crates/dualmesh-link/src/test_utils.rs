//! Test utilities for exercising links without radio hardware
//!
//! [`MockTransport`] is a scriptable [`Transport`]. The transport itself is
//! moved into a supervisor, so every knob lives on the paired
//! [`MockTransportControl`], which stays with the test.
//!
//! # Example
//!
//! ```rust,ignore
//! use dualmesh_link::test_utils::MockTransport;
//!
//! let (transport, control) = MockTransport::new("mock:net_a");
//! control.set_fail_connect(true);
//! // hand `transport` to a ConnectionSupervisor, then:
//! control.set_fail_connect(false);
//! control.push_frame(frame);
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::{LinkError, Result};
use crate::transport::Transport;

enum MockEvent {
    Frame(Bytes),
    Error,
}

#[derive(Debug, Default)]
struct MockState {
    connected: bool,
    fail_connect: bool,
    connect_delay: Option<Duration>,
    probe_fails: bool,
    fail_writes: bool,
    connect_count: usize,
    disconnect_count: usize,
    sent: Vec<Vec<u8>>,
}

/// Scriptable transport for unit and integration tests
pub struct MockTransport {
    name: String,
    state: Arc<Mutex<MockState>>,
    incoming: mpsc::UnboundedReceiver<MockEvent>,
}

/// Test-side handle controlling a [`MockTransport`]
#[derive(Clone)]
pub struct MockTransportControl {
    state: Arc<Mutex<MockState>>,
    incoming: mpsc::UnboundedSender<MockEvent>,
}

impl MockTransport {
    /// Create a transport and its control handle
    pub fn new(name: impl Into<String>) -> (Self, MockTransportControl) {
        let state = Arc::new(Mutex::new(MockState::default()));
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                name: name.into(),
                state: Arc::clone(&state),
                incoming: rx,
            },
            MockTransportControl {
                state,
                incoming: tx,
            },
        )
    }
}

impl MockTransportControl {
    /// Queue a frame payload as if the radio had sent it
    pub fn push_frame(&self, frame: impl Into<Bytes>) {
        let _ = self.incoming.send(MockEvent::Frame(frame.into()));
    }

    /// Make the next read fail and drop the connection
    pub fn inject_error(&self) {
        let _ = self.incoming.send(MockEvent::Error);
    }

    /// Frames written by the supervisor so far
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.state.lock().sent.clone()
    }

    /// Make connect attempts fail
    pub fn set_fail_connect(&self, fail: bool) {
        self.state.lock().fail_connect = fail;
    }

    /// Delay every connect attempt
    pub fn set_connect_delay(&self, delay: Option<Duration>) {
        self.state.lock().connect_delay = delay;
    }

    /// Make probes succeed or fail
    pub fn set_probe_ok(&self, ok: bool) {
        self.state.lock().probe_fails = !ok;
    }

    /// Make writes fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    /// Number of connect calls, successful or not
    pub fn connect_count(&self) -> usize {
        self.state.lock().connect_count
    }

    /// Number of disconnect calls
    pub fn disconnect_count(&self) -> usize {
        self.state.lock().disconnect_count
    }

    /// Whether the transport is currently connected
    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self) -> Result<()> {
        let delay = {
            let mut state = self.state.lock();
            state.connect_count += 1;
            if state.connected {
                return Ok(());
            }
            state.connect_delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        if state.fail_connect {
            return Err(LinkError::DialFailed {
                peer: self.name.clone(),
                reason: "simulated failure".to_string(),
            });
        }
        state.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.connected = false;
        state.disconnect_count += 1;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    async fn read_frame(&mut self) -> Result<Option<Bytes>> {
        if !self.is_connected() {
            return Err(LinkError::Disconnected);
        }
        match self.incoming.recv().await {
            Some(MockEvent::Frame(frame)) => Ok(Some(frame)),
            Some(MockEvent::Error) => {
                self.state.lock().connected = false;
                Err(LinkError::ReadError("simulated error".to_string()))
            }
            // Control dropped: behave like a silent radio
            None => std::future::pending().await,
        }
    }

    async fn write_frame(&mut self, payload: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(LinkError::Disconnected);
        }
        if state.fail_writes {
            return Err(LinkError::WriteError("simulated error".to_string()));
        }
        state.sent.push(payload.to_vec());
        Ok(())
    }

    async fn probe(&mut self) -> Result<()> {
        let state = self.state.lock();
        if !state.connected {
            return Err(LinkError::Disconnected);
        }
        if state.probe_fails {
            return Err(LinkError::ProbeFailed("simulated failure".to_string()));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("name", &self.name)
            .field("connected", &self.is_connected())
            .finish()
    }
}
