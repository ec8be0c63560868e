//! Mock transport for deterministic testing of the protocol engine.
//!
//! [`MockTransport`] implements the [`Transport`] trait against
//! in-memory queues. Unlike a strict request/response mock, the MCU
//! protocol is full of unsolicited traffic (telemetry pushes, fault
//! notifications), so the mock is driven from the outside: a
//! [`MockHandle`] injects inbound bytes at any point while the engine
//! is running and inspects everything the engine transmitted.
//!
//! # Example
//!
//! ```
//! use evlink_test_harness::MockTransport;
//!
//! let (transport, handle) = MockTransport::new();
//! // Hand `transport` to the engine, then drive it:
//! handle.push(b"<DATA:RPM=1200;TEMP=42.5>");
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use evlink_core::error::{Error, Result};
use evlink_core::transport::Transport;

/// How often `receive()` re-checks the inbound queue while waiting.
const POLL_INTERVAL: Duration = Duration::from_millis(2);

#[derive(Debug, Default)]
struct Shared {
    /// Inbound chunks waiting to be served to `receive()`, in push order.
    inbound: VecDeque<Vec<u8>>,
    /// Log of all bytes sent through this transport, one entry per `send()`.
    sent: Vec<Vec<u8>>,
    disconnected: bool,
}

/// A mock [`Transport`] for testing the protocol engine without hardware.
///
/// Created together with its [`MockHandle`]; the transport side is moved
/// into the engine while the handle stays with the test.
#[derive(Debug)]
pub struct MockTransport {
    shared: Arc<Mutex<Shared>>,
    connected: bool,
}

/// Test-side handle to a [`MockTransport`].
#[derive(Debug, Clone)]
pub struct MockHandle {
    shared: Arc<Mutex<Shared>>,
}

impl MockTransport {
    /// Create a connected mock transport and its driving handle.
    pub fn new() -> (MockTransport, MockHandle) {
        let shared = Arc::new(Mutex::new(Shared::default()));
        (
            MockTransport {
                shared: Arc::clone(&shared),
                connected: true,
            },
            MockHandle { shared },
        )
    }
}

impl MockHandle {
    /// Queue inbound bytes for the engine to receive.
    ///
    /// Each call is one chunk; `receive()` serves chunks in push order
    /// and splits them when the caller's buffer is smaller.
    pub fn push(&self, data: &[u8]) {
        self.shared
            .lock()
            .expect("mock mutex poisoned")
            .inbound
            .push_back(data.to_vec());
    }

    /// Everything sent through the transport, one entry per `send()`.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.shared.lock().expect("mock mutex poisoned").sent.clone()
    }

    /// All sent bytes concatenated and lossily decoded, for frame
    /// assertions like `sent_text().contains("<ESTOP>")`.
    pub fn sent_text(&self) -> String {
        let shared = self.shared.lock().expect("mock mutex poisoned");
        let mut out = String::new();
        for chunk in &shared.sent {
            out.push_str(&String::from_utf8_lossy(chunk));
        }
        out
    }

    /// Simulate the far end going away: subsequent transport calls fail
    /// with [`Error::ConnectionLost`].
    pub fn disconnect(&self) {
        self.shared.lock().expect("mock mutex poisoned").disconnected = true;
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        let mut shared = self.shared.lock().expect("mock mutex poisoned");
        if shared.disconnected {
            return Err(Error::ConnectionLost);
        }
        shared.sent.push(data.to_vec());
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut shared = self.shared.lock().expect("mock mutex poisoned");
                if shared.disconnected {
                    return Err(Error::ConnectionLost);
                }
                if let Some(chunk) = shared.inbound.pop_front() {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        // Serve the remainder on the next call.
                        shared.inbound.push_front(chunk[n..].to_vec());
                    }
                    return Ok(n);
                }
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
