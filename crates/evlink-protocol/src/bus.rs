//! Dispatch bus: per-kind handlers and the shared inbox.
//!
//! Every decoded message is delivered twice: to at most one registered
//! handler whose key equals the message kind, and to the broadcast inbox
//! that synchronous waiters poll. Handlers run on the transport loop's
//! task; the inbox gives each subscriber its own cursor, so a caller
//! waiting for an acknowledgement never consumes messages out from under
//! other readers.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use evlink_core::error::Result;
use evlink_core::message::{Message, Request};

/// A per-kind message handler.
///
/// Runs synchronously on the transport loop's task. A handler may return
/// a follow-up [`Request`]; the loop transmits it before dispatching the
/// next message (this is how the safety monitor's emergency stop goes
/// out as part of fault handling). Errors are logged and isolated; they
/// never reach the loop.
pub type Handler = Box<dyn FnMut(&Message) -> Result<Option<Request>> + Send>;

/// Registry mapping a message kind to at most one handler.
///
/// Registration is last-wins: subscribing a second handler for the same
/// kind replaces the first. There is no per-kind fan-out; consumers that
/// need every message use the inbox instead.
#[derive(Default)]
pub struct Router {
    handlers: HashMap<String, Handler>,
}

impl Router {
    pub fn new() -> Self {
        Router {
            handlers: HashMap::new(),
        }
    }

    /// Register (or replace) the handler for `kind`.
    pub fn subscribe(&mut self, kind: impl Into<String>, handler: Handler) {
        let kind = kind.into();
        if self.handlers.insert(kind.clone(), handler).is_some() {
            debug!(kind, "replacing existing handler");
        }
    }

    /// Dispatch `msg` to its handler, if one is registered.
    ///
    /// Handler failures are logged here and do not propagate. Returns
    /// the handler's follow-up request, if any.
    pub(crate) fn dispatch(&mut self, msg: &Message) -> Option<Request> {
        let handler = match self.handlers.get_mut(&msg.kind) {
            Some(h) => h,
            None => {
                debug!(kind = %msg.kind, "no handler registered, inbox only");
                return None;
            }
        };
        match handler(msg) {
            Ok(follow_up) => follow_up,
            Err(e) => {
                warn!(kind = %msg.kind, error = %e, "handler failed, continuing");
                None
            }
        }
    }
}

/// A subscriber cursor on the shared message inbox.
///
/// Backed by a bounded broadcast channel: if a subscriber falls behind,
/// the oldest messages are dropped for that subscriber only.
pub struct Inbox {
    rx: broadcast::Receiver<Message>,
}

impl Inbox {
    pub(crate) fn new(rx: broadcast::Receiver<Message>) -> Self {
        Inbox { rx }
    }

    /// Wait up to `timeout` for the next message.
    ///
    /// Returns `None` on timeout or once the link has shut down. A lag
    /// (messages dropped for this subscriber) is logged and skipped.
    pub async fn poll(&mut self, timeout: Duration) -> Option<Message> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let recv = tokio::time::timeout_at(deadline, self.rx.recv());
            match recv.await {
                Ok(Ok(msg)) => return Some(msg),
                Ok(Err(broadcast::error::RecvError::Lagged(n))) => {
                    warn!(skipped = n, "inbox subscriber lagged, messages dropped");
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => return None,
                Err(_) => return None,
            }
        }
    }
}
