//! Command/acknowledgement coordination.
//!
//! [`Commander`] sends a command frame exactly once and waits, bounded,
//! for an acknowledgement that references the command kind. It holds its
//! own inbox cursor, so waiting never consumes messages from other
//! subscribers.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use evlink_core::error::Result;
use evlink_core::kind;
use evlink_core::message::{Message, Payload, Request, Value};

use crate::link::Link;

/// Sends commands over a [`Link`] and correlates acknowledgements.
pub struct Commander {
    link: Arc<Link>,
}

impl Commander {
    pub fn new(link: Arc<Link>) -> Self {
        Commander { link }
    }

    /// Fire-and-forget transmit (telemetry polls, emergency stop).
    pub async fn send(&self, req: &Request) -> Result<()> {
        self.link.send_request(req).await
    }

    /// Send `req` once and wait up to `timeout` for the MCU's verdict.
    ///
    /// Returns `Ok(true)` only when an `ACK` referencing `req.kind`
    /// arrives before the deadline. A matching `NACK` is logged with its
    /// reason and yields `Ok(false)` immediately; a timeout also yields
    /// `Ok(false)` -- the boolean does not distinguish the two. There is
    /// no retransmission: at most one frame goes out per call.
    pub async fn send_and_confirm(
        &self,
        req: &Request,
        timeout: Duration,
    ) -> Result<bool> {
        // Subscribe before sending so a fast acknowledgement cannot slip
        // past the cursor.
        let mut inbox = self.link.inbox();
        self.link.send_request(req).await?;

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!(command = %req.kind, "acknowledgement wait timed out");
                return Ok(false);
            }

            let msg = match inbox.poll(remaining).await {
                Some(msg) => msg,
                None => {
                    debug!(command = %req.kind, "acknowledgement wait timed out");
                    return Ok(false);
                }
            };

            if acknowledges(&msg, &req.kind) {
                debug!(command = %req.kind, "command acknowledged");
                return Ok(true);
            }
            if rejects(&msg, &req.kind) {
                let reason = msg
                    .payload
                    .get("REASON")
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "UNKNOWN".into());
                warn!(command = %req.kind, reason = %reason, "command rejected by MCU");
                return Ok(false);
            }
            // Unrelated traffic (telemetry, other acks); skip it. Our
            // cursor is private, so nobody else loses this message.
        }
    }
}

/// Does this `ACK` reference `command`?
///
/// The MCU may name the command either as a bare presence key
/// (`<ACK:SET_CURRENT_LIMIT>`) or as an explicit pair
/// (`<ACK:ACK=SET_CURRENT_LIMIT>`).
fn acknowledges(msg: &Message, command: &str) -> bool {
    if msg.kind != kind::ACK {
        return false;
    }
    msg.payload.contains(command) || names_command(&msg.payload, kind::ACK, command)
}

/// Does this `NACK` reference `command`?
fn rejects(msg: &Message, command: &str) -> bool {
    if msg.kind != kind::NACK {
        return false;
    }
    msg.payload.contains(command) || names_command(&msg.payload, "CMD", command)
}

fn names_command(payload: &Payload, key: &str, command: &str) -> bool {
    matches!(payload.get(key), Some(Value::Text(s)) if s == command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Router;
    use crate::link::LinkOptions;
    use evlink_test_harness::MockTransport;

    fn commander() -> (Commander, evlink_test_harness::MockHandle) {
        let (transport, handle) = MockTransport::new();
        let link = Link::start(Box::new(transport), Router::new(), LinkOptions::default());
        (Commander::new(Arc::new(link)), handle)
    }

    #[test]
    fn ack_matching_by_explicit_pair() {
        let mut payload = Payload::new();
        payload.push("ACK", Value::Text("SET_MAX_CURRENT".into()));
        let msg = Message::new(kind::ACK, payload);
        assert!(acknowledges(&msg, "SET_MAX_CURRENT"));
        assert!(!acknowledges(&msg, "SET_CURRENT_LIMIT"));
    }

    #[test]
    fn ack_matching_by_presence_key() {
        let mut payload = Payload::new();
        payload.push("RESET_FAULT", Value::Flag);
        let msg = Message::new(kind::ACK, payload);
        assert!(acknowledges(&msg, "RESET_FAULT"));
    }

    #[test]
    fn non_ack_kind_never_acknowledges() {
        let mut payload = Payload::new();
        payload.push("ACK", Value::Text("ESTOP".into()));
        let msg = Message::new(kind::DATA, payload);
        assert!(!acknowledges(&msg, "ESTOP"));
    }

    #[tokio::test]
    async fn confirm_succeeds_on_matching_ack() {
        let (commander, handle) = commander();

        let waiter = {
            let req = Request::new(kind::SET_MAX_CURRENT).with("LIMIT", 40i64);
            tokio::spawn(async move {
                commander
                    .send_and_confirm(&req, Duration::from_millis(500))
                    .await
            })
        };

        // Give the command time to hit the wire, then acknowledge it.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.sent_text().contains("<SET_MAX_CURRENT:LIMIT=40>"));
        handle.push(b"<ACK:ACK=SET_MAX_CURRENT>");

        assert!(waiter.await.unwrap().unwrap());
    }

    #[tokio::test]
    async fn confirm_skips_interleaved_telemetry() {
        let (commander, handle) = commander();

        let waiter = {
            let req = Request::new(kind::SET_CURRENT_LIMIT).with("LIMIT", 40i64);
            tokio::spawn(async move {
                commander
                    .send_and_confirm(&req, Duration::from_millis(500))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.push(b"<DATA:TEMP=30.0;RPM=1200><ACK:ACK=SET_CURRENT_LIMIT>");

        assert!(waiter.await.unwrap().unwrap());
    }

    #[tokio::test]
    async fn confirm_times_out_without_ack() {
        let (commander, _handle) = commander();

        let req = Request::new(kind::SET_CURRENT_LIMIT).with("LIMIT", 40i64);
        let started = std::time::Instant::now();
        let ok = commander
            .send_and_confirm(&req, Duration::from_millis(200))
            .await
            .unwrap();

        assert!(!ok);
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn confirm_fails_fast_on_nack() {
        let (commander, handle) = commander();

        let waiter = {
            let req = Request::new(kind::SET_MAX_CURRENT).with("LIMIT", 999i64);
            tokio::spawn(async move {
                commander
                    .send_and_confirm(&req, Duration::from_secs(5))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.push(b"<NACK:CMD=SET_MAX_CURRENT;REASON=OUT_OF_RANGE>");

        let started = std::time::Instant::now();
        assert!(!waiter.await.unwrap().unwrap());
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
