//! The transport loop: a background task that owns the serial link.
//!
//! [`Link::start`] spawns one task that exclusively owns the
//! [`Transport`]. The task multiplexes two duties with a biased select:
//! outbound frames arriving on an mpsc channel take priority, and
//! otherwise the task performs a deadline read, appends whatever arrived
//! to the receive buffer, drains complete frames, decodes them, and
//! publishes each decoded message to the [`Router`] handlers and the
//! broadcast inbox.
//!
//! Transport read errors are logged and retried after a short backoff;
//! only an explicit [`Link::stop`] (or dropping every sender) terminates
//! the task. On shutdown any bytes still buffered are discarded without
//! being decoded.

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use evlink_core::error::{Error, Result};
use evlink_core::message::{Message, Request};
use evlink_core::transport::Transport;

use crate::bus::{Inbox, Router};
use crate::codec;

/// Capacity of the outbound frame channel.
const TX_CHANNEL_CAPACITY: usize = 16;

/// Read chunk size per transport receive call.
const READ_CHUNK: usize = 256;

/// Largest number of undecoded bytes kept between reads. No legal frame
/// comes anywhere near this, so an orphan `<` that outgrows it is noise
/// and the buffer is cleared to resynchronize.
const MAX_RX_BUFFER: usize = 1024;

/// Tuning knobs for the transport loop.
#[derive(Debug, Clone)]
pub struct LinkOptions {
    /// Deadline for each idle read; doubles as the no-data backoff.
    pub read_timeout: Duration,
    /// Pause after a transport read error before retrying.
    pub error_backoff: Duration,
    /// Bounded inbox capacity; lagging subscribers lose oldest first.
    pub inbox_capacity: usize,
    /// Bounded wait when joining the loop task during [`Link::stop`].
    pub join_timeout: Duration,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(50),
            error_backoff: Duration::from_millis(100),
            inbox_capacity: 256,
            join_timeout: Duration::from_secs(1),
        }
    }
}

/// A request sent from callers to the loop task.
enum TxRequest {
    /// Transmit one encoded frame; `done` reports the write result.
    Frame {
        bytes: Vec<u8>,
        done: Option<oneshot::Sender<Result<()>>>,
    },
    /// Stop the loop and close the transport.
    Shutdown,
}

/// Handle to the running transport loop.
///
/// Cloned access is not needed: the handle itself is `Sync` and all
/// methods take `&self`, so it is typically wrapped in an `Arc` and
/// shared between the controller, the commander, and the poll task.
pub struct Link {
    cmd_tx: mpsc::Sender<TxRequest>,
    inbox_tx: broadcast::Sender<Message>,
    task: Mutex<Option<JoinHandle<()>>>,
    join_timeout: Duration,
}

impl Link {
    /// Spawn the transport loop over `transport`.
    ///
    /// `router` holds the per-kind handlers; it moves into the loop task
    /// and its handlers run there.
    pub fn start(transport: Box<dyn Transport>, router: Router, options: LinkOptions) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(TX_CHANNEL_CAPACITY);
        let (inbox_tx, _) = broadcast::channel(options.inbox_capacity);
        let join_timeout = options.join_timeout;

        let task = tokio::spawn(run_loop(
            transport,
            router,
            cmd_rx,
            inbox_tx.clone(),
            options,
        ));

        Link {
            cmd_tx,
            inbox_tx,
            task: Mutex::new(Some(task)),
            join_timeout,
        }
    }

    /// A fresh subscriber cursor on the message inbox.
    pub fn inbox(&self) -> Inbox {
        Inbox::new(self.inbox_tx.subscribe())
    }

    /// Encode and transmit one request, waiting for the write to finish.
    ///
    /// This confirms only that the bytes were written, not that the MCU
    /// acknowledged anything; see
    /// [`Commander::send_and_confirm`](crate::command::Commander::send_and_confirm)
    /// for the latter.
    pub async fn send_request(&self, req: &Request) -> Result<()> {
        let bytes = codec::encode(req);
        let (done_tx, done_rx) = oneshot::channel();
        self.cmd_tx
            .send(TxRequest::Frame {
                bytes,
                done: Some(done_tx),
            })
            .await
            .map_err(|_| Error::NotConnected)?;
        done_rx.await.map_err(|_| Error::NotConnected)?
    }

    /// Stop the loop cooperatively and close the transport.
    ///
    /// Joins the task with a bounded wait; a task that fails to exit in
    /// time is aborted. Frames still buffered but not yet decoded are
    /// silently discarded.
    pub async fn stop(&self) -> Result<()> {
        // If the task already exited this send just fails, which is fine.
        let _ = self.cmd_tx.send(TxRequest::Shutdown).await;

        let task = self.task.lock().expect("link task mutex poisoned").take();
        if let Some(mut task) = task {
            match tokio::time::timeout(self.join_timeout, &mut task).await {
                Ok(_) => debug!("transport loop joined"),
                Err(_) => {
                    warn!("transport loop did not stop in time, aborting");
                    task.abort();
                }
            }
        }
        Ok(())
    }
}

/// The transport loop body.
async fn run_loop(
    mut transport: Box<dyn Transport>,
    mut router: Router,
    mut cmd_rx: mpsc::Receiver<TxRequest>,
    inbox_tx: broadcast::Sender<Message>,
    options: LinkOptions,
) {
    let mut rx_buf = String::new();
    let mut chunk = [0u8; READ_CHUNK];

    info!("transport loop started");
    loop {
        tokio::select! {
            biased;

            // Priority: outbound frames.
            req = cmd_rx.recv() => {
                match req {
                    Some(TxRequest::Frame { bytes, done }) => {
                        let result = transport.send(&bytes).await;
                        if let Err(e) = &result {
                            warn!(error = %e, "frame transmit failed");
                        }
                        if let Some(done) = done {
                            let _ = done.send(result);
                        }
                    }
                    Some(TxRequest::Shutdown) | None => {
                        debug!("stop requested, leaving transport loop");
                        break;
                    }
                }
            }

            // Idle: deadline read from the MCU.
            res = transport.receive(&mut chunk, options.read_timeout) => {
                match res {
                    Ok(n) if n > 0 => {
                        rx_buf.push_str(&String::from_utf8_lossy(&chunk[..n]));
                        for raw in codec::drain_frames(&mut rx_buf) {
                            match codec::decode(&raw) {
                                Ok(msg) => {
                                    publish(&mut transport, &mut router, &inbox_tx, msg).await;
                                }
                                Err(e) => {
                                    debug!(frame = %raw, error = %e, "dropping malformed frame");
                                }
                            }
                        }
                        if rx_buf.len() > MAX_RX_BUFFER {
                            warn!(
                                discarded = rx_buf.len(),
                                "unterminated frame overran the receive buffer, resyncing"
                            );
                            rx_buf.clear();
                        }
                    }
                    Ok(_) | Err(Error::Timeout) => {
                        // Nothing to read; the deadline was the backoff.
                    }
                    Err(e) => {
                        warn!(error = %e, "transport read error, backing off");
                        tokio::time::sleep(options.error_backoff).await;
                    }
                }
            }
        }
    }

    if let Err(e) = transport.close().await {
        warn!(error = %e, "error closing transport");
    }
    info!("transport loop stopped");
}

/// Deliver one decoded message to its handler and the inbox.
///
/// A handler's follow-up request is transmitted before this returns, so
/// it precedes the dispatch of any later message.
async fn publish(
    transport: &mut Box<dyn Transport>,
    router: &mut Router,
    inbox_tx: &broadcast::Sender<Message>,
    msg: Message,
) {
    if let Some(follow_up) = router.dispatch(&msg) {
        let bytes = codec::encode(&follow_up);
        debug!(kind = %follow_up.kind, "transmitting handler follow-up");
        if let Err(e) = transport.send(&bytes).await {
            warn!(kind = %follow_up.kind, error = %e, "follow-up transmit failed");
        }
    }
    // No receivers is fine; the inbox is best-effort fan-out.
    let _ = inbox_tx.send(msg);
}
