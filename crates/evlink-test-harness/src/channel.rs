//! In-process loopback pair for end-to-end tests.
//!
//! [`channel_pair`] returns two connected [`Transport`]s: bytes sent on
//! one side arrive at the other, in order. Wiring a controller to a
//! simulator over a pair exercises the full engine without a serial
//! port.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

use evlink_core::error::{Error, Result};
use evlink_core::transport::Transport;

/// One end of an in-process byte pipe.
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    /// Bytes from a received chunk that did not fit the caller's buffer.
    pending: Vec<u8>,
    connected: bool,
}

/// Create two connected transports; what one sends, the other receives.
pub fn channel_pair() -> (ChannelTransport, ChannelTransport) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    (
        ChannelTransport {
            tx: a_tx,
            rx: a_rx,
            pending: Vec::new(),
            connected: true,
        },
        ChannelTransport {
            tx: b_tx,
            rx: b_rx,
            pending: Vec::new(),
            connected: true,
        },
    )
}

impl ChannelTransport {
    fn serve(&mut self, chunk: Vec<u8>, buf: &mut [u8]) -> usize {
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            self.pending = chunk[n..].to_vec();
        }
        n
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        self.tx
            .send(data.to_vec())
            .map_err(|_| Error::ConnectionLost)
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        if !self.pending.is_empty() {
            let chunk = std::mem::take(&mut self.pending);
            return Ok(self.serve(chunk, buf));
        }
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(chunk)) => Ok(self.serve(chunk, buf)),
            Ok(None) => Err(Error::ConnectionLost),
            Err(_) => Err(Error::Timeout),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bytes_cross_the_pair_both_ways() {
        let (mut a, mut b) = channel_pair();
        a.send(b"<GET_TELEM>").await.unwrap();
        b.send(b"<DATA:RPM=0>").await.unwrap();

        let mut buf = [0u8; 64];
        let n = b.receive(&mut buf, Duration::from_millis(100)).await.unwrap();
        assert_eq!(&buf[..n], b"<GET_TELEM>");
        let n = a.receive(&mut buf, Duration::from_millis(100)).await.unwrap();
        assert_eq!(&buf[..n], b"<DATA:RPM=0>");
    }

    #[tokio::test]
    async fn small_buffer_preserves_byte_order() {
        let (mut a, mut b) = channel_pair();
        a.send(b"<ACK:ACK=RESET_FAULT>").await.unwrap();

        let mut out = Vec::new();
        let mut buf = [0u8; 5];
        loop {
            match b.receive(&mut buf, Duration::from_millis(20)).await {
                Ok(n) => out.extend_from_slice(&buf[..n]),
                Err(Error::Timeout) => break,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(out, b"<ACK:ACK=RESET_FAULT>");
    }

    #[tokio::test]
    async fn dropped_peer_reports_connection_lost() {
        let (mut a, b) = channel_pair();
        drop(b);

        let mut buf = [0u8; 8];
        assert!(matches!(
            a.receive(&mut buf, Duration::from_millis(50)).await.unwrap_err(),
            Error::ConnectionLost
        ));
    }
}
