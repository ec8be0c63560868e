//! Transport trait for MCU communication.
//!
//! The [`Transport`] trait abstracts over the byte-level link to the
//! motor-control unit. The production implementation is a serial port
//! (`evlink-transport`); tests substitute in-memory transports from
//! `evlink-test-harness`. The protocol engine operates only on this
//! trait, never on a concrete port type.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level transport to the MCU.
///
/// Implementations handle the physical layer only. Framing, decoding,
/// and dispatch are the protocol engine's concern.
#[async_trait]
pub trait Transport: Send {
    /// Send raw bytes to the MCU.
    ///
    /// Blocks until all bytes have been handed to the underlying link
    /// (serial TX buffer, in-memory channel).
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the MCU into the provided buffer.
    ///
    /// Returns the number of bytes actually read. Waits up to `timeout`
    /// for data to arrive and returns
    /// [`Error::Timeout`](crate::error::Error::Timeout) if none does.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport.
    ///
    /// Subsequent `send()` and `receive()` calls return
    /// [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}
