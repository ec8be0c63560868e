//! Error types for evlink.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport-layer and protocol-layer
//! failures are both captured here.

/// The error type for all evlink operations.
///
/// Variants cover the failure modes of a supervisory serial link to a
/// motor-control unit: physical transport failures, malformed frames,
/// timeouts, and lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (serial port open/read/write failure).
    #[error("transport error: {0}")]
    Transport(String),

    /// A malformed or undecodable frame.
    ///
    /// The offending frame is dropped; subsequent frames in the receive
    /// buffer are unaffected.
    #[error("parse error: {0}")]
    Parse(String),

    /// Timed out waiting for data or for an acknowledgement.
    #[error("timeout waiting for response")]
    Timeout,

    /// No connection to the MCU has been established, or the link task
    /// has already shut down.
    #[error("not connected")]
    NotConnected,

    /// The connection to the MCU was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
