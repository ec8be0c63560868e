//! Hardware transports for evlink.
//!
//! Currently serial only; the [`Transport`] trait in `evlink-core`
//! keeps the protocol engine independent of the physical link.
//!
//! [`Transport`]: evlink_core::transport::Transport

pub mod serial;

pub use serial::SerialTransport;
