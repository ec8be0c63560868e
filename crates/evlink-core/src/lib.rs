//! evlink-core: Core traits, message model, and error types for evlink.
//!
//! This crate defines the link-agnostic abstractions the protocol engine
//! and transports are built on. Applications normally depend on the
//! `evlink` facade crate instead.
//!
//! # Key types
//!
//! - [`Transport`] -- byte-level communication channel to the MCU
//! - [`Message`] / [`Request`] -- decoded inbound frames and outbound commands
//! - [`Payload`] / [`Value`] -- typed key/value frame parameters
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod message;
pub mod transport;

pub use error::{Error, Result};
pub use message::{kind, Message, Payload, Request, Value};
pub use transport::Transport;
