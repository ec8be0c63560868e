//! Test transports for evlink.
//!
//! Two flavors:
//!
//! - [`MockTransport`]: externally driven via a [`MockHandle`]; the
//!   test injects inbound chunks and inspects everything the engine
//!   transmitted. For unit tests of the engine itself.
//! - [`channel_pair`]: two connected loopback transports, for wiring a
//!   controller to a simulator end to end.

pub mod channel;
pub mod mock;

pub use channel::{channel_pair, ChannelTransport};
pub use mock::{MockHandle, MockTransport};
