//! Wire protocol and supervisory engine for the MCU link.
//!
//! The MCU speaks a delimiter-framed text protocol: every frame is
//! `<KIND:KEY=VAL;KEY=VAL>`, with the payload section optional. This
//! crate provides the codec for that framing, the background transport
//! loop that turns a byte stream into dispatched [`Message`]s, the
//! acknowledgement coordinator for confirmed commands, and the
//! [`Controller`] that ties it all together with safety monitoring.
//!
//! Layering, bottom up:
//!
//! | Module       | Role                                             |
//! |--------------|--------------------------------------------------|
//! | [`codec`]    | Frame extraction, decode, encode                 |
//! | [`bus`]      | Kind-keyed handlers and broadcast inbox          |
//! | [`link`]     | Owns the transport; read/write multiplexing      |
//! | [`command`]  | Confirmed sends (`ACK`/`NACK`/timeout)           |
//! | [`state`]    | Shared telemetry, fault, and config state        |
//! | [`monitor`]  | Threshold checks and fault-triggered stop        |
//! | [`controller`]| Public operations over all of the above         |
//!
//! [`Message`]: evlink_core::message::Message

pub mod bus;
pub mod codec;
pub mod command;
pub mod controller;
pub mod link;
pub mod monitor;
pub mod state;

pub use bus::{Handler, Inbox, Router};
pub use command::Commander;
pub use controller::Controller;
pub use link::{Link, LinkOptions};
pub use monitor::SafetyMonitor;
pub use state::{ControllerConfig, ControllerState, Status, FAULT_LOW_BATTERY, FAULT_OVERHEAT};
