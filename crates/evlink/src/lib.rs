//! # evlink -- Supervisory Control for an EV Motor-Control Unit
//!
//! `evlink` is an asynchronous Rust library for commanding and
//! monitoring a motor-control unit (MCU) over a serial link. The MCU
//! speaks a delimiter-framed text protocol, `<KIND:KEY=VAL;KEY=VAL>`,
//! and the library handles framing, acknowledgement tracking, telemetry
//! dispatch, and safety monitoring so application code works with typed
//! state snapshots and confirmed commands.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! evlink = "0.1"
//! tokio = { version = "1", features = ["full"] }
//! ```
//!
//! Connect over serial and drive the controller:
//!
//! ```no_run
//! use evlink::{Controller, ControllerConfig, SerialTransport};
//!
//! #[tokio::main]
//! async fn main() -> evlink::Result<()> {
//!     let transport = SerialTransport::open("/dev/ttyUSB0", 115_200).await?;
//!     let controller = Controller::start(Box::new(transport), ControllerConfig::default());
//!
//!     if controller.set_current_limit(40.0).await? {
//!         println!("limit accepted");
//!     }
//!     println!("telemetry: {:?}", controller.telemetry());
//!
//!     controller.shutdown().await
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized as a workspace of focused crates:
//!
//! | Crate                 | Purpose                                       |
//! |-----------------------|-----------------------------------------------|
//! | `evlink-core`         | [`Transport`] trait, message types, errors    |
//! | `evlink-protocol`     | Codec, transport loop, commander, controller  |
//! | `evlink-transport`    | Serial transport implementation               |
//! | `evlink-test-harness` | Mock and loopback transports for tests        |
//! | `evlink-sim`          | In-process MCU simulator                      |
//! | **`evlink`**          | This facade crate -- re-exports everything    |
//!
//! Everything above the [`Transport`] trait is hardware-agnostic; tests
//! and the simulator run the whole stack in process.
//!
//! ## Incoming Traffic
//!
//! The MCU pushes telemetry (`DATA`) and fault reports (`FAULT`)
//! unsolicited. The controller merges telemetry into its state, checks
//! safety thresholds, and on an MCU fault transmits an emergency stop
//! before any other traffic goes out. Raw access to the dispatched
//! message stream is available through [`Controller::link`] and
//! [`Link::inbox`](protocol::Link::inbox).

pub use evlink_core::*;

/// Protocol engine: codec, transport loop, commander, controller.
pub mod protocol {
    pub use evlink_protocol::*;
}

/// Hardware transports (serial).
pub mod transport {
    pub use evlink_transport::*;
}

pub use evlink_protocol::{Commander, Controller, ControllerConfig, Link, LinkOptions, Status};
pub use evlink_transport::SerialTransport;
