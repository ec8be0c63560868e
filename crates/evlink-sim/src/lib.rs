//! In-process MCU simulator.
//!
//! [`Simulator`] stands in for the motor-control firmware on the far
//! end of a [`Transport`]: it answers commands with `ACK`/`NACK`,
//! pushes periodic `DATA` telemetry, and raises `FAULT` frames when its
//! simulated drive crosses its own limits. Physics is a coarse
//! first-order model, enough to make temperatures climb under load and
//! batteries discharge over a bench session.
//!
//! Wire one end of a loopback pair (`evlink-test-harness`'s
//! `channel_pair`) into a simulator and the other into a controller for
//! a full in-process bench.
//!
//! [`Transport`]: evlink_core::transport::Transport

pub mod physics;
pub mod sim;

pub use physics::DriveState;
pub use sim::{SimOptions, Simulator};
