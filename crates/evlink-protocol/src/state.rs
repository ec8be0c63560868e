//! Cached controller state and supervisory configuration.
//!
//! The MCU pushes telemetry and faults continuously, so accessor methods
//! return cached values with zero latency. [`ControllerState`] is updated
//! only by the link's handlers (which run on the transport loop's task);
//! external readers take cloned snapshots and must treat them as
//! slightly stale.

use std::collections::HashMap;
use std::time::Duration;

use evlink_core::message::Value;

/// Name of the locally derived over-temperature fault.
pub const FAULT_OVERHEAT: &str = "OVERHEAT";
/// Name of the locally derived low state-of-charge fault.
pub const FAULT_LOW_BATTERY: &str = "LOW_BATTERY";

/// Mutable aggregate of everything known about the MCU.
#[derive(Debug, Clone, Default)]
pub struct ControllerState {
    /// Merged telemetry, last value per key winning.
    pub telemetry: HashMap<String, Value>,
    /// Active fault names in insertion order, no duplicates. Faults are
    /// latched: they leave this set only via an explicit reset.
    pub faults: Vec<String>,
    /// True once any telemetry has arrived.
    pub connected: bool,
}

impl ControllerState {
    /// Add `fault` if not already present.
    ///
    /// Returns `true` if the fault was newly added. Idempotent:
    /// re-crossing a threshold while the fault is still latched does
    /// not duplicate it.
    pub fn add_fault(&mut self, fault: &str) -> bool {
        if self.faults.iter().any(|f| f == fault) {
            return false;
        }
        self.faults.push(fault.to_string());
        true
    }

    /// Drop all latched faults (after a confirmed reset command).
    pub fn clear_faults(&mut self) {
        self.faults.clear();
    }
}

/// Supervisory configuration: safety thresholds and link timing.
///
/// Supplied at construction and adjustable afterwards via
/// [`Controller::update_config`](crate::controller::Controller::update_config).
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Temperature (degrees C) above which [`FAULT_OVERHEAT`] latches.
    pub overheat_threshold: f64,
    /// State of charge (percent) below which [`FAULT_LOW_BATTERY`] latches.
    pub low_battery_threshold: f64,
    /// Whether an explicit MCU fault report triggers an automatic
    /// emergency stop.
    pub estop_on_fault: bool,
    /// Configured hard current ceiling (amps); updated only after the
    /// MCU confirms a `SET_MAX_CURRENT`.
    pub max_current: f64,
    /// Configured soft current limit (amps); updated only after the MCU
    /// confirms a `SET_CURRENT_LIMIT`.
    pub current_limit: f64,
    /// Interval between periodic `GET_TELEM` polls.
    pub telemetry_interval: Duration,
    /// Per-command acknowledgement wait.
    pub command_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            overheat_threshold: 80.0,
            low_battery_threshold: 15.0,
            estop_on_fault: true,
            max_current: 50.0,
            current_limit: 50.0,
            telemetry_interval: Duration::from_millis(500),
            command_timeout: Duration::from_millis(500),
        }
    }
}

/// A point-in-time snapshot of controller state and configuration.
#[derive(Debug, Clone)]
pub struct Status {
    pub connected: bool,
    pub faults: Vec<String>,
    pub telemetry: HashMap<String, Value>,
    pub config: ControllerConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_fault_is_idempotent() {
        let mut state = ControllerState::default();
        assert!(state.add_fault(FAULT_OVERHEAT));
        assert!(!state.add_fault(FAULT_OVERHEAT));
        assert_eq!(state.faults, vec![FAULT_OVERHEAT]);
    }

    #[test]
    fn faults_keep_insertion_order() {
        let mut state = ControllerState::default();
        state.add_fault("OVERCURRENT");
        state.add_fault(FAULT_OVERHEAT);
        state.add_fault("OVERCURRENT");
        assert_eq!(state.faults, vec!["OVERCURRENT", FAULT_OVERHEAT]);
    }

    #[test]
    fn clear_faults_empties_the_set() {
        let mut state = ControllerState::default();
        state.add_fault(FAULT_LOW_BATTERY);
        state.clear_faults();
        assert!(state.faults.is_empty());
    }

    #[test]
    fn config_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.overheat_threshold, 80.0);
        assert_eq!(config.low_battery_threshold, 15.0);
        assert!(config.estop_on_fault);
        assert_eq!(config.telemetry_interval, Duration::from_millis(500));
    }
}
