//! Safety monitoring over decoded telemetry and fault traffic.
//!
//! The [`SafetyMonitor`] is registered as the handler for `DATA` and
//! `FAULT` messages. Telemetry is merged into controller state and
//! checked against the configured thresholds; explicit MCU fault reports
//! latch a fault and, when configured, request an immediate emergency
//! stop as the handler's follow-up frame.
//!
//! Faults latch: a reading returning to its normal range never clears a
//! fault. Clearing requires a confirmed `RESET_FAULT` command.

use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use evlink_core::kind;
use evlink_core::message::{Message, Request, Value};

use crate::state::{ControllerConfig, ControllerState, FAULT_LOW_BATTERY, FAULT_OVERHEAT};

/// Evaluates incoming telemetry and fault reports against thresholds.
///
/// Shared between the `DATA` and `FAULT` handlers; all state access goes
/// through the controller's mutexes.
pub struct SafetyMonitor {
    state: Arc<Mutex<ControllerState>>,
    config: Arc<Mutex<ControllerConfig>>,
}

impl SafetyMonitor {
    pub fn new(
        state: Arc<Mutex<ControllerState>>,
        config: Arc<Mutex<ControllerConfig>>,
    ) -> Self {
        SafetyMonitor { state, config }
    }

    /// Handle a telemetry (`DATA`) message.
    ///
    /// Merges the payload into the telemetry map (last value wins),
    /// marks the link connected, and latches threshold faults.
    pub fn on_telemetry(&self, msg: &Message) {
        let (overheat_at, low_battery_at) = {
            let config = self.config.lock().expect("config mutex poisoned");
            (config.overheat_threshold, config.low_battery_threshold)
        };

        let mut state = self.state.lock().expect("state mutex poisoned");
        msg.payload.merge_into(&mut state.telemetry);
        state.connected = true;

        if let Some(temp) = state.telemetry.get("TEMP").and_then(Value::as_f64) {
            if temp > overheat_at && state.add_fault(FAULT_OVERHEAT) {
                warn!(temp, threshold = overheat_at, "temperature critical");
            }
        }
        if let Some(soc) = state.telemetry.get("SOC").and_then(Value::as_f64) {
            if soc < low_battery_at && state.add_fault(FAULT_LOW_BATTERY) {
                warn!(soc, threshold = low_battery_at, "battery low");
            }
        }
    }

    /// Handle an explicit `FAULT` report from the MCU.
    ///
    /// Latches the named fault if new. When the fault is new and
    /// emergency-stop-on-fault is configured, returns an `ESTOP` request
    /// for the transport loop to transmit before dispatching anything
    /// else. The stop is fire-and-forget: no acknowledgement is awaited
    /// and the monitor's behavior does not depend on one.
    pub fn on_fault(&self, msg: &Message) -> Option<Request> {
        let fault = msg
            .payload
            .get("FAULT")
            .and_then(Value::as_str)
            .unwrap_or("UNKNOWN")
            .to_string();

        let newly_added = {
            let mut state = self.state.lock().expect("state mutex poisoned");
            state.add_fault(&fault)
        };
        if !newly_added {
            return None;
        }
        warn!(fault = %fault, "fault reported by MCU");

        let estop_on_fault = self
            .config
            .lock()
            .expect("config mutex poisoned")
            .estop_on_fault;
        if estop_on_fault {
            info!(fault = %fault, "auto emergency stop triggered");
            return Some(Request::new(kind::ESTOP));
        }
        None
    }

    /// Handle a `NACK`: log the rejected command and reason.
    pub fn on_nack(&self, msg: &Message) {
        let cmd = msg
            .payload
            .get("CMD")
            .map(|v| v.to_string())
            .unwrap_or_else(|| "UNKNOWN".into());
        let reason = msg
            .payload
            .get("REASON")
            .map(|v| v.to_string())
            .unwrap_or_else(|| "UNKNOWN".into());
        warn!(command = %cmd, reason = %reason, "MCU rejected command");
    }
}
