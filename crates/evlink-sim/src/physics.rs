//! Drive model for the simulated MCU.
//!
//! First-order lag toward commanded setpoints, resistive heating,
//! ambient cooling, battery discharge, and voltage sag under load. The
//! constants are tuned for a 100 ms tick.

use rand::Rng;

pub const AMBIENT_TEMP: f64 = 25.0;
pub const NOMINAL_VOLTAGE: f64 = 48.0;

/// Temperature above which the simulated firmware latches `OVERTEMP`.
pub const OVERTEMP_LIMIT: f64 = 80.0;
/// State of charge below which the simulated firmware latches `LOW_BATTERY`.
pub const LOW_BATTERY_LIMIT: f64 = 10.0;

/// Simulated drive state, mirrored by telemetry frames.
#[derive(Debug, Clone)]
pub struct DriveState {
    /// Commanded speed, percent.
    pub speed: f64,
    /// Commanded torque, percent.
    pub torque: f64,
    pub rpm: f64,
    pub temperature: f64,
    pub current: f64,
    pub voltage: f64,
    /// Battery state of charge, percent.
    pub soc: f64,
    /// Hard current ceiling; exceeding it latches `OVERCURRENT`.
    pub max_current: f64,
    /// Soft current limit, settable but not enforced by the model.
    pub current_limit: f64,
    pub faults: Vec<String>,
}

impl Default for DriveState {
    fn default() -> Self {
        DriveState {
            speed: 0.0,
            torque: 0.0,
            rpm: 0.0,
            temperature: AMBIENT_TEMP,
            current: 0.0,
            voltage: NOMINAL_VOLTAGE,
            soc: 100.0,
            max_current: 50.0,
            current_limit: 50.0,
            faults: Vec::new(),
        }
    }
}

impl DriveState {
    /// Zero the drive outputs, as an emergency stop does.
    pub fn halt(&mut self) {
        self.speed = 0.0;
        self.torque = 0.0;
        self.rpm = 0.0;
        self.current = 0.0;
    }

    /// Advance one tick; returns faults that latched on this tick.
    pub fn tick(&mut self, noise: bool) -> Vec<String> {
        // Speed in percent maps to 0..5000 RPM, torque to 0..50 A.
        let target_rpm = self.speed * 50.0;
        self.rpm += (target_rpm - self.rpm) * 0.1;

        let target_current = self.torque * 0.5;
        self.current += (target_current - self.current) * 0.1;

        let heating = self.current * 0.1;
        let cooling = (self.temperature - AMBIENT_TEMP) * 0.05;
        self.temperature += heating - cooling;

        if noise {
            let mut rng = rand::thread_rng();
            self.temperature += rng.gen_range(-0.2..0.2);
            self.rpm += rng.gen_range(-10.0..10.0);
            self.current += rng.gen_range(-0.5..0.5);
        }

        if self.current > 0.0 {
            self.soc = (self.soc - self.current * 0.0001).max(0.0);
        }
        self.voltage = NOMINAL_VOLTAGE - self.current * 0.1;

        let mut latched = Vec::new();
        if self.temperature > OVERTEMP_LIMIT {
            self.latch("OVERTEMP", &mut latched);
        }
        if self.current > self.max_current {
            self.latch("OVERCURRENT", &mut latched);
        }
        if self.soc < LOW_BATTERY_LIMIT {
            self.latch("LOW_BATTERY", &mut latched);
        }
        latched
    }

    fn latch(&mut self, fault: &str, latched: &mut Vec<String>) {
        if !self.faults.iter().any(|f| f == fault) {
            self.faults.push(fault.to_string());
            latched.push(fault.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpm_lags_toward_commanded_speed() {
        let mut state = DriveState::default();
        state.speed = 100.0;
        state.tick(false);
        assert!(state.rpm > 0.0);
        assert!(state.rpm < 5000.0);

        for _ in 0..200 {
            state.tick(false);
        }
        assert!((state.rpm - 5000.0).abs() < 1.0);
    }

    #[test]
    fn sustained_load_latches_overtemp_once() {
        let mut state = DriveState::default();
        state.torque = 100.0;

        let mut latched = Vec::new();
        for _ in 0..2000 {
            latched.extend(state.tick(false));
        }
        assert_eq!(
            latched.iter().filter(|f| *f == "OVERTEMP").count(),
            1,
            "fault should latch exactly once"
        );
        assert!(state.faults.contains(&"OVERTEMP".to_string()));
    }

    #[test]
    fn current_above_ceiling_latches_overcurrent() {
        let mut state = DriveState::default();
        state.max_current = 10.0;
        state.torque = 100.0;

        let mut latched = Vec::new();
        for _ in 0..100 {
            latched.extend(state.tick(false));
        }
        assert!(latched.contains(&"OVERCURRENT".to_string()));
    }

    #[test]
    fn voltage_sags_under_load() {
        let mut state = DriveState::default();
        state.torque = 100.0;
        for _ in 0..100 {
            state.tick(false);
        }
        assert!(state.voltage < NOMINAL_VOLTAGE);
    }

    #[test]
    fn halt_zeroes_drive_outputs() {
        let mut state = DriveState::default();
        state.speed = 50.0;
        state.torque = 50.0;
        for _ in 0..20 {
            state.tick(false);
        }
        state.halt();
        assert_eq!(state.rpm, 0.0);
        assert_eq!(state.current, 0.0);
        assert_eq!(state.speed, 0.0);
        assert_eq!(state.torque, 0.0);
    }

    #[test]
    fn soc_discharges_only_under_current() {
        let mut state = DriveState::default();
        state.tick(false);
        assert_eq!(state.soc, 100.0);

        state.torque = 100.0;
        for _ in 0..100 {
            state.tick(false);
        }
        assert!(state.soc < 100.0);
    }
}
