//! JSON configuration persistence.
//!
//! The config file is optional: missing file or missing fields fall
//! back to defaults, and `save` writes the merged result back so the
//! file always ends up fully populated.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use evlink::ControllerConfig;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Serial port path.
    pub port: String,
    /// Serial baud rate.
    pub baud: u32,
    /// Motor temperature fault threshold, degrees C.
    pub overheat_threshold: f64,
    /// Battery state-of-charge fault threshold, percent.
    pub low_battery_threshold: f64,
    /// Transmit an emergency stop when the MCU reports a fault.
    pub estop_on_fault: bool,
    /// Telemetry poll period, milliseconds.
    pub telemetry_interval_ms: u64,
    /// Acknowledgement wait for confirmed commands, milliseconds.
    pub command_timeout_ms: u64,
    /// CSV telemetry log path; empty disables logging.
    pub log_csv: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            port: "/dev/ttyUSB0".to_string(),
            baud: 115_200,
            overheat_threshold: 80.0,
            low_battery_threshold: 15.0,
            estop_on_fault: true,
            telemetry_interval_ms: 500,
            command_timeout_ms: 500,
            log_csv: String::new(),
        }
    }
}

impl AppConfig {
    /// Load from `path`, falling back to defaults when the file does
    /// not exist. Unknown fields are ignored; missing fields default.
    pub fn load(path: &Path) -> Result<AppConfig> {
        if !path.exists() {
            return Ok(AppConfig::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Write the full config to `path` as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(path, text)
            .with_context(|| format!("failed to write config file {}", path.display()))
    }

    /// The controller-facing subset of this configuration.
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            overheat_threshold: self.overheat_threshold,
            low_battery_threshold: self.low_battery_threshold,
            estop_on_fault: self.estop_on_fault,
            telemetry_interval: Duration::from_millis(self.telemetry_interval_ms),
            command_timeout: Duration::from_millis(self.command_timeout_ms),
            ..Default::default()
        }
    }
}
