//! CSV telemetry logging.
//!
//! One row per telemetry frame, appended as it arrives. The header is
//! written once when the file is created; reruns append to the existing
//! log.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};

use evlink::Message;

const HEADER: &str = "timestamp,rpm,temp,current,voltage,soc\n";

pub struct DataLogger {
    file: File,
}

impl DataLogger {
    /// Open `path` for appending, writing the CSV header if the file is
    /// new.
    pub fn open(path: &Path) -> Result<DataLogger> {
        let fresh = !path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open telemetry log {}", path.display()))?;
        if fresh {
            file.write_all(HEADER.as_bytes())
                .context("failed to write CSV header")?;
        }
        Ok(DataLogger { file })
    }

    /// Append one row from a telemetry message.
    pub fn log(&mut self, msg: &Message) -> Result<()> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        let row = format!(
            "{:.3},{},{},{},{},{}\n",
            timestamp,
            field(msg, "RPM"),
            field(msg, "TEMP"),
            field(msg, "CURRENT"),
            field(msg, "VOLTAGE"),
            field(msg, "SOC"),
        );
        self.file
            .write_all(row.as_bytes())
            .context("failed to append telemetry row")
    }
}

fn field(msg: &Message, key: &str) -> String {
    match msg.payload.get(key) {
        Some(v) => v.to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evlink::{Payload, Value};

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("evlink-log-test-{}-{}", std::process::id(), name))
    }

    fn telemetry() -> Message {
        let mut payload = Payload::new();
        payload.push("RPM", Value::Float(1200.0));
        payload.push("TEMP", Value::Float(42.5));
        payload.push("CURRENT", Value::Float(10.0));
        payload.push("VOLTAGE", Value::Float(47.0));
        payload.push("SOC", Value::Float(98.5));
        Message::new("DATA", payload)
    }

    #[test]
    fn header_written_once_and_rows_append() {
        let path = temp_path("rows.csv");
        std::fs::remove_file(&path).ok();

        {
            let mut logger = DataLogger::open(&path).unwrap();
            logger.log(&telemetry()).unwrap();
        }
        {
            let mut logger = DataLogger::open(&path).unwrap();
            logger.log(&telemetry()).unwrap();
        }

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("timestamp,").count(), 1);
        assert_eq!(text.lines().count(), 3);
        assert!(text.contains("42.5"));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_fields_leave_empty_cells() {
        let path = temp_path("sparse.csv");
        std::fs::remove_file(&path).ok();

        let mut payload = Payload::new();
        payload.push("TEMP", Value::Float(30.0));
        let msg = Message::new("DATA", payload);

        let mut logger = DataLogger::open(&path).unwrap();
        logger.log(&msg).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let row = text.lines().nth(1).unwrap();
        assert!(row.ends_with(",,"));
        assert!(row.contains(",30.0,"));

        std::fs::remove_file(&path).ok();
    }
}
