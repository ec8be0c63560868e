//! Typed representation of decoded frames and outgoing commands.
//!
//! A wire frame `<DATA:TEMP=42.5;RPM=3000>` decodes into a [`Message`]
//! whose [`Payload`] carries opportunistically typed [`Value`]s. Outgoing
//! commands are built as [`Request`]s and consumed by the link's sender.

use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

/// Well-known message kinds.
///
/// The kind set is open: the MCU may emit kinds not listed here, and the
/// encoder accepts arbitrary kinds. These constants only name the traffic
/// the controller itself produces or reacts to.
pub mod kind {
    /// Set the drive speed setpoint, percent (command).
    pub const SET_SPEED: &str = "SET_SPEED";
    /// Set the drive torque setpoint, percent (command).
    pub const SET_TORQUE: &str = "SET_TORQUE";
    /// Set the maximum current the MCU may draw (command).
    pub const SET_MAX_CURRENT: &str = "SET_MAX_CURRENT";
    /// Set the soft current limit (command).
    pub const SET_CURRENT_LIMIT: &str = "SET_CURRENT_LIMIT";
    /// Emergency stop (command, fire-and-forget).
    pub const ESTOP: &str = "ESTOP";
    /// Clear all latched faults (command).
    pub const RESET_FAULT: &str = "RESET_FAULT";

    /// Request a full telemetry frame (query).
    pub const GET_TELEM: &str = "GET_TELEM";
    /// Request a temperature reading (query).
    pub const GET_TEMP: &str = "GET_TEMP";
    /// Request drive status (query).
    pub const GET_STATUS: &str = "GET_STATUS";
    /// Request the active fault list (query).
    pub const GET_FAULTS: &str = "GET_FAULTS";

    /// Telemetry or query response data (MCU -> controller).
    pub const DATA: &str = "DATA";
    /// Positive acknowledgement of a command.
    pub const ACK: &str = "ACK";
    /// Negative acknowledgement of a command.
    pub const NACK: &str = "NACK";
    /// Unsolicited fault report.
    pub const FAULT: &str = "FAULT";
}

/// An opportunistically typed payload value.
///
/// The wire carries untyped text; decoding applies the protocol's typing
/// rule: a value containing `.` is a float, else an integer if it parses
/// as one, else text. A key with no `=` at all is a presence flag.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// An integer value (`RPM=3000`).
    Int(i64),
    /// A floating-point value (`TEMP=42.5`).
    Float(f64),
    /// A plain text value (`FAULTS=NONE`).
    Text(String),
    /// A boolean-present flag (`ARMED` with no `=`); always true.
    Flag,
}

impl Value {
    /// The value as an `f64`, widening integers. `None` for text/flags.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// The value as an `i64`. `None` for anything but [`Value::Int`].
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The value as text. `None` for anything but [`Value::Text`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    /// Human-readable form.
    ///
    /// Floats always render with a decimal point so that re-decoding a
    /// formatted value preserves its type.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => {
                if v.is_finite() && v.fract() == 0.0 {
                    write!(f, "{v:.1}")
                } else {
                    write!(f, "{v}")
                }
            }
            Value::Text(s) => write!(f, "{s}"),
            Value::Flag => write!(f, "true"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

/// An ordered collection of key/value pairs carried by a frame.
///
/// Key uniqueness is not enforced: duplicates are kept in arrival order
/// and [`Payload::get`] returns the *last* occurrence, so merging a
/// payload into controller state is last-value-wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    pairs: Vec<(String, Value)>,
}

impl Payload {
    /// An empty payload.
    pub fn new() -> Self {
        Payload { pairs: Vec::new() }
    }

    /// Append a key/value pair, keeping any earlier occurrence of `key`.
    pub fn push(&mut self, key: impl Into<String>, value: Value) {
        self.pairs.push((key.into(), value));
    }

    /// The value for `key`, taking the last occurrence if duplicated.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.pairs.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Whether the payload contains `key` at all (including as a flag).
    pub fn contains(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    /// Iterate pairs in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Merge this payload into a key/value map, last value winning.
    pub fn merge_into(&self, map: &mut HashMap<String, Value>) {
        for (k, v) in &self.pairs {
            map.insert(k.clone(), v.clone());
        }
    }
}

/// A decoded frame: kind token, typed payload, and arrival time.
///
/// Immutable once constructed; cloned cheaply into the inbox for
/// synchronous waiters.
#[derive(Debug, Clone)]
pub struct Message {
    /// The kind token (e.g. `DATA`, `ACK`, `FAULT`).
    pub kind: String,
    /// The decoded key/value payload.
    pub payload: Payload,
    /// When the frame was decoded.
    pub received_at: Instant,
}

impl Message {
    /// Construct a message stamped with the current time.
    pub fn new(kind: impl Into<String>, payload: Payload) -> Self {
        Message {
            kind: kind.into(),
            payload,
            received_at: Instant::now(),
        }
    }
}

/// An outgoing command: kind plus optional payload.
///
/// Built by a caller, consumed by the link's sender, not retained.
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// The command kind (open set; unknown kinds are legal to send).
    pub kind: String,
    /// Command parameters, possibly empty.
    pub payload: Payload,
}

impl Request {
    /// A bare request with no parameters.
    pub fn new(kind: impl Into<String>) -> Self {
        Request {
            kind: kind.into(),
            payload: Payload::new(),
        }
    }

    /// Append a parameter, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.push(key, value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_as_f64_widens_int() {
        assert_eq!(Value::Int(5).as_f64(), Some(5.0));
        assert_eq!(Value::Float(2.5).as_f64(), Some(2.5));
        assert_eq!(Value::Text("x".into()).as_f64(), None);
        assert_eq!(Value::Flag.as_f64(), None);
    }

    #[test]
    fn value_display_float_keeps_decimal_point() {
        assert_eq!(Value::Float(5.0).to_string(), "5.0");
        assert_eq!(Value::Float(42.25).to_string(), "42.25");
        assert_eq!(Value::Int(5).to_string(), "5");
    }

    #[test]
    fn payload_get_returns_last_duplicate() {
        let mut p = Payload::new();
        p.push("TEMP", Value::Float(40.0));
        p.push("TEMP", Value::Float(41.5));
        assert_eq!(p.get("TEMP"), Some(&Value::Float(41.5)));
        assert_eq!(p.len(), 2);
    }

    #[test]
    fn payload_merge_is_last_value_wins() {
        let mut p = Payload::new();
        p.push("RPM", Value::Int(100));
        p.push("RPM", Value::Int(200));
        let mut map = HashMap::new();
        map.insert("RPM".to_string(), Value::Int(1));
        p.merge_into(&mut map);
        assert_eq!(map.get("RPM"), Some(&Value::Int(200)));
    }

    #[test]
    fn payload_contains_flag() {
        let mut p = Payload::new();
        p.push("ARMED", Value::Flag);
        assert!(p.contains("ARMED"));
        assert_eq!(p.get("ARMED"), Some(&Value::Flag));
    }

    #[test]
    fn request_builder() {
        let req = Request::new(kind::SET_CURRENT_LIMIT).with("LIMIT", 40.0);
        assert_eq!(req.kind, "SET_CURRENT_LIMIT");
        assert_eq!(req.payload.get("LIMIT"), Some(&Value::Float(40.0)));
    }
}
