//! Frame codec for the evlink text protocol.
//!
//! The wire format is a human-readable, delimiter-framed text protocol:
//!
//! ```text
//! <KIND:KEY1=VAL1;KEY2=VAL2>
//! ```
//!
//! - `<` and `>` delimit one frame; there is no length prefix or checksum.
//! - `KIND` is an uppercase token from an open set.
//! - The optional payload follows the first `:` and is a `;`-separated
//!   list of `KEY=VALUE` pairs. A key with no `=` is a presence flag.
//! - Values are opportunistically typed on decode: containing `.` means
//!   float, else integer if it parses as one, else text.
//!
//! # Resynchronization
//!
//! [`extract_frame`] drops any bytes before the first `<` (line noise is
//! recovered from rather than preserved) and keeps everything from an
//! orphan `<` onward for the next read, so a frame split across reads is
//! never lost.

use bytes::{BufMut, BytesMut};

use evlink_core::error::{Error, Result};
use evlink_core::message::{Message, Payload, Request, Value};

/// Opening frame delimiter.
pub const FRAME_START: char = '<';
/// Closing frame delimiter.
pub const FRAME_END: char = '>';
/// Separator between the kind token and the payload section.
pub const KIND_SEP: char = ':';
/// Separator between payload parameters.
pub const PARAM_SEP: char = ';';
/// Separator between a key and its value.
pub const VALUE_SEP: char = '=';

/// Result of scanning a buffer for one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scan {
    /// A complete frame was found, delimiters included.
    Frame {
        /// The raw frame text, `<` through `>` inclusive.
        raw: String,
        /// Number of bytes to drain from the front of the buffer
        /// (leading garbage plus the frame itself).
        consumed: usize,
    },
    /// No complete frame is available yet.
    Incomplete {
        /// Leading bytes that can never start a frame and should be
        /// dropped (everything before an orphan `<`, or the whole
        /// buffer if it contains no `<` at all).
        discard: usize,
    },
}

/// Scan `buf` for the first complete frame.
///
/// Finds the first `<`, then the first `>` after it. Bytes before the
/// `<` are garbage and counted into `consumed`/`discard`; bytes from an
/// orphan `<` onward are preserved for a later append.
///
/// # Example
///
/// ```
/// use evlink_protocol::codec::{extract_frame, Scan};
///
/// match extract_frame("noise<DATA:TEMP=42.5>rest") {
///     Scan::Frame { raw, consumed } => {
///         assert_eq!(raw, "<DATA:TEMP=42.5>");
///         assert_eq!(consumed, 21);
///     }
///     other => panic!("expected Frame, got {other:?}"),
/// }
/// ```
pub fn extract_frame(buf: &str) -> Scan {
    let start = match buf.find(FRAME_START) {
        Some(pos) => pos,
        // No opening delimiter anywhere: the whole buffer is garbage.
        None => return Scan::Incomplete { discard: buf.len() },
    };

    match buf[start..].find(FRAME_END) {
        Some(rel_end) => {
            let end = start + rel_end;
            Scan::Frame {
                raw: buf[start..=end].to_string(),
                consumed: end + FRAME_END.len_utf8(),
            }
        }
        // Orphan `<`: keep the tail, drop only the garbage before it.
        None => Scan::Incomplete { discard: start },
    }
}

/// Drain all complete frames from the front of `buf`.
///
/// Repeatedly applies [`extract_frame`], removing consumed bytes in
/// place. Returns zero or more raw frame strings; whatever remains in
/// `buf` is an orphan partial frame (or empty) awaiting more bytes.
pub fn drain_frames(buf: &mut String) -> Vec<String> {
    let mut frames = Vec::new();
    loop {
        match extract_frame(buf) {
            Scan::Frame { raw, consumed } => {
                buf.drain(..consumed);
                frames.push(raw);
            }
            Scan::Incomplete { discard } => {
                if discard > 0 {
                    buf.drain(..discard);
                }
                break;
            }
        }
    }
    frames
}

/// Decode one raw frame into a [`Message`].
///
/// Strips the delimiters and splits on the *first* `:` only; a payload
/// that happens to contain a literal `:` keeps it. Malformed payload
/// tokens fall back to presence flags and empty tokens are skipped;
/// decode never panics past its boundary. An empty kind is rejected.
pub fn decode(raw: &str) -> Result<Message> {
    let body = raw.trim();
    let body = body.strip_prefix(FRAME_START).unwrap_or(body);
    let body = body.strip_suffix(FRAME_END).unwrap_or(body);

    let (kind, params) = match body.split_once(KIND_SEP) {
        Some((kind, params)) => (kind, params),
        None => (body, ""),
    };

    if kind.is_empty() {
        return Err(Error::Parse("empty message kind".into()));
    }

    let mut payload = Payload::new();
    for token in params.split(PARAM_SEP) {
        if token.is_empty() {
            continue;
        }
        match token.split_once(VALUE_SEP) {
            Some((key, value)) => payload.push(key, parse_value(value)),
            None => payload.push(token, Value::Flag),
        }
    }

    Ok(Message::new(kind, payload))
}

/// Apply the protocol's opportunistic typing rule to a value string.
fn parse_value(s: &str) -> Value {
    if s.contains('.') {
        if let Ok(f) = s.parse::<f64>() {
            return Value::Float(f);
        }
    } else if let Ok(i) = s.parse::<i64>() {
        return Value::Int(i);
    }
    Value::Text(s.to_string())
}

/// Encode a [`Request`] into wire bytes.
///
/// Pure formatting: the kind is not validated against a known set
/// (unknown kinds are legal to send). Floats always render with a
/// decimal point so `decode(encode(r))` reproduces the payload types.
///
/// # Example
///
/// ```
/// use evlink_core::Request;
/// use evlink_protocol::codec::encode;
///
/// let req = Request::new("SET_CURRENT_LIMIT").with("LIMIT", 40.0);
/// assert_eq!(encode(&req), b"<SET_CURRENT_LIMIT:LIMIT=40.0>");
/// ```
pub fn encode(req: &Request) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(req.kind.len() + 16 * req.payload.len() + 3);
    buf.put_u8(FRAME_START as u8);
    buf.put_slice(req.kind.as_bytes());

    if !req.payload.is_empty() {
        buf.put_u8(KIND_SEP as u8);
        for (i, (key, value)) in req.payload.iter().enumerate() {
            if i > 0 {
                buf.put_u8(PARAM_SEP as u8);
            }
            buf.put_slice(key.as_bytes());
            match value {
                Value::Flag => {}
                other => {
                    buf.put_u8(VALUE_SEP as u8);
                    buf.put_slice(other.to_string().as_bytes());
                }
            }
        }
    }

    buf.put_u8(FRAME_END as u8);
    buf.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use evlink_core::kind;

    // ---------------------------------------------------------------
    // Frame extraction
    // ---------------------------------------------------------------

    #[test]
    fn extract_single_frame() {
        match extract_frame("<DATA:TEMP=42.5>") {
            Scan::Frame { raw, consumed } => {
                assert_eq!(raw, "<DATA:TEMP=42.5>");
                assert_eq!(consumed, 16);
            }
            other => panic!("expected Frame, got {other:?}"),
        }
    }

    #[test]
    fn extract_drops_leading_garbage() {
        match extract_frame("\x00\x7fgarbage<ACK>") {
            Scan::Frame { raw, consumed } => {
                assert_eq!(raw, "<ACK>");
                assert_eq!(consumed, 14);
            }
            other => panic!("expected Frame, got {other:?}"),
        }
    }

    #[test]
    fn extract_orphan_open_preserves_tail() {
        match extract_frame("junk<DATA:TEMP=4") {
            Scan::Incomplete { discard } => assert_eq!(discard, 4),
            other => panic!("expected Incomplete, got {other:?}"),
        }
    }

    #[test]
    fn extract_no_delimiter_discards_everything() {
        match extract_frame("pure line noise") {
            Scan::Incomplete { discard } => assert_eq!(discard, 15),
            other => panic!("expected Incomplete, got {other:?}"),
        }
    }

    #[test]
    fn drain_multiple_frames_keeps_remainder() {
        let mut buf = String::from("<ACK:ACK=ESTOP><DATA:RPM=100><FAULT:FA");
        let frames = drain_frames(&mut buf);
        assert_eq!(frames, vec!["<ACK:ACK=ESTOP>", "<DATA:RPM=100>"]);
        assert_eq!(buf, "<FAULT:FA");
    }

    #[test]
    fn drain_partial_frame_yields_nothing() {
        let mut buf = String::from("<DATA:TEMP=4");
        assert!(drain_frames(&mut buf).is_empty());
        assert_eq!(buf, "<DATA:TEMP=4");

        // Appending the rest completes the frame.
        buf.push_str("2.5>");
        let frames = drain_frames(&mut buf);
        assert_eq!(frames, vec!["<DATA:TEMP=42.5>"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn drain_is_chunking_independent() {
        let wire = "x<DATA:TEMP=85.0;SOC=50>junk<ACK:ACK=ESTOP><FAULT:FAULT=OVERCURRENT>";

        // Single-chunk delivery.
        let mut whole = String::from(wire);
        let expected = drain_frames(&mut whole);

        // Byte-at-a-time delivery.
        let mut buf = String::new();
        let mut got = Vec::new();
        for ch in wire.chars() {
            buf.push(ch);
            got.extend(drain_frames(&mut buf));
        }

        assert_eq!(got, expected);
        assert_eq!(got.len(), 3);
    }

    // ---------------------------------------------------------------
    // Decoding
    // ---------------------------------------------------------------

    #[test]
    fn decode_kind_only() {
        let msg = decode("<ESTOP>").unwrap();
        assert_eq!(msg.kind, kind::ESTOP);
        assert!(msg.payload.is_empty());
    }

    #[test]
    fn decode_typed_payload() {
        let msg = decode("<DATA:TEMP=42.5;RPM=3000;FAULTS=NONE>").unwrap();
        assert_eq!(msg.kind, kind::DATA);
        assert_eq!(msg.payload.get("TEMP"), Some(&Value::Float(42.5)));
        assert_eq!(msg.payload.get("RPM"), Some(&Value::Int(3000)));
        assert_eq!(
            msg.payload.get("FAULTS"),
            Some(&Value::Text("NONE".into()))
        );
    }

    #[test]
    fn decode_flag_token() {
        let msg = decode("<DATA:ARMED;TEMP=20.0>").unwrap();
        assert_eq!(msg.payload.get("ARMED"), Some(&Value::Flag));
    }

    #[test]
    fn decode_splits_on_first_kind_separator_only() {
        // The payload legitimately contains a literal ':'.
        let msg = decode("<NACK:REASON=BAD:VALUE>").unwrap();
        assert_eq!(msg.kind, kind::NACK);
        assert_eq!(
            msg.payload.get("REASON"),
            Some(&Value::Text("BAD:VALUE".into()))
        );
    }

    #[test]
    fn decode_tolerates_empty_segments() {
        let msg = decode("<DATA:;TEMP=1;;>").unwrap();
        assert_eq!(msg.payload.len(), 1);
        assert_eq!(msg.payload.get("TEMP"), Some(&Value::Int(1)));
    }

    #[test]
    fn decode_unparsable_number_falls_back_to_text() {
        let msg = decode("<DATA:V=1.2.3;N=12ab>").unwrap();
        assert_eq!(msg.payload.get("V"), Some(&Value::Text("1.2.3".into())));
        assert_eq!(msg.payload.get("N"), Some(&Value::Text("12ab".into())));
    }

    #[test]
    fn decode_empty_kind_is_parse_error() {
        assert!(matches!(decode("<>"), Err(Error::Parse(_))));
        assert!(matches!(decode("<:X=1>"), Err(Error::Parse(_))));
    }

    #[test]
    fn decode_duplicate_keys_last_wins() {
        let msg = decode("<DATA:TEMP=40.0;TEMP=41.0>").unwrap();
        assert_eq!(msg.payload.get("TEMP"), Some(&Value::Float(41.0)));
    }

    // ---------------------------------------------------------------
    // Encoding and round-trips
    // ---------------------------------------------------------------

    #[test]
    fn encode_bare_command() {
        assert_eq!(encode(&Request::new(kind::ESTOP)), b"<ESTOP>");
    }

    #[test]
    fn encode_with_parameters() {
        let req = Request::new(kind::SET_MAX_CURRENT)
            .with("LIMIT", 40i64)
            .with("RAMP", 2.5);
        assert_eq!(encode(&req), b"<SET_MAX_CURRENT:LIMIT=40;RAMP=2.5>");
    }

    #[test]
    fn encode_unknown_kind_is_legal() {
        let req = Request::new("CALIBRATE_FOO").with("GAIN", 3i64);
        assert_eq!(encode(&req), b"<CALIBRATE_FOO:GAIN=3>");
    }

    #[test]
    fn round_trip_preserves_types() {
        let req = Request::new(kind::SET_CURRENT_LIMIT)
            .with("LIMIT", 40i64)
            .with("SCALE", 1.0)
            .with("NAME", "main");
        let wire = encode(&req);
        let msg = decode(std::str::from_utf8(&wire).unwrap()).unwrap();

        assert_eq!(msg.kind, req.kind);
        assert_eq!(msg.payload.get("LIMIT"), Some(&Value::Int(40)));
        // 1.0 must come back as a float, not the integer 1.
        assert_eq!(msg.payload.get("SCALE"), Some(&Value::Float(1.0)));
        assert_eq!(msg.payload.get("NAME"), Some(&Value::Text("main".into())));
    }

    #[test]
    fn round_trip_flag() {
        let req = Request::new("DATA").with("ARMED", Value::Flag);
        let wire = encode(&req);
        assert_eq!(wire, b"<DATA:ARMED>");
        let msg = decode(std::str::from_utf8(&wire).unwrap()).unwrap();
        assert_eq!(msg.payload.get("ARMED"), Some(&Value::Flag));
    }
}
