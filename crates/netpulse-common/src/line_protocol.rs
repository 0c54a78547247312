//! InfluxDB line protocol encoding for [`WireRecord`]s.

use crate::types::{FieldValue, WireRecord};
use std::fmt::Write;

/// Encode records as newline-separated line protocol, all stamped with
/// `timestamp_ns`.
///
/// Non-finite floats are not representable and are dropped; a record left with
/// no fields is dropped entirely.
///
/// # Examples
///
/// ```
/// use netpulse_common::line_protocol::encode;
/// use netpulse_common::types::WireRecord;
///
/// let record = WireRecord::new("net io")
///     .tag("interface", "eth0")
///     .field("bytes-sent", 42u64);
/// assert_eq!(encode(&[record], 7), "net\\ io,interface=eth0 bytes-sent=42i 7");
/// ```
pub fn encode(records: &[WireRecord], timestamp_ns: i64) -> String {
    let mut lines = Vec::with_capacity(records.len());
    for record in records {
        if let Some(line) = encode_line(record, timestamp_ns) {
            lines.push(line);
        }
    }
    lines.join("\n")
}

fn encode_line(record: &WireRecord, timestamp_ns: i64) -> Option<String> {
    let fields: Vec<String> = record
        .fields
        .iter()
        .filter_map(|(key, value)| {
            encode_field_value(value).map(|v| format!("{}={v}", escape_key(key)))
        })
        .collect();
    if fields.is_empty() {
        return None;
    }

    let mut line = escape_measurement(&record.measurement);
    for (key, value) in &record.tags {
        if value.is_empty() {
            continue;
        }
        let _ = write!(line, ",{}={}", escape_key(key), escape_key(value));
    }
    let _ = write!(line, " {} {timestamp_ns}", fields.join(","));
    Some(line)
}

fn encode_field_value(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::Float(v) if v.is_finite() => Some(format!("{v}")),
        FieldValue::Float(_) => None,
        FieldValue::Integer(v) => Some(format!("{v}i")),
        FieldValue::Str(s) => Some(format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))),
    }
}

fn escape_measurement(s: &str) -> String {
    escape(s, &[',', ' '])
}

/// Tag keys, tag values and field keys share one escaping rule.
fn escape_key(s: &str) -> String {
    escape(s, &[',', '=', ' '])
}

fn escape(s: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
