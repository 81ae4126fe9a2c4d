//! InfluxDB line protocol encoding
//!
//! `water_quality,sensor=pH value=7.2,status="Normal" 1718000000000000000`

use crate::types::EvaluatedPoint;

/// Encode one point as a line (no trailing newline)
pub fn encode_point(measurement: &str, point: &EvaluatedPoint) -> String {
    let timestamp_ns = point
        .timestamp
        .timestamp_nanos_opt()
        .unwrap_or_else(|| point.timestamp.timestamp() * 1_000_000_000);

    format!(
        "{},sensor={} value={},status=\"{}\" {}",
        escape_measurement(measurement),
        escape_tag(&point.sensor_name),
        point.value,
        escape_string_field(point.status.label()),
        timestamp_ns
    )
}

/// Measurements escape commas and spaces
fn escape_measurement(s: &str) -> String {
    escape(s, &[',', ' '])
}

/// Tag keys and values escape commas, equals signs and spaces
fn escape_tag(s: &str) -> String {
    escape(s, &[',', '=', ' '])
}

/// String field values escape double quotes and backslashes
fn escape_string_field(s: &str) -> String {
    escape(s, &['"', '\\'])
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
