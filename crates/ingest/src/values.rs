//! Scalar parsing helpers for raw telemetry tokens.
//!
//! Nothing here fails outward: unparsable input yields `None` and the caller
//! keeps the raw token.

use bsn_core::FieldValue;

/// Keys whose values are parsed as numbers (possibly fractional).
pub const FLOAT_KEYS: &[&str] = &["ax", "ay", "az", "gx", "gy", "gz", "mx", "my", "mz", "battery"];

/// The nine IMU axis keys.
pub const AXIS_KEYS: &[&str] = &["ax", "ay", "az", "gx", "gy", "gz", "mx", "my", "mz"];

pub const COUNTER_KEY: &str = "counter";

/// Parse a numeric token.
///
/// - `0x`/`0X` prefix: 16-bit two's-complement hexadecimal (`0x8000` is -32768).
///   Hex digits wider than 16 bits are not a valid reading and yield `None`.
/// - a trailing bare `.` is trimmed, then anything containing `.` is a float.
/// - otherwise a base-10 integer.
pub fn parse_number(raw: &str) -> Option<FieldValue> {
    let v = raw.trim();
    if v.is_empty() {
        return None;
    }

    if let Some(hex) = v.strip_prefix("0x").or_else(|| v.strip_prefix("0X")) {
        let value = u32::from_str_radix(hex, 16).ok()?;
        if value > 0xFFFF {
            return None;
        }
        let signed = if value >= 0x8000 {
            value as i64 - 0x10000
        } else {
            value as i64
        };
        return Some(FieldValue::Integer(signed));
    }

    let v = v.strip_suffix('.').unwrap_or(v);
    if v.contains('.') {
        v.parse::<f64>().ok().map(FieldValue::Float)
    } else {
        v.parse::<i64>().ok().map(FieldValue::Integer)
    }
}

/// Parse an epoch-milliseconds timestamp token.
pub fn parse_epoch_millis(raw: &str) -> Option<i64> {
    let v = raw.trim();
    if v.is_empty() {
        return None;
    }
    v.parse().ok()
}

/// Typed value for a field key: counters become integers, axis and battery
/// keys become numbers, everything else (and every parse failure) stays text.
pub fn field_value(key: &str, raw: &str) -> FieldValue {
    if key == COUNTER_KEY {
        return match parse_number(raw) {
            Some(FieldValue::Float(f)) => FieldValue::Integer(f as i64),
            Some(v) => v,
            None => FieldValue::Text(raw.to_string()),
        };
    }
    if FLOAT_KEYS.contains(&key) {
        if let Some(v) = parse_number(raw) {
            return v;
        }
    }
    FieldValue::Text(raw.to_string())
}
