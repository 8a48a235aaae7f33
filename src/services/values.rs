//! Value helpers shared by the lookup and rollup engines.
//!
//! Field definitions are authored at runtime, so the engines work over
//! untyped JSON records: properties are addressed by dot-path and cast
//! on demand. Casts that fail yield `None` and the value is dropped by
//! the caller rather than raising.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::{Number, Value};

use crate::models::Record;

/// Walk a dot-separated path through a record.
///
/// Numeric segments index into arrays. A missing key or a `null` anywhere
/// along the path yields `None`.
pub fn get_path<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = record.get(first)?;

    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    match current {
        Value::Null => None,
        v => Some(v),
    }
}

/// Stringify a value the way a display layer expects.
///
/// Strings are unquoted, whole numbers drop their fraction, arrays join
/// their elements with commas.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.as_f64().map(format_number).unwrap_or_else(|| n.to_string()),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(value_to_string).collect::<Vec<_>>().join(","),
        Value::Object(_) => value.to_string(),
    }
}

/// Shortest display form of a float: `3` rather than `3.0`.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Fixed-point rendering with `decimals` places.
pub fn format_fixed(n: f64, decimals: usize) -> String {
    format!("{:.*}", decimals, n)
}

/// Round to `decimals` places.
pub fn round_to(n: f64, decimals: usize) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (n * factor).round() / factor
}

/// JSON number for a float, integral when possible. Non-finite → `null`.
pub fn number_value(n: f64) -> Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::from(n as i64)
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

/// Numeric cast. Numbers pass through, numeric strings parse; anything
/// else (including booleans and blank strings) is not a number.
pub fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok().filter(|f| f.is_finite())
        }
        _ => None,
    }
}

/// Date cast. Accepts RFC 3339, `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS`
/// (with or without `T`), and numbers as epoch milliseconds.
pub fn to_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_date_str(s.trim()),
        Value::Number(n) => {
            let ms = n.as_f64()?;
            if !ms.is_finite() {
                return None;
            }
            Utc.timestamp_millis_opt(ms as i64).single()
        }
        _ => None,
    }
}

fn parse_date_str(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ndt.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| ndt.and_utc())
}

/// ISO-8601 with millisecond precision and a `Z` suffix.
pub fn iso_date(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `M/D/YYYY`
pub fn locale_date(dt: &DateTime<Utc>) -> String {
    dt.format("%-m/%-d/%Y").to_string()
}

/// `M/D/YYYY, h:mm:ss AM`
pub fn locale_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%-m/%-d/%Y, %-I:%M:%S %p").to_string()
}

/// True-ish for checkbox/status semantics: `true`, `"completed"`, `"done"`.
pub fn is_checked(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s == "completed" || s == "done",
        _ => false,
    }
}

/// Missing, `null` or the empty string.
pub fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        _ => false,
    }
}

/// Strict equality; numbers compare by numeric value.
pub fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}
