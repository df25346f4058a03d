//! Scalar casts over JSON values.
//!
//! Operators and placeholder substitution both need loose, total
//! conversions: every [`Value`] casts to a string, a boolean, and
//! optionally a number. None of these functions fail.
//!
//! - strings cast to themselves; numbers print without a trailing `.0`
//!   when integral; `true` → `"1"`; `false` / `null` / mappings / lists → `""`
//! - booleans: `null`, `false`, `0`, `""`, `"0"`, `"false"`, `"no"`, `"off"`
//!   and empty collections are false, everything else is true
//! - numerics: numbers, and strings that parse as a finite float after
//!   trimming

use serde_json::Value;

/// Whether the value is a string, number, or boolean.
pub fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

/// Cast a value to its string form.
pub fn cast_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                n.to_string()
            } else {
                n.as_f64().map_or_else(|| n.to_string(), format_float)
            }
        }
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) | Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
    }
}

fn format_float(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{f:.0}")
    } else {
        f.to_string()
    }
}

/// Cast a value to a boolean.
pub fn cast_bool(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !matches!(
            s.trim().to_lowercase().as_str(),
            "" | "0" | "false" | "no" | "off"
        ),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Parse a value as a number, if it is numeric.
pub fn as_numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_numeric(s),
        _ => None,
    }
}

/// Parse a numeric string. Rejects `inf`/`nan` spellings and empty input.
pub fn parse_numeric(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Generic emptiness: null, false, zero, `""`, `"0"`, and empty collections.
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f == 0.0),
        Value::String(s) => s.is_empty() || s == "0",
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// Presence check used by `EXISTS`: non-empty, or literally zero / `"0"`.
pub fn exists(value: &Value) -> bool {
    !is_empty(value) || is_zero_literal(value)
}

fn is_zero_literal(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.as_f64().is_some_and(|f| f == 0.0),
        Value::String(s) => s == "0",
        _ => false,
    }
}
