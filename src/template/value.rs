//! Value coercions used by the expression evaluator
//!
//! Expressions operate on `serde_json::Value`. The helpers here give those
//! values the loose, script-like semantics pipeline authors expect: an
//! undefined variable is `null`, `null` renders as an empty string, and any
//! value can be tested for truthiness.

use serde_json::Value;

/// Truthiness of a value
///
/// `null`, `false`, `0`, `NaN` and the empty string are falsy; everything
/// else (including empty arrays and objects) is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Render a value the way it appears when interpolated into text
pub fn to_display_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) => format_number(f),
            None => n.to_string(),
        },
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(to_display_string)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => value.to_string(),
    }
}

/// Build a number value, keeping integral results integral
pub fn number(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Value::from(f as i64)
    } else {
        serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// Numeric view of a value, if it has one
pub fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Null => Some(0.0),
        _ => None,
    }
}

/// `===`: same type and same value, numbers compared numerically
pub fn strict_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

/// `==`: like `===`, but a number and a numeric string compare by value
pub fn loose_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            s.trim().parse::<f64>().ok() == n.as_f64()
        }
        _ => strict_equals(left, right),
    }
}

/// Ordering used by `<`, `<=`, `>`, `>=`
///
/// Two strings compare lexically; anything else compares numerically when
/// both sides have a numeric view. Returns `None` when the values are not
/// comparable, which makes every relational operator false.
pub fn compare(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => {
            let a = to_number(left)?;
            let b = to_number(right)?;
            a.partial_cmp(&b)
        }
    }
}

/// `+`: numeric addition when both sides are numbers, concatenation otherwise
pub fn add(left: &Value, right: &Value) -> Value {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => number(a + b),
            _ => Value::Null,
        },
        _ => Value::String(format!(
            "{}{}",
            to_display_string(left),
            to_display_string(right)
        )),
    }
}

fn format_number(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        format!("{}", f)
    }
}
