//! Record type and whole-record helpers.
//!
//! A record is an insertion-ordered JSON object. Nested values are ordinary
//! `serde_json::Value`s, so any mapping/sequence/scalar shape is accepted.

use serde_json::{Map, Value};

/// A record being converted: field name -> value, in insertion order.
pub type Record = Map<String, Value>;

/// Return a copy of `record` with every key lower-cased, including keys of
/// mappings nested inside other mappings or sequences.
///
/// When two keys collapse onto the same lower-case key the later one wins.
pub fn keys_in_lower_case(record: Record) -> Record {
    record
        .into_iter()
        .map(|(key, value)| (key.to_lowercase(), value_in_lower_case(value)))
        .collect()
}

fn value_in_lower_case(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(keys_in_lower_case(map)),
        Value::Array(items) => Value::Array(items.into_iter().map(value_in_lower_case).collect()),
        other => other,
    }
}

/// Return `record` without its top-level `null` entries.
pub fn without_null_values(record: Record) -> Record {
    record.into_iter().filter(|(_, value)| !value.is_null()).collect()
}

/// Read a value as a number: JSON numbers as-is, strings when they parse.
///
/// Anything else (sequences, mappings, booleans, `null`) is not a number.
pub(crate) fn number_from(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

/// Build a JSON number from a float, `null` when it is not finite.
pub(crate) fn number_value(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
