//! Store-side attribute encoding.
//!
//! Records travel as JSON on the wire but are kept by the store as typed
//! attributes. Numbers in particular become canonical decimal strings
//! (`AttributeValue::N`), so `1.50` and `1.5` are the same stored value and
//! nothing depends on a JSON number type.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::BTreeMap;

use super::StoreError;
use crate::protocol::{record_id, Record};

pub type AttributeMap = BTreeMap<String, AttributeValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    /// String
    S(String),
    /// Number as canonical decimal text
    N(String),
    Bool(bool),
    Null,
    /// List
    L(Vec<AttributeValue>),
    /// Nested map
    M(AttributeMap),
}

/// Canonical decimal text for a JSON number.
pub fn canonical_decimal(number: &Number) -> Result<String, StoreError> {
    if let Some(i) = number.as_i64() {
        return Ok(i.to_string());
    }
    if let Some(u) = number.as_u64() {
        return Ok(u.to_string());
    }
    match number.as_f64() {
        Some(f) if f.is_finite() => Ok(f.to_string()),
        _ => Err(StoreError::InvalidRecord(format!(
            "number {number} has no decimal representation"
        ))),
    }
}

pub fn encode_value(value: &Value) -> Result<AttributeValue, StoreError> {
    Ok(match value {
        Value::Null => AttributeValue::Null,
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(canonical_decimal(n)?),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) => {
            AttributeValue::L(items.iter().map(encode_value).collect::<Result<_, _>>()?)
        }
        Value::Object(map) => AttributeValue::M(encode_map(map)?),
    })
}

fn encode_map(map: &Record) -> Result<AttributeMap, StoreError> {
    map.iter()
        .map(|(key, value)| Ok((key.clone(), encode_value(value)?)))
        .collect()
}

/// Encode a wire record for storage. The record must carry an `id`.
pub fn encode_record(record: &Record) -> Result<(String, AttributeMap), StoreError> {
    let id = record_id(record)
        .ok_or_else(|| StoreError::InvalidRecord("record has no id".to_string()))?;
    Ok((id, encode_map(record)?))
}

pub fn decode_value(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::Null => Value::Null,
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(text) => decode_decimal(text),
        AttributeValue::L(items) => Value::Array(items.iter().map(decode_value).collect()),
        AttributeValue::M(map) => Value::Object(decode_record(map)),
    }
}

fn decode_decimal(text: &str) -> Value {
    if let Ok(i) = text.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(u) = text.parse::<u64>() {
        return Value::from(u);
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(text.to_string()))
}

/// Render a stored record back into wire JSON.
pub fn decode_record(map: &AttributeMap) -> Record {
    map.iter()
        .map(|(key, value)| (key.clone(), decode_value(value)))
        .collect()
}
