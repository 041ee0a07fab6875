//! Conversion between plain JSON and Firestore typed values.
//!
//! Integers that fit an `i64` travel as decimal strings (`integerValue`);
//! every other number, including larger unsigned ones, as `doubleValue`. Types with no JSON counterpart are read back as strings
//! (timestamps, references, bytes) or small objects (geo points).

use serde_json::{Map, Number, Value};

use models::{record::normalize, MapRecord};

use crate::errors::BoxError;

pub fn encode_value(v: &Value) -> Value {
    match v {
        Value::Null => serde_json::json!({ "nullValue": null }),
        Value::Bool(b) => serde_json::json!({ "booleanValue": b }),
        // Firestore integers are signed 64-bit.
        Value::Number(n) => match n.as_i64() {
            Some(i) => serde_json::json!({ "integerValue": i.to_string() }),
            None => serde_json::json!({ "doubleValue": n.as_f64().unwrap_or_default() }),
        },
        Value::String(s) => serde_json::json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode_value).collect();
            serde_json::json!({ "arrayValue": { "values": values } })
        }
        Value::Object(obj) => serde_json::json!({ "mapValue": { "fields": encode_fields(obj) } }),
    }
}

pub fn encode_fields(obj: &Map<String, Value>) -> Map<String, Value> {
    obj.iter().map(|(k, v)| (k.clone(), encode_value(v))).collect()
}

pub fn decode_value(v: &Value) -> Result<Value, BoxError> {
    let obj = v.as_object().ok_or("typed value is not an object")?;
    let (kind, inner) = obj.iter().next().ok_or("typed value has no type")?;
    let decoded = match kind.as_str() {
        "nullValue" => Value::Null,
        "booleanValue" => Value::Bool(inner.as_bool().ok_or("booleanValue is not a bool")?),
        "integerValue" => {
            let n = match inner {
                Value::String(s) => s.parse::<i64>().map_err(|e| format!("integerValue {s:?}: {e}"))?,
                Value::Number(n) => n.as_i64().ok_or("integerValue out of range")?,
                _ => return Err("integerValue is not a string".into()),
            };
            Value::Number(n.into())
        }
        "doubleValue" => {
            let f = match inner {
                Value::Number(n) => n.as_f64().ok_or("doubleValue is not a number")?,
                // NaN and infinities are sent as strings.
                Value::String(s) => s.parse::<f64>().map_err(|e| format!("doubleValue {s:?}: {e}"))?,
                _ => return Err("doubleValue is not a number".into()),
            };
            Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
        }
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => {
            Value::String(inner.as_str().ok_or_else(|| format!("{kind} is not a string"))?.to_string())
        }
        "geoPointValue" => inner.clone(),
        "arrayValue" => {
            let values = match inner.get("values") {
                None => Vec::new(),
                Some(values) => values
                    .as_array()
                    .ok_or("arrayValue.values is not an array")?
                    .iter()
                    .map(decode_value)
                    .collect::<Result<Vec<_>, _>>()?,
            };
            Value::Array(values)
        }
        "mapValue" => match inner.get("fields") {
            None => Value::Object(Map::new()),
            Some(fields) => Value::Object(decode_fields(
                fields.as_object().ok_or("mapValue.fields is not an object")?,
            )?),
        },
        other => return Err(format!("unsupported firestore value type {other}").into()),
    };
    Ok(decoded)
}

pub fn decode_fields(fields: &Map<String, Value>) -> Result<Map<String, Value>, BoxError> {
    fields
        .iter()
        .map(|(k, v)| decode_value(v).map(|d| (k.clone(), d)))
        .collect()
}

pub fn to_firestore_fields(record: &MapRecord) -> Map<String, Value> {
    match record.to_value() {
        Value::Object(obj) => encode_fields(&obj),
        _ => Map::new(),
    }
}

/// Decode a document's `fields`. A document with no fields is no record.
pub fn from_firestore_fields(id: &str, fields: &Map<String, Value>) -> Result<Option<MapRecord>, BoxError> {
    let plain = decode_fields(fields)?;
    Ok(normalize(Some(Value::Object(plain)), id)?)
}
