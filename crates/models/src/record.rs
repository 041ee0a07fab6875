//! The map record and its canonical JSON codec.
//!
//! Every backend hands raw stored data to [`normalize`], so absent fields get
//! the same defaults no matter where the record came from. Tree databases drop
//! empty arrays, empty objects and nulls on write, which is why a stored record
//! may legitimately lack `labels`, `options` or `imgMeta`.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::CodecError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapRecord {
    #[serde(default)]
    pub map_id: String,
    #[serde(default)]
    pub labels: Vec<Value>,
    #[serde(default)]
    pub options: Map<String, Value>,
    #[serde(default)]
    pub img_meta: Option<Value>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Relational representation: nested fields as JSON text.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordColumns {
    pub labels: String,
    pub options: String,
    pub img_meta: Option<String>,
    pub updated_at: String,
}

impl MapRecord {
    pub fn new(
        map_id: impl Into<String>,
        labels: Vec<Value>,
        options: Map<String, Value>,
        img_meta: Option<Value>,
        updated_at: impl Into<String>,
    ) -> Self {
        Self {
            map_id: map_id.into(),
            labels,
            options,
            img_meta: img_meta.filter(|v| !v.is_null()),
            updated_at: Some(updated_at.into()),
        }
    }

    /// Native nested form used by document/tree stores and HTTP responses.
    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("mapId".into(), Value::String(self.map_id.clone()));
        obj.insert("labels".into(), Value::Array(self.labels.clone()));
        obj.insert("options".into(), Value::Object(self.options.clone()));
        obj.insert("imgMeta".into(), self.img_meta.clone().unwrap_or(Value::Null));
        obj.insert(
            "updatedAt".into(),
            self.updated_at.clone().map(Value::String).unwrap_or(Value::Null),
        );
        Value::Object(obj)
    }

    pub fn to_columns(&self) -> Result<RecordColumns, CodecError> {
        Ok(RecordColumns {
            labels: serde_json::to_string(&self.labels)?,
            options: serde_json::to_string(&self.options)?,
            img_meta: match &self.img_meta {
                None | Some(Value::Null) => None,
                Some(v) => Some(serde_json::to_string(v)?),
            },
            updated_at: self.updated_at.clone().unwrap_or_default(),
        })
    }

    pub fn from_columns(id: &str, columns: &RecordColumns) -> Result<Self, CodecError> {
        let mut obj = Map::new();
        obj.insert("mapId".into(), Value::String(id.to_string()));
        obj.insert("labels".into(), parse_column("labels", &columns.labels)?);
        obj.insert("options".into(), parse_column("options", &columns.options)?);
        if let Some(text) = &columns.img_meta {
            obj.insert("imgMeta".into(), parse_column("img_meta", text)?);
        }
        if !columns.updated_at.is_empty() {
            obj.insert("updatedAt".into(), Value::String(columns.updated_at.clone()));
        }
        // A row always decodes to a record: mapId is present, so the object is non-empty.
        normalize(Some(Value::Object(obj)), id)?.ok_or_else(|| CodecError::Field {
            field: "mapId".into(),
            reason: "row decoded to an empty record".into(),
        })
    }
}

fn parse_column(field: &str, text: &str) -> Result<Value, CodecError> {
    serde_json::from_str(text).map_err(|e| CodecError::Field {
        field: field.to_string(),
        reason: e.to_string(),
    })
}

/// Turn raw stored data into a fully defaulted record.
///
/// `None`, `null` and `{}` mean "no record". `mapId` is taken from `key`
/// when missing or empty.
pub fn normalize(raw: Option<Value>, key: &str) -> Result<Option<MapRecord>, CodecError> {
    let mut obj = match raw {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Object(obj)) => obj,
        Some(other) => return Err(CodecError::NotAnObject(json_type(&other))),
    };
    if obj.is_empty() {
        return Ok(None);
    }
    obj.retain(|_, v| !v.is_null());
    let mut record: MapRecord = serde_json::from_value(Value::Object(obj))?;
    if record.map_id.is_empty() {
        record.map_id = key.to_string();
    }
    Ok(Some(record))
}

/// Server-side write timestamp, RFC 3339 UTC with microseconds and `+00:00`.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

pub fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
