use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use models::{
    record::{json_type, now_timestamp},
    MapRecord,
};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::{errors::JsonApiError, state::AppState};

const ID_REQUIRED: &str = "Map ID required";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PutResponse {
    pub ok: bool,
    pub updated_at: String,
}

/// Client-supplied part of a record.
#[derive(Debug, PartialEq)]
pub struct MapPayload {
    pub labels: Vec<Value>,
    pub options: Map<String, Value>,
    pub img_meta: Option<Value>,
}

/// Validate a PUT body. An empty body counts as `{}`; `updatedAt` from the
/// client is ignored.
pub fn parse_payload(body: &[u8]) -> Result<MapPayload, JsonApiError> {
    let value: Value = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Object(Map::new())
    } else {
        serde_json::from_slice(body).map_err(|_| JsonApiError::bad_request("Invalid JSON body"))?
    };
    let mut obj = match value {
        Value::Object(obj) => obj,
        other => {
            return Err(JsonApiError::bad_request(format!(
                "JSON body must be an object, got {}",
                json_type(&other)
            )))
        }
    };
    let labels = match obj.remove("labels") {
        Some(Value::Array(labels)) => labels,
        _ => return Err(JsonApiError::bad_request("'labels' must be an array")),
    };
    let options = match obj.remove("options") {
        None => Map::new(),
        Some(Value::Object(options)) => options,
        Some(_) => return Err(JsonApiError::bad_request("'options' must be an object")),
    };
    let img_meta = obj.remove("imgMeta").filter(|v| !v.is_null());
    Ok(MapPayload { labels, options, img_meta })
}

pub async fn get_map(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MapRecord>, JsonApiError> {
    if id.is_empty() {
        return Err(JsonApiError::bad_request(ID_REQUIRED));
    }
    match state.store.get(&id).await? {
        Some(record) => Ok(Json(record)),
        None => Err(JsonApiError::not_found("Map not found")),
    }
}

pub async fn put_map(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<PutResponse>, JsonApiError> {
    if id.is_empty() {
        return Err(JsonApiError::bad_request(ID_REQUIRED));
    }
    let payload = parse_payload(&body)?;
    let updated_at = now_timestamp();
    let record = MapRecord::new(
        id.clone(),
        payload.labels,
        payload.options,
        payload.img_meta,
        updated_at.clone(),
    );
    state.store.put(&id, &record).await?;
    info!(map_id = %id, labels = record.labels.len(), "map saved");
    Ok(Json(PutResponse { ok: true, updated_at }))
}

/// `/api/maps/` with nothing after the slash.
pub async fn missing_id() -> JsonApiError {
    JsonApiError::bad_request(ID_REQUIRED)
}
