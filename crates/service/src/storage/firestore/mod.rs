//! Document-database backend over the Firestore REST API.
//!
//! Records live at `projects/<p>/databases/(default)/documents/maps/<id>`.
//! Writes `PATCH` the whole document without an update mask, which replaces
//! every field in one atomic call.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use configs::FirestoreConfig;
use models::MapRecord;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::{
    google_auth::{ServiceAccountKey, TokenSource, DATASTORE_SCOPES},
    MapStore,
};
use crate::errors::ServiceError;

pub mod codec;

const KIND: &str = "firestore";
const COLLECTION: &str = "maps";

#[derive(Deserialize)]
struct Document {
    #[serde(default)]
    fields: Map<String, Value>,
}

pub struct FirestoreStore {
    client: reqwest::Client,
    base: Url,
    project_id: String,
    tokens: Arc<TokenSource>,
}

impl FirestoreStore {
    pub fn new(
        base_url: &str,
        project_id: impl Into<String>,
        tokens: Arc<TokenSource>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let base = Url::parse(&super::realtime::normalise_base_url(base_url))
            .map_err(|e| ServiceError::Config(format!("invalid firestore base url {base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(ServiceError::Config(format!("firestore base url {base_url} cannot be a base")));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Config(format!("cannot build http client: {e}")))?;
        Ok(Self { client, base, project_id: project_id.into(), tokens })
    }

    /// Project id comes from configuration, falling back to the one in the key file.
    pub async fn from_config(cfg: &FirestoreConfig, timeout: Duration) -> Result<Self, ServiceError> {
        cfg.validate().map_err(|e| ServiceError::Config(e.to_string()))?;
        let path = cfg
            .credentials_path
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ServiceError::Config("firestore requires a service account credentials file".into()))?;
        let key = ServiceAccountKey::load(path).await?;
        let tokens = TokenSource::new(key, DATASTORE_SCOPES, timeout, KIND)?;
        let project_id = cfg
            .project_id
            .clone()
            .filter(|p| !p.trim().is_empty())
            .or_else(|| tokens.project_id().map(str::to_string))
            .ok_or_else(|| ServiceError::Config("firestore project id is not configured".into()))?;
        Self::new(&cfg.base_url, project_id, Arc::new(tokens), timeout)
    }

    pub fn document_url(&self, id: &str) -> Result<Url, ServiceError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ServiceError::Config("firestore base url cannot be a base".into()))?
            .pop_if_empty()
            .extend(["projects", self.project_id.as_str(), "databases", "(default)", "documents", COLLECTION, id]);
        Ok(url)
    }
}

fn transport(e: reqwest::Error) -> ServiceError {
    ServiceError::unavailable(KIND, e.without_url())
}

#[async_trait]
impl MapStore for FirestoreStore {
    fn kind(&self) -> &'static str {
        KIND
    }

    async fn get(&self, id: &str) -> Result<Option<MapRecord>, ServiceError> {
        if id.is_empty() {
            return Ok(None);
        }
        let token = self.tokens.access_token().await?;
        let resp = self
            .client
            .get(self.document_url(id)?)
            .bearer_auth(token)
            .send()
            .await
            .map_err(transport)?;
        let status = resp.status();
        debug!(backend = KIND, map_id = %id, %status, "get document");
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ServiceError::unavailable(KIND, format!("get document returned {status}")));
        }
        let doc: Document = resp.json().await.map_err(transport)?;
        codec::from_firestore_fields(id, &doc.fields).map_err(|e| ServiceError::unavailable(KIND, e))
    }

    async fn put(&self, id: &str, record: &MapRecord) -> Result<(), ServiceError> {
        if id.is_empty() {
            return Err(ServiceError::Validation("Map ID required".into()));
        }
        let token = self.tokens.access_token().await?;
        let body = json!({ "fields": codec::to_firestore_fields(record) });
        let resp = self
            .client
            .patch(self.document_url(id)?)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        let status = resp.status();
        debug!(backend = KIND, map_id = %id, %status, "patch document");
        if !status.is_success() {
            return Err(ServiceError::unavailable(KIND, format!("patch document returned {status}")));
        }
        Ok(())
    }
}
