//! Tree-database backend over the Firebase Realtime Database REST API.
//!
//! Each record is the node `maps/<id>.json` under the database root. Reads of
//! a missing node come back as `404` or a `null` body; both mean "no record".

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use configs::RealtimeConfig;
use models::{record::normalize, MapRecord};
use reqwest::{RequestBuilder, StatusCode, Url};
use tracing::{debug, warn};

use super::{
    google_auth::{ServiceAccountKey, TokenSource, DATABASE_SCOPES},
    MapStore,
};
use crate::errors::ServiceError;

const KIND: &str = "realtime";

/// How requests to the database are authenticated.
pub enum TreeAuth {
    /// Public or rules-open database.
    None,
    /// Legacy database secret, appended as `?auth=<secret>`.
    Secret(String),
    /// Admin access with a service-account bearer token.
    ServiceAccount(Arc<TokenSource>),
}

pub struct RealtimeDbStore {
    client: reqwest::Client,
    base: Url,
    auth: TreeAuth,
}

/// Ensure the base URL ends with a slash so node paths append under it.
pub fn normalise_base_url(url: &str) -> String {
    let url = url.trim();
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}

impl RealtimeDbStore {
    pub fn new(base_url: &str, auth: TreeAuth, timeout: Duration) -> Result<Self, ServiceError> {
        let base = Url::parse(&normalise_base_url(base_url))
            .map_err(|e| ServiceError::Config(format!("invalid realtime database url {base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(ServiceError::Config(format!("realtime database url {base_url} cannot be a base")));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Config(format!("cannot build http client: {e}")))?;
        Ok(Self { client, base, auth })
    }

    /// Secret wins over a credential file; with neither the database is accessed unauthenticated.
    pub async fn from_config(cfg: &RealtimeConfig, timeout: Duration) -> Result<Self, ServiceError> {
        cfg.validate().map_err(|e| ServiceError::Config(e.to_string()))?;
        let secret = cfg.secret.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let credentials = cfg.credentials_path.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let auth = match (secret, credentials) {
            (Some(secret), _) => TreeAuth::Secret(secret.to_string()),
            (None, Some(path)) => {
                let key = ServiceAccountKey::load(path).await?;
                TreeAuth::ServiceAccount(Arc::new(TokenSource::new(key, DATABASE_SCOPES, timeout, KIND)?))
            }
            (None, None) => {
                warn!(backend = KIND, "no database secret or credentials configured; using unauthenticated access");
                TreeAuth::None
            }
        };
        Self::new(&cfg.url, auth, timeout)
    }

    pub fn node_url(&self, id: &str) -> Result<Url, ServiceError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ServiceError::Config("realtime database url cannot be a base".into()))?
            .pop_if_empty()
            .push("maps")
            .push(&format!("{id}.json"));
        if let TreeAuth::Secret(secret) = &self.auth {
            url.query_pairs_mut().append_pair("auth", secret);
        }
        Ok(url)
    }

    async fn authorize(&self, req: RequestBuilder) -> Result<RequestBuilder, ServiceError> {
        match &self.auth {
            TreeAuth::ServiceAccount(tokens) => Ok(req.bearer_auth(tokens.access_token().await?)),
            TreeAuth::None | TreeAuth::Secret(_) => Ok(req),
        }
    }
}

fn transport(e: reqwest::Error) -> ServiceError {
    // The URL may carry the database secret.
    ServiceError::unavailable(KIND, e.without_url())
}

#[async_trait]
impl MapStore for RealtimeDbStore {
    fn kind(&self) -> &'static str {
        KIND
    }

    async fn get(&self, id: &str) -> Result<Option<MapRecord>, ServiceError> {
        if id.is_empty() {
            return Ok(None);
        }
        let req = self.authorize(self.client.get(self.node_url(id)?)).await?;
        let resp = req.send().await.map_err(transport)?;
        let status = resp.status();
        debug!(backend = KIND, map_id = %id, %status, "GET node");
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ServiceError::unavailable(KIND, format!("GET returned {status}")));
        }
        let body = resp.bytes().await.map_err(transport)?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        let raw: serde_json::Value =
            serde_json::from_slice(&body).map_err(|e| ServiceError::unavailable(KIND, e))?;
        normalize(Some(raw), id).map_err(|e| ServiceError::unavailable(KIND, e))
    }

    async fn put(&self, id: &str, record: &MapRecord) -> Result<(), ServiceError> {
        if id.is_empty() {
            return Err(ServiceError::Validation("Map ID required".into()));
        }
        let req = self.authorize(self.client.put(self.node_url(id)?)).await?;
        let resp = req.json(&record.to_value()).send().await.map_err(transport)?;
        let status = resp.status();
        debug!(backend = KIND, map_id = %id, %status, "PUT node");
        if !status.is_success() {
            return Err(ServiceError::unavailable(KIND, format!("PUT returned {status}")));
        }
        Ok(())
    }
}
