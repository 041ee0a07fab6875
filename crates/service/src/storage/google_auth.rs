//! OAuth2 access tokens from a Google service-account key.
//!
//! The key signs a short-lived RS256 assertion which is exchanged at the
//! key's `token_uri` for a bearer token. Tokens are cached until shortly
//! before they expire.

use std::{
    path::Path,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::errors::ServiceError;

pub const DATABASE_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/firebase.database",
    "https://www.googleapis.com/auth/userinfo.email",
];
pub const DATASTORE_SCOPES: &[&str] = &["https://www.googleapis.com/auth/datastore"];

const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: u64 = 3600;
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".into()
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub project_id: Option<String>,
}

impl ServiceAccountKey {
    /// Read a credential file. Missing or malformed files are configuration errors.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self, ServiceError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            ServiceError::Config(format!("cannot read credentials {}: {e}", path.display()))
        })?;
        serde_json::from_slice(&bytes).map_err(|e| {
            ServiceError::Config(format!("invalid credentials {}: {e}", path.display()))
        })
    }
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

pub struct TokenSource {
    key: ServiceAccountKey,
    scope: String,
    encoding_key: EncodingKey,
    client: reqwest::Client,
    backend: &'static str,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenSource {
    pub fn new(
        key: ServiceAccountKey,
        scopes: &[&str],
        timeout: Duration,
        backend: &'static str,
    ) -> Result<Self, ServiceError> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| ServiceError::Config(format!("invalid service account private key: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Config(format!("cannot build http client: {e}")))?;
        Ok(Self {
            key,
            scope: scopes.join(" "),
            encoding_key,
            client,
            backend,
            cached: Mutex::new(None),
        })
    }

    pub fn project_id(&self) -> Option<&str> {
        self.key.project_id.as_deref()
    }

    /// A valid bearer token, fetched only when the cached one is about to expire.
    pub async fn access_token(&self) -> Result<String, ServiceError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() + REFRESH_MARGIN {
                return Ok(token.access_token.clone());
            }
        }
        let fresh = self.fetch().await?;
        let token = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    async fn fetch(&self) -> Result<CachedToken, ServiceError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| ServiceError::unavailable(self.backend, e))?
            .as_secs();
        let claims = Claims {
            iss: &self.key.client_email,
            scope: &self.scope,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|e| ServiceError::unavailable(self.backend, e))?;

        debug!(backend = self.backend, client_email = %self.key.client_email, "requesting access token");
        let resp = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", GRANT_TYPE), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| ServiceError::unavailable(self.backend, e.without_url()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ServiceError::unavailable(
                self.backend,
                format!("token exchange returned {status}"),
            ));
        }
        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| ServiceError::unavailable(self.backend, e.without_url()))?;
        Ok(CachedToken {
            access_token: body.access_token,
            expires_at: Instant::now() + Duration::from_secs(body.expires_in),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use axum::{routing::post, Form, Json, Router};
    use serde_json::json;

    use crate::test_support::{service_account, spawn, spawn_token_server};

    #[derive(Deserialize)]
    struct TokenForm {
        grant_type: String,
        assertion: String,
    }

    #[tokio::test]
    async fn token_is_fetched_once_and_cached() -> Result<(), anyhow::Error> {
        let (uri, calls) = spawn_token_server().await;
        let source = TokenSource::new(service_account(uri), DATASTORE_SCOPES, Duration::from_secs(5), "firestore")?;

        assert_eq!(source.access_token().await?, "token-0");
        assert_eq!(source.access_token().await?, "token-0");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.project_id(), Some("test-project"));
        Ok(())
    }

    #[tokio::test]
    async fn exchange_posts_a_signed_jwt_bearer_grant() -> Result<(), anyhow::Error> {
        let app = Router::new().route(
            "/token",
            post(|Form(form): Form<TokenForm>| async move {
                let ok = form.grant_type == GRANT_TYPE && form.assertion.split('.').count() == 3;
                let token = if ok { "well-formed" } else { "malformed" };
                Json(json!({"access_token": token, "expires_in": 3600}))
            }),
        );
        let base = spawn(app).await;
        let source = TokenSource::new(
            service_account(format!("{base}/token")),
            DATABASE_SCOPES,
            Duration::from_secs(5),
            "realtime",
        )?;
        assert_eq!(source.access_token().await?, "well-formed");
        Ok(())
    }

    #[tokio::test]
    async fn rejected_exchange_is_unavailable() -> Result<(), anyhow::Error> {
        let app = Router::new().route(
            "/token",
            post(|| async { (axum::http::StatusCode::UNAUTHORIZED, "invalid_grant") }),
        );
        let base = spawn(app).await;
        let source = TokenSource::new(
            service_account(format!("{base}/token")),
            DATASTORE_SCOPES,
            Duration::from_secs(5),
            "firestore",
        )?;
        assert!(matches!(source.access_token().await, Err(ServiceError::Unavailable { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_token_endpoint_is_unavailable() -> Result<(), anyhow::Error> {
        let source = TokenSource::new(
            service_account("http://127.0.0.1:9/token".into()),
            DATASTORE_SCOPES,
            Duration::from_secs(2),
            "firestore",
        )?;
        assert!(matches!(source.access_token().await, Err(ServiceError::Unavailable { .. })));
        Ok(())
    }

    #[test]
    fn bad_private_key_is_config_error() {
        let mut k = service_account("http://localhost/token".into());
        k.private_key = "not a pem".into();
        assert!(matches!(
            TokenSource::new(k, DATASTORE_SCOPES, Duration::from_secs(1), "firestore"),
            Err(ServiceError::Config(_))
        ));
    }

    #[tokio::test]
    async fn missing_credentials_file_is_config_error() {
        let err = ServiceAccountKey::load("/nonexistent/sa.json").await.unwrap_err();
        assert!(matches!(err, ServiceError::Config(_)));
    }
}
