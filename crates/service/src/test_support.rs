#![cfg(test)]
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use axum::{extract::State, routing::post, Json, Router};
use serde_json::json;

use crate::storage::google_auth::ServiceAccountKey;

pub const TEST_KEY: &str = include_str!("../tests/fixtures/test_service_account_key.pem");

/// Serve `app` on an ephemeral localhost port; returns `http://ip:port`.
pub async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            eprintln!("test server error: {}", e);
        }
    });
    format!("http://{}", addr)
}

async fn issue_token(State(calls): State<Arc<AtomicUsize>>) -> Json<serde_json::Value> {
    let n = calls.fetch_add(1, Ordering::SeqCst);
    Json(json!({"access_token": format!("token-{n}"), "expires_in": 3600, "token_type": "Bearer"}))
}

/// Fake OAuth token endpoint; returns its URL and a call counter.
pub async fn spawn_token_server() -> (String, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = Router::new().route("/token", post(issue_token)).with_state(calls.clone());
    let base = spawn(app).await;
    (format!("{base}/token"), calls)
}

pub fn service_account(token_uri: String) -> ServiceAccountKey {
    ServiceAccountKey {
        client_email: "labeler@test-project.iam.gserviceaccount.com".into(),
        private_key: TEST_KEY.into(),
        token_uri,
        project_id: Some("test-project".into()),
    }
}
