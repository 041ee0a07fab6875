use std::net::SocketAddr;
use std::path::Path;

use axum::{
    extract::{ConnectInfo, DefaultBodyLimit, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tower_http::{
    cors::CorsLayer,
    services::ServeDir,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tower::ServiceExt;
use tracing::{error, Level};

use common::types::Health;

use crate::errors::JsonApiError;
use crate::state::AppState;

pub mod maps;

pub async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

async fn metrics() -> Result<Response, JsonApiError> {
    let text = service::metrics::encode_metrics().map_err(|e| {
        error!(error = %e, "metrics encoding failed");
        JsonApiError::internal()
    })?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        text,
    )
        .into_response())
}

async fn unknown_endpoint() -> JsonApiError {
    JsonApiError::not_found("Unknown endpoint")
}

/// Dot-files (`.env`, `.git/...`) are never served, encoded or not.
fn is_hidden(path: &str) -> bool {
    path.split('/').any(|seg| {
        seg.starts_with('.') || seg.get(..3).is_some_and(|p| p.eq_ignore_ascii_case("%2e"))
    })
}

/// Append one common-log-format line per request.
async fn access_log(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let client = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "-".to_string());
    let target = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let request_line = format!("{} {} {:?}", req.method(), target, req.version());

    let response = next.run(req).await;
    state
        .access_log
        .record(&client, &request_line, response.status().as_u16())
        .await;
    response
}

/// Build the application router: map API, health, metrics and static files.
pub fn build_router(state: AppState, cors: CorsLayer, static_dir: impl AsRef<Path>) -> Router {
    // Everything after `/maps/` is the id, slashes included; `/maps/` alone has none.
    let api = Router::new()
        .route(
            "/maps/*id",
            get(maps::get_map).put(maps::put_map).fallback(unknown_endpoint),
        )
        .route(
            "/maps/",
            get(maps::missing_id).put(maps::missing_id).fallback(unknown_endpoint),
        )
        .fallback(unknown_endpoint)
        // Map bodies are read whole, however large.
        .layer(DefaultBodyLimit::disable());

    let files = ServeDir::new(static_dir);
    let static_files = move |req: Request| {
        let files = files.clone();
        async move {
            if is_hidden(req.uri().path()) {
                return StatusCode::NOT_FOUND.into_response();
            }
            match files.oneshot(req).await {
                Ok(resp) => resp.into_response(),
                Err(never) => match never {},
            }
        }
    };

    Router::new()
        .nest("/api", api)
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .fallback(static_files)
        .layer(middleware::from_fn_with_state(state.clone(), access_log))
        .with_state(state)
        .layer(cors)
        .layer(
            // Span per request at INFO, failures (5xx) at ERROR.
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO).include_headers(false))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO).include_headers(false))
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        )
}
