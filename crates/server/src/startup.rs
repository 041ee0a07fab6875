use std::{net::SocketAddr, sync::Arc};

use axum::Router;
use common::{
    env::{ensure_env, ensure_not_served},
    utils::access_log::AccessLog,
};
use configs::AppConfig;
use service::{
    storage::{LazyBackend, SerializedStore},
    MapStore,
};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::errors::StartupError;
use crate::routes;
use crate::state::AppState;

fn build_cors() -> CorsLayer {
    CorsLayer::very_permissive()
}

async fn open_access_log(cfg: &AppConfig) -> Arc<AccessLog> {
    let path = cfg.server.access_log_path();
    match AccessLog::open(&path).await {
        Ok(log) => Arc::new(log),
        Err(e) => {
            warn!(%path, error = %e, "access log unavailable; requests will not be logged to file");
            Arc::new(AccessLog::disabled())
        }
    }
}

/// Initialize the backend now so a serving process never runs without one.
pub async fn init_storage(cfg: &AppConfig) -> Result<Arc<dyn MapStore>, StartupError> {
    let lazy = Arc::new(LazyBackend::new(cfg.storage.clone()));
    lazy.handle().await?;
    info!(
        backend = %cfg.storage.backend,
        lock_scope = ?cfg.storage.lock_scope,
        timeout_secs = cfg.storage.timeout_secs,
        "storage initialized"
    );
    Ok(Arc::new(SerializedStore::new(
        lazy,
        cfg.storage.lock_scope,
        cfg.storage.timeout(),
    )))
}

/// Build the app state and router from an already validated config.
pub async fn build_app(cfg: &AppConfig) -> Result<Router, StartupError> {
    ensure_env(&cfg.server.static_dir, &cfg.server.data_dir).await?;
    ensure_not_served(
        &cfg.server.static_dir,
        &[
            cfg.server.data_dir.clone(),
            cfg.server.access_log_path(),
            configs::config_path(),
            ".env".to_string(),
        ],
    )
    .await?;
    let store = init_storage(cfg).await?;
    let access_log = open_access_log(cfg).await;
    let state = AppState::new(store, access_log);
    Ok(routes::build_router(state, build_cors(), &cfg.server.static_dir))
}

/// Public entry: build the app and run the HTTP server until it fails.
pub async fn run(cfg: AppConfig) -> anyhow::Result<()> {
    let app = build_app(&cfg).await?;

    let wanted = format!("{}:{}", cfg.server.host, cfg.server.port);
    let listener = tokio::net::TcpListener::bind(wanted.as_str())
        .await
        .map_err(|source| StartupError::Bind { addr: wanted.clone(), source })?;
    let addr = listener.local_addr()?;
    info!(%addr, static_dir = %cfg.server.static_dir, "serving hex map API");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
