//! Backend selection and the process-wide lazily initialized handle.

use std::sync::Arc;

use async_trait::async_trait;
use configs::{BackendKind, StorageConfig};
use models::MapRecord;
use tokio::sync::OnceCell;
use tracing::info;

use super::{FirestoreStore, MapStore, MemoryMapStore, RealtimeDbStore, SqliteMapStore};
use crate::errors::ServiceError;

/// Build the backend named by `cfg.backend`.
pub async fn connect(cfg: &StorageConfig) -> Result<Arc<dyn MapStore>, ServiceError> {
    cfg.validate().map_err(|e| ServiceError::Config(e.to_string()))?;
    let store: Arc<dyn MapStore> = match cfg.backend {
        BackendKind::Sqlite => Arc::new(SqliteMapStore::connect(&cfg.database).await?),
        BackendKind::Realtime => Arc::new(RealtimeDbStore::from_config(&cfg.realtime, cfg.timeout()).await?),
        BackendKind::Firestore => Arc::new(FirestoreStore::from_config(&cfg.firestore, cfg.timeout()).await?),
        BackendKind::Memory => Arc::new(MemoryMapStore::default()),
    };
    info!(backend = store.kind(), "storage backend ready");
    Ok(store)
}

/// Backend handle created on first use and shared afterwards.
///
/// Concurrent first callers wait on the same initialization; a failed
/// initialization is not cached, so the next caller retries.
pub struct LazyBackend {
    config: StorageConfig,
    cell: OnceCell<Arc<dyn MapStore>>,
}

impl LazyBackend {
    pub fn new(config: StorageConfig) -> Self {
        Self { config, cell: OnceCell::new() }
    }

    pub async fn handle(&self) -> Result<Arc<dyn MapStore>, ServiceError> {
        self.cell
            .get_or_try_init(|| connect(&self.config))
            .await
            .map(Arc::clone)
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }
}

#[async_trait]
impl MapStore for LazyBackend {
    fn kind(&self) -> &'static str {
        match self.cell.get() {
            Some(store) => store.kind(),
            None => self.config.backend.as_str(),
        }
    }

    async fn get(&self, id: &str) -> Result<Option<MapRecord>, ServiceError> {
        self.handle().await?.get(id).await
    }

    async fn put(&self, id: &str, record: &MapRecord) -> Result<(), ServiceError> {
        self.handle().await?.put(id, record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use configs::{RealtimeConfig, FirestoreConfig};
    use serde_json::Map;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_use_builds_one_store() {
        let lazy = Arc::new(LazyBackend::new(StorageConfig::memory()));
        assert!(!lazy.is_initialized());

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let lazy = lazy.clone();
            tasks.push(tokio::spawn(async move { lazy.handle().await.unwrap() }));
        }
        let mut handles = Vec::new();
        for t in tasks {
            handles.push(t.await.unwrap());
        }
        assert!(lazy.is_initialized());
        assert!(handles.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test]
    async fn writes_through_the_lazy_handle_persist() {
        let lazy = LazyBackend::new(StorageConfig::memory());
        let rec = MapRecord::new("m", vec![], Map::new(), None, "t");
        lazy.put("m", &rec).await.unwrap();
        assert_eq!(lazy.get("m").await.unwrap(), Some(rec));
        assert_eq!(lazy.kind(), "memory");
    }

    #[tokio::test]
    async fn missing_backend_settings_fail_and_are_retried() {
        let cfg = StorageConfig {
            backend: BackendKind::Realtime,
            realtime: RealtimeConfig::default(),
            ..StorageConfig::default()
        };
        let lazy = LazyBackend::new(cfg);
        assert!(matches!(lazy.handle().await, Err(ServiceError::Config(_))));
        assert!(!lazy.is_initialized());
        assert_eq!(lazy.kind(), "realtime");
        assert!(matches!(lazy.get("m").await, Err(ServiceError::Config(_))));
    }

    #[tokio::test]
    async fn firestore_without_credentials_is_config_error() {
        let cfg = StorageConfig {
            backend: BackendKind::Firestore,
            firestore: FirestoreConfig::default(),
            ..StorageConfig::default()
        };
        assert!(matches!(connect(&cfg).await, Err(ServiceError::Config(_))));
    }

    #[tokio::test]
    async fn sqlite_backend_connects_from_config() {
        let path = std::env::temp_dir().join(format!("hexmap_registry_{}.db", uuid::Uuid::new_v4()));
        let mut cfg = StorageConfig::default();
        cfg.database.url = format!("sqlite://{}?mode=rwc", path.display());
        let store = connect(&cfg).await.unwrap();
        assert_eq!(store.kind(), "sqlite");
        assert!(store.get("nothing").await.unwrap().is_none());
        let _ = std::fs::remove_file(path);
    }
}
