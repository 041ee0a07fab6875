//! Relational backend: one row per map id in SQLite through sea-orm.

use async_trait::async_trait;
use configs::DatabaseConfig;
use models::{db, map_record, MapRecord};
use sea_orm::DatabaseConnection;
use tracing::debug;

use super::MapStore;
use crate::errors::ServiceError;

const KIND: &str = "sqlite";

pub struct SqliteMapStore {
    db: DatabaseConnection,
}

impl SqliteMapStore {
    /// Open the pool and run migrations. A bad URL is a configuration error.
    pub async fn connect(cfg: &DatabaseConfig) -> Result<Self, ServiceError> {
        cfg.validate().map_err(|e| ServiceError::Config(e.to_string()))?;
        let db = db::connect_with_config(cfg)
            .await
            .map_err(|e| ServiceError::unavailable(KIND, e))?;
        Ok(Self { db })
    }
}

#[async_trait]
impl MapStore for SqliteMapStore {
    fn kind(&self) -> &'static str {
        KIND
    }

    async fn get(&self, id: &str) -> Result<Option<MapRecord>, ServiceError> {
        debug!(backend = KIND, map_id = %id, "select map_record");
        map_record::find(&self.db, id).await.map_err(|e| ServiceError::unavailable(KIND, e))
    }

    async fn put(&self, id: &str, record: &MapRecord) -> Result<(), ServiceError> {
        debug!(backend = KIND, map_id = %id, "upsert map_record");
        map_record::upsert(&self.db, id, record).await.map_err(|e| match e {
            models::errors::ModelError::Validation(msg) => ServiceError::Validation(msg),
            other => ServiceError::unavailable(KIND, other),
        })
    }
}
