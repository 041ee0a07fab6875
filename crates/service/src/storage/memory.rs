use std::collections::HashMap;

use async_trait::async_trait;
use models::MapRecord;
use tokio::sync::RwLock;

use super::MapStore;
use crate::errors::ServiceError;

/// Process-local store for tests and local development.
#[derive(Default)]
pub struct MemoryMapStore {
    records: RwLock<HashMap<String, MapRecord>>,
}

#[async_trait]
impl MapStore for MemoryMapStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, id: &str) -> Result<Option<MapRecord>, ServiceError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn put(&self, id: &str, record: &MapRecord) -> Result<(), ServiceError> {
        if id.is_empty() {
            return Err(ServiceError::Validation("Map ID required".into()));
        }
        self.records.write().await.insert(id.to_string(), record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn memory_store_upserts() -> Result<(), anyhow::Error> {
        let store = MemoryMapStore::default();
        assert!(store.get("a").await?.is_none());

        let first = MapRecord::new("a", vec![json!(1), json!(2)], Default::default(), None, "t1");
        store.put("a", &first).await?;
        assert_eq!(store.get("a").await?, Some(first));

        let second = MapRecord::new("a", vec![], Default::default(), Some(json!({"w": 1})), "t2");
        store.put("a", &second).await?;
        assert_eq!(store.get("a").await?, Some(second));
        assert_eq!(store.records.read().await.len(), 1);
        Ok(())
    }
}
