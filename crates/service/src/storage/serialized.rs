//! Write serialization around a backend.
//!
//! Every get and put goes through one process-wide lock, so at most one
//! backend call is in flight at a time. With [`LockScope::PerId`] calls for
//! different ids may overlap while calls for the same id still queue.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use configs::LockScope;
use dashmap::DashMap;
use models::MapRecord;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use super::MapStore;
use crate::{errors::ServiceError, metrics};

enum Gate {
    Global(Arc<Mutex<()>>),
    PerId(DashMap<String, Arc<Mutex<()>>>),
}

pub struct SerializedStore {
    inner: Arc<dyn MapStore>,
    gate: Gate,
    timeout: Duration,
}

impl SerializedStore {
    pub fn new(inner: Arc<dyn MapStore>, scope: LockScope, timeout: Duration) -> Self {
        let gate = match scope {
            LockScope::Global => Gate::Global(Arc::new(Mutex::new(()))),
            LockScope::PerId => Gate::PerId(DashMap::new()),
        };
        Self { inner, gate, timeout }
    }

    async fn acquire(&self, id: &str) -> OwnedMutexGuard<()> {
        let lock = match &self.gate {
            Gate::Global(lock) => lock.clone(),
            Gate::PerId(locks) => locks.entry(id.to_string()).or_default().clone(),
        };
        lock.lock_owned().await
    }

    fn release(&self, id: &str, guard: OwnedMutexGuard<()>) {
        drop(guard);
        if let Gate::PerId(locks) = &self.gate {
            // Only the table holds the lock once nobody is waiting on it.
            locks.remove_if(id, |_, lock| Arc::strong_count(lock) == 1);
        }
    }

    /// Run `call` under the lock with the configured timeout; lock wait is not timed.
    async fn run<T, F>(&self, op: &'static str, id: &str, call: F) -> Result<T, ServiceError>
    where
        F: std::future::Future<Output = Result<T, ServiceError>>,
    {
        let backend = self.inner.kind();
        let guard = self.acquire(id).await;
        let started = Instant::now();
        let result = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ServiceError::unavailable(
                backend,
                format!("{op} timed out after {:?}", self.timeout),
            )),
        };
        let elapsed = started.elapsed();
        self.release(id, guard);

        let outcome = match &result {
            Ok(_) => "ok",
            Err(ServiceError::Unavailable { source, .. }) => {
                warn!(backend, op, map_id = %id, error = %source, "backend call failed");
                "unavailable"
            }
            Err(_) => "error",
        };
        debug!(backend, op, map_id = %id, elapsed_ms = elapsed.as_millis() as u64, outcome, "backend call");
        metrics::record_op(backend, op, outcome, elapsed.as_secs_f64());
        result
    }
}

#[async_trait]
impl MapStore for SerializedStore {
    fn kind(&self) -> &'static str {
        self.inner.kind()
    }

    async fn get(&self, id: &str) -> Result<Option<MapRecord>, ServiceError> {
        self.run("get", id, self.inner.get(id)).await
    }

    async fn put(&self, id: &str, record: &MapRecord) -> Result<(), ServiceError> {
        self.run("put", id, self.inner.put(id, record)).await
    }
}
