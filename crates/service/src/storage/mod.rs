//! Storage backends for map records.
//!
//! Every backend implements [`MapStore`]. Which one serves the process is
//! decided once, from configuration, by [`registry::LazyBackend`].

use async_trait::async_trait;
use models::MapRecord;

use crate::errors::ServiceError;

pub mod firestore;
pub mod google_auth;
pub mod memory;
pub mod realtime;
pub mod registry;
pub mod serialized;
pub mod sqlite;

/// Get/put contract shared by all backends.
///
/// - `get` returns `Ok(None)` when no record exists; that is not an error.
/// - `put` is an unconditional upsert that either fully replaces the record
///   or fails leaving the previous value in place.
/// - Transport, auth and decoding failures are `ServiceError::Unavailable`.
#[async_trait]
pub trait MapStore: Send + Sync {
    /// Short backend name used in logs and metrics.
    fn kind(&self) -> &'static str;

    async fn get(&self, id: &str) -> Result<Option<MapRecord>, ServiceError>;

    /// `record.map_id` is expected to equal `id`.
    async fn put(&self, id: &str, record: &MapRecord) -> Result<(), ServiceError>;
}

pub use firestore::FirestoreStore;
pub use memory::MemoryMapStore;
pub use realtime::{RealtimeDbStore, TreeAuth};
pub use registry::LazyBackend;
pub use serialized::SerializedStore;
pub use sqlite::SqliteMapStore;
