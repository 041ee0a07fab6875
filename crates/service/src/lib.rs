//! Storage layer for map records.
//! - `storage::MapStore` is the get/put contract every backend implements.
//! - `storage::registry::LazyBackend` builds the process-wide backend once.
//! - `storage::serialized::SerializedStore` serializes all backend calls.

pub mod errors;
pub mod metrics;
pub mod storage;
#[cfg(test)]
pub mod test_support;

pub use errors::ServiceError;
pub use storage::MapStore;
