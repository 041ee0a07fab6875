use std::sync::Arc;

use common::utils::access_log::AccessLog;
use service::MapStore;

/// Shared handler state; cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Serialized, lazily initialized backend.
    pub store: Arc<dyn MapStore>,
    pub access_log: Arc<AccessLog>,
}

impl AppState {
    pub fn new(store: Arc<dyn MapStore>, access_log: Arc<AccessLog>) -> Self {
        Self { store, access_log }
    }
}
