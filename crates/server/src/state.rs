//! Application state shared across handlers.

use crate::manager::Manager;
use depot_core::config::AppConfig;
use depot_metadata::MetadataStore;
use depot_storage::BlobStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Uncached metadata store, used for health checks.
    pub metadata: Arc<dyn MetadataStore>,
    /// Manager service over the cached metadata store.
    pub manager: Arc<Manager>,
}

impl AppState {
    /// Build the state. `metadata` should be the raw store; the manager gets a
    /// cached view of it when caching is enabled.
    pub fn new(
        config: AppConfig,
        metadata: Arc<dyn MetadataStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        let cached = depot_metadata::with_cache(metadata.clone(), &config.cache);
        let manager = Arc::new(Manager::new(
            cached,
            blobs,
            config.pagination.clone(),
        ));

        Self {
            config: Arc::new(config),
            metadata,
            manager,
        }
    }
}
