//! Metadata repository for the depot archive.
//!
//! This crate owns the relational bookkeeping:
//! - Namespaces, containers, versions and objects
//! - Deduplicated blobs and interned object keys
//! - Aggregate catalog statistics
//! - A read-through caching decorator with bounded staleness

pub mod cache;
pub mod cached;
pub mod error;
pub mod models;
pub mod postgres;
pub mod repos;
pub mod store;

pub use cache::{MemoryCache, MetadataCache};
pub use cached::CachedStore;
pub use error::{ErrorKind, MetadataError, MetadataResult};
pub use postgres::PostgresStore;
pub use store::{MetadataStore, SqliteStore};

use depot_core::config::{CacheConfig, MetadataConfig};
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    config.validate().map_err(MetadataError::Config)?;

    match config {
        MetadataConfig::Sqlite { path } => {
            let store = SqliteStore::new(path).await?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
        MetadataConfig::Postgres {
            url,
            host,
            port,
            username,
            password,
            database,
            ssl_mode,
            max_connections,
            statement_timeout_ms,
        } => {
            let store = if let Some(url) = url {
                tracing::info!("Connecting to PostgreSQL using connection URL");
                PostgresStore::from_url(url, *max_connections, *statement_timeout_ms).await?
            } else if let (Some(host), Some(database)) = (host.as_ref(), database.as_ref()) {
                PostgresStore::from_params(
                    host,
                    port.unwrap_or(5432),
                    username.as_deref(),
                    password.as_deref(),
                    database,
                    *ssl_mode,
                    *max_connections,
                    *statement_timeout_ms,
                )
                .await?
            } else {
                return Err(MetadataError::Config(
                    "postgres config requires either 'url' or 'host' + 'database'".to_string(),
                ));
            };
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
    }
}

/// Wrap `store` in a [`CachedStore`] backed by an in-process cache when caching is enabled.
pub fn with_cache(store: Arc<dyn MetadataStore>, config: &CacheConfig) -> Arc<dyn MetadataStore> {
    if !config.enabled {
        return store;
    }
    let cache = Arc::new(MemoryCache::new(config.max_entries, config.ttl()));
    Arc::new(CachedStore::new(store, cache, config.ttl()))
}
