//! Blob store collaborator for depot.
//!
//! The archive never moves bytes itself. This crate hands out signed URLs
//! clients use to upload and download blob bytes directly against an
//! S3-compatible bucket.

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::s3::S3Backend;
pub use error::{StorageError, StorageResult};
pub use traits::BlobStore;

use depot_core::config::StorageConfig;
use std::sync::Arc;

/// Create a blob store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn BlobStore>> {
    config.validate().map_err(StorageError::Config)?;

    let backend = S3Backend::new(
        &config.bucket,
        config.endpoint.clone(),
        config.region.clone(),
        config.prefix.clone(),
        config.access_key_id.clone(),
        config.secret_access_key.clone(),
        config.force_path_style,
        config.url_ttl(),
    )
    .await?;
    Ok(Arc::new(backend))
}
