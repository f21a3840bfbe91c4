//! Blob store trait.

use crate::error::StorageResult;
use async_trait::async_trait;

/// Issues time-limited signed URLs for blob bytes.
///
/// The store never reads or writes bytes itself and keeps no metadata; keys
/// are blob checksums.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Signed URL a client can PUT the bytes of `key` to.
    async fn put_blob_url(&self, key: &str) -> StorageResult<String>;

    /// Signed URL serving `key` with the given content type and download filename.
    async fn get_blob_url(&self, key: &str, mime_type: &str, filename: &str)
    -> StorageResult<String>;

    /// Check that the backing bucket is reachable with the configured credentials.
    async fn health_check(&self) -> StorageResult<()>;
}

/// Reject keys that cannot address an object.
pub(crate) fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(crate::error::StorageError::InvalidKey(
            "key must not be empty".to_string(),
        ));
    }
    if key.starts_with('/') || key.split('/').any(|segment| segment == "..") {
        return Err(crate::error::StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Build a `Content-Disposition` value offering `filename` as the download name.
pub(crate) fn content_disposition(filename: &str) -> String {
    let sanitized: String = filename
        .chars()
        .filter(|c| *c != '"' && *c != '\\' && !c.is_control())
        .collect();
    format!("attachment; filename=\"{sanitized}\"")
}
