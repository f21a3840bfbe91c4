//! Blob repository.

use crate::error::MetadataResult;
use async_trait::async_trait;
use depot_core::Blob;
use time::OffsetDateTime;

/// Repository for blob operations.
#[async_trait]
pub trait BlobRepo: Send + Sync {
    /// Register a blob. Fails with `Conflict` if (checksum, size) is already known.
    async fn create_blob(&self, checksum: &str, size: u64, mime_type: &str) -> MetadataResult<()>;

    /// Checksum of the blob an object points at.
    async fn get_blob_key_by_object(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
        key: &str,
    ) -> MetadataResult<String>;

    /// The blob an object points at.
    async fn get_blob_by_object(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
        key: &str,
    ) -> MetadataResult<Blob>;

    /// Succeeds if a blob with this checksum and size is registered, `NotFound` otherwise.
    async fn ensure_blob_key(&self, checksum: &str, size: u64) -> MetadataResult<()>;

    /// Blobs no object references that were registered before `older_than`, oldest first.
    async fn list_orphaned_blobs(
        &self,
        older_than: OffsetDateTime,
        limit: u64,
    ) -> MetadataResult<Vec<Blob>>;

    /// Delete a blob if it is still unreferenced. Returns whether a row was removed.
    async fn delete_blob_if_orphaned(&self, checksum: &str, size: u64) -> MetadataResult<bool>;

    /// Delete interned object keys no object references. Returns the number removed.
    async fn delete_orphaned_object_keys(&self) -> MetadataResult<u64>;
}
