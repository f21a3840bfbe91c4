//! Object repository.

use crate::error::MetadataResult;
use async_trait::async_trait;

/// Repository for object operations.
#[async_trait]
pub trait ObjectRepo: Send + Sync {
    /// Point `key` in an unpublished version at the blob with `checksum`.
    ///
    /// Returns `NotFound` if the version is missing or already published, or if
    /// no blob with that checksum is registered.
    async fn create_object(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
        key: &str,
        checksum: &str,
    ) -> MetadataResult<()>;

    /// List one page of object keys ordered by key. Returns the total count and the page.
    async fn list_objects(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
        offset: u64,
        limit: u64,
    ) -> MetadataResult<(u64, Vec<String>)>;

    /// Delete objects by key. Keys that do not exist are ignored.
    async fn delete_object(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
        keys: &[String],
    ) -> MetadataResult<()>;

    /// Delete objects by key while their version is still unpublished.
    ///
    /// Returns `NotFound` if the version is missing or has been published.
    async fn delete_unpublished_objects(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
        keys: &[String],
    ) -> MetadataResult<()>;

    /// Re-point an existing object at another blob.
    async fn remap_object(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
        key: &str,
        new_checksum: &str,
    ) -> MetadataResult<()>;
}
