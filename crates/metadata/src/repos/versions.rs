//! Version repository.

use crate::error::MetadataResult;
use async_trait::async_trait;
use depot_core::Version;

/// Repository for version operations.
///
/// Version listings are ordered by name, which is creation order.
#[async_trait]
pub trait VersionRepo: Send + Sync {
    /// Create an unpublished version and return its name.
    async fn create_version(&self, namespace: &str, container: &str) -> MetadataResult<String>;

    /// Name of the most recent published version.
    async fn get_latest_published_version_by_container(
        &self,
        namespace: &str,
        container: &str,
    ) -> MetadataResult<String>;

    async fn list_all_versions_by_container(
        &self,
        namespace: &str,
        container: &str,
    ) -> MetadataResult<Vec<Version>>;

    async fn list_published_versions_by_container(
        &self,
        namespace: &str,
        container: &str,
    ) -> MetadataResult<Vec<Version>>;

    async fn list_published_versions_by_container_and_page(
        &self,
        namespace: &str,
        container: &str,
        offset: u64,
        limit: u64,
    ) -> MetadataResult<(u64, Vec<Version>)>;

    async fn list_unpublished_versions_by_container(
        &self,
        namespace: &str,
        container: &str,
    ) -> MetadataResult<Vec<Version>>;

    /// Publish a version. Publishing an already published version is a no-op.
    async fn mark_version_published(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
    ) -> MetadataResult<()>;

    /// Delete a version and its objects.
    async fn delete_version(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
    ) -> MetadataResult<()>;

    /// Delete a version and its objects only while it is still unpublished.
    ///
    /// Returns `NotFound` if the version is missing or has been published.
    async fn delete_unpublished_version(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
    ) -> MetadataResult<()>;
}
