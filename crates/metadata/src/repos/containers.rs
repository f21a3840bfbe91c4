//! Container repository.

use crate::error::MetadataResult;
use async_trait::async_trait;
use depot_core::Container;
use time::Duration;

/// Repository for container operations.
#[async_trait]
pub trait ContainerRepo: Send + Sync {
    /// Create a container in a namespace. A negative TTL retains versions forever.
    async fn create_container(
        &self,
        namespace: &str,
        name: &str,
        versions_ttl: Duration,
    ) -> MetadataResult<()>;

    /// Rename a container and/or move it to another namespace in one update.
    async fn rename_container(
        &self,
        namespace: &str,
        old_name: &str,
        new_namespace: &str,
        new_name: &str,
    ) -> MetadataResult<()>;

    /// Change the retention of a container's versions.
    async fn set_container_versions_ttl(
        &self,
        namespace: &str,
        name: &str,
        versions_ttl: Duration,
    ) -> MetadataResult<()>;

    /// List all containers of a namespace ordered by name.
    async fn list_containers(&self, namespace: &str) -> MetadataResult<Vec<Container>>;

    /// List one page of containers. Returns the total count and the page.
    async fn list_containers_by_page(
        &self,
        namespace: &str,
        offset: u64,
        limit: u64,
    ) -> MetadataResult<(u64, Vec<Container>)>;

    /// Delete a container together with its versions and objects.
    async fn delete_container(&self, namespace: &str, name: &str) -> MetadataResult<()>;
}
