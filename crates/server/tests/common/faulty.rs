//! Delegating metadata store that injects failures and interleavings.

use async_trait::async_trait;
use depot_core::{Blob, Container, Stats, Version};
use depot_metadata::repos::{
    BlobRepo, ContainerRepo, NamespaceRepo, ObjectRepo, StatsRepo, VersionRepo,
};
use depot_metadata::{MetadataError, MetadataResult, MetadataStore};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use time::{Duration, OffsetDateTime};

/// Wraps a real store. Version deletes in the configured containers fail, and
/// versions can be published right after they were listed as unpublished.
#[allow(dead_code)]
pub struct FaultyStore {
    inner: Arc<dyn MetadataStore>,
    failing_containers: Mutex<Vec<String>>,
    publish_after_listing: AtomicBool,
}

#[allow(dead_code)]
impl FaultyStore {
    pub fn new(inner: Arc<dyn MetadataStore>) -> Self {
        Self {
            inner,
            failing_containers: Mutex::new(Vec::new()),
            publish_after_listing: AtomicBool::new(false),
        }
    }

    /// Make version deletes in `container` fail with an internal error.
    pub fn fail_version_deletes_in(&self, container: &str) {
        self.failing_containers
            .lock()
            .unwrap()
            .push(container.to_string());
    }

    /// Publish every version right after it is returned by an unpublished listing.
    pub fn publish_after_listing(&self) {
        self.publish_after_listing.store(true, Ordering::SeqCst);
    }

    fn check_version_delete(&self, container: &str) -> MetadataResult<()> {
        if self
            .failing_containers
            .lock()
            .unwrap()
            .iter()
            .any(|c| c == container)
        {
            return Err(MetadataError::Internal(format!(
                "injected delete failure in '{container}'"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl NamespaceRepo for FaultyStore {
    async fn create_namespace(&self, name: &str) -> MetadataResult<()> {
        self.inner.create_namespace(name).await
    }

    async fn rename_namespace(&self, old_name: &str, new_name: &str) -> MetadataResult<()> {
        self.inner.rename_namespace(old_name, new_name).await
    }

    async fn list_namespaces(&self) -> MetadataResult<Vec<String>> {
        self.inner.list_namespaces().await
    }

    async fn delete_namespace(&self, name: &str) -> MetadataResult<()> {
        self.inner.delete_namespace(name).await
    }
}

#[async_trait]
impl ContainerRepo for FaultyStore {
    async fn create_container(
        &self,
        namespace: &str,
        name: &str,
        versions_ttl: Duration,
    ) -> MetadataResult<()> {
        self.inner
            .create_container(namespace, name, versions_ttl)
            .await
    }

    async fn rename_container(
        &self,
        namespace: &str,
        old_name: &str,
        new_namespace: &str,
        new_name: &str,
    ) -> MetadataResult<()> {
        self.inner
            .rename_container(namespace, old_name, new_namespace, new_name)
            .await
    }

    async fn set_container_versions_ttl(
        &self,
        namespace: &str,
        name: &str,
        versions_ttl: Duration,
    ) -> MetadataResult<()> {
        self.inner
            .set_container_versions_ttl(namespace, name, versions_ttl)
            .await
    }

    async fn list_containers(&self, namespace: &str) -> MetadataResult<Vec<Container>> {
        self.inner.list_containers(namespace).await
    }

    async fn list_containers_by_page(
        &self,
        namespace: &str,
        offset: u64,
        limit: u64,
    ) -> MetadataResult<(u64, Vec<Container>)> {
        self.inner
            .list_containers_by_page(namespace, offset, limit)
            .await
    }

    async fn delete_container(&self, namespace: &str, name: &str) -> MetadataResult<()> {
        self.inner.delete_container(namespace, name).await
    }
}

#[async_trait]
impl VersionRepo for FaultyStore {
    async fn create_version(&self, namespace: &str, container: &str) -> MetadataResult<String> {
        self.inner.create_version(namespace, container).await
    }

    async fn get_latest_published_version_by_container(
        &self,
        namespace: &str,
        container: &str,
    ) -> MetadataResult<String> {
        self.inner
            .get_latest_published_version_by_container(namespace, container)
            .await
    }

    async fn list_all_versions_by_container(
        &self,
        namespace: &str,
        container: &str,
    ) -> MetadataResult<Vec<Version>> {
        self.inner
            .list_all_versions_by_container(namespace, container)
            .await
    }

    async fn list_published_versions_by_container(
        &self,
        namespace: &str,
        container: &str,
    ) -> MetadataResult<Vec<Version>> {
        self.inner
            .list_published_versions_by_container(namespace, container)
            .await
    }

    async fn list_published_versions_by_container_and_page(
        &self,
        namespace: &str,
        container: &str,
        offset: u64,
        limit: u64,
    ) -> MetadataResult<(u64, Vec<Version>)> {
        self.inner
            .list_published_versions_by_container_and_page(namespace, container, offset, limit)
            .await
    }

    async fn list_unpublished_versions_by_container(
        &self,
        namespace: &str,
        container: &str,
    ) -> MetadataResult<Vec<Version>> {
        let versions = self
            .inner
            .list_unpublished_versions_by_container(namespace, container)
            .await?;
        if self.publish_after_listing.load(Ordering::SeqCst) {
            for version in &versions {
                self.inner
                    .mark_version_published(namespace, container, &version.name)
                    .await?;
            }
        }
        Ok(versions)
    }

    async fn mark_version_published(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
    ) -> MetadataResult<()> {
        self.inner
            .mark_version_published(namespace, container, version)
            .await
    }

    async fn delete_version(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
    ) -> MetadataResult<()> {
        self.check_version_delete(container)?;
        self.inner
            .delete_version(namespace, container, version)
            .await
    }

    async fn delete_unpublished_version(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
    ) -> MetadataResult<()> {
        self.check_version_delete(container)?;
        self.inner
            .delete_unpublished_version(namespace, container, version)
            .await
    }
}

#[async_trait]
impl ObjectRepo for FaultyStore {
    async fn create_object(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
        key: &str,
        checksum: &str,
    ) -> MetadataResult<()> {
        self.inner
            .create_object(namespace, container, version, key, checksum)
            .await
    }

    async fn list_objects(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
        offset: u64,
        limit: u64,
    ) -> MetadataResult<(u64, Vec<String>)> {
        self.inner
            .list_objects(namespace, container, version, offset, limit)
            .await
    }

    async fn delete_object(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
        keys: &[String],
    ) -> MetadataResult<()> {
        self.inner
            .delete_object(namespace, container, version, keys)
            .await
    }

    async fn delete_unpublished_objects(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
        keys: &[String],
    ) -> MetadataResult<()> {
        self.inner
            .delete_unpublished_objects(namespace, container, version, keys)
            .await
    }

    async fn remap_object(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
        key: &str,
        new_checksum: &str,
    ) -> MetadataResult<()> {
        self.inner
            .remap_object(namespace, container, version, key, new_checksum)
            .await
    }
}

#[async_trait]
impl BlobRepo for FaultyStore {
    async fn create_blob(&self, checksum: &str, size: u64, mime_type: &str) -> MetadataResult<()> {
        self.inner.create_blob(checksum, size, mime_type).await
    }

    async fn get_blob_key_by_object(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
        key: &str,
    ) -> MetadataResult<String> {
        self.inner
            .get_blob_key_by_object(namespace, container, version, key)
            .await
    }

    async fn get_blob_by_object(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
        key: &str,
    ) -> MetadataResult<Blob> {
        self.inner
            .get_blob_by_object(namespace, container, version, key)
            .await
    }

    async fn ensure_blob_key(&self, checksum: &str, size: u64) -> MetadataResult<()> {
        self.inner.ensure_blob_key(checksum, size).await
    }

    async fn list_orphaned_blobs(
        &self,
        older_than: OffsetDateTime,
        limit: u64,
    ) -> MetadataResult<Vec<Blob>> {
        self.inner.list_orphaned_blobs(older_than, limit).await
    }

    async fn delete_blob_if_orphaned(&self, checksum: &str, size: u64) -> MetadataResult<bool> {
        self.inner.delete_blob_if_orphaned(checksum, size).await
    }

    async fn delete_orphaned_object_keys(&self) -> MetadataResult<u64> {
        self.inner.delete_orphaned_object_keys().await
    }
}

#[async_trait]
impl StatsRepo for FaultyStore {
    async fn count_stats(&self) -> MetadataResult<Stats> {
        self.inner.count_stats().await
    }
}

#[async_trait]
impl MetadataStore for FaultyStore {
    async fn migrate(&self) -> MetadataResult<()> {
        self.inner.migrate().await
    }

    async fn health_check(&self) -> MetadataResult<()> {
        self.inner.health_check().await
    }
}
