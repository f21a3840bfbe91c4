//! Read-through caching decorator for a [`MetadataStore`].
//!
//! Expensive, slowly changing reads are served from a [`MetadataCache`] keyed
//! by operation name and serialized arguments. Entries live for a fixed TTL;
//! mutations go straight to the wrapped store and do not invalidate anything,
//! so readers may observe state up to one TTL old.
//!
//! Cache failures never fail a read: they are logged and the wrapped store is
//! queried directly.

use crate::cache::MetadataCache;
use crate::error::MetadataResult;
use crate::repos::{BlobRepo, ContainerRepo, NamespaceRepo, ObjectRepo, StatsRepo, VersionRepo};
use crate::store::MetadataStore;
use async_trait::async_trait;
use depot_core::{Blob, Container, Stats, Version};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

/// Build the cache key for an operation and its arguments.
pub fn cache_key<A: Serialize>(operation: &str, args: &A) -> MetadataResult<String> {
    Ok(format!("{operation}:{}", serde_json::to_string(args)?))
}

/// Metadata store wrapper adding bounded-staleness caching to list operations.
pub struct CachedStore {
    inner: Arc<dyn MetadataStore>,
    cache: Arc<dyn MetadataCache>,
    ttl: Duration,
}

impl CachedStore {
    pub fn new(inner: Arc<dyn MetadataStore>, cache: Arc<dyn MetadataCache>, ttl: Duration) -> Self {
        Self { inner, cache, ttl }
    }

    /// The wrapped, uncached store.
    pub fn inner(&self) -> &Arc<dyn MetadataStore> {
        &self.inner
    }

    async fn read_through<A, T, F, Fut>(&self, operation: &str, args: A, load: F) -> MetadataResult<T>
    where
        A: Serialize + Send,
        T: Serialize + DeserializeOwned + Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = MetadataResult<T>> + Send,
    {
        let key = cache_key(operation, &args)?;

        match self.cache.get(&key).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<T>(&bytes) {
                Ok(value) => {
                    tracing::trace!(key = %key, "metadata cache hit");
                    return Ok(value);
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                }
            },
            Ok(None) => tracing::trace!(key = %key, "metadata cache miss"),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Metadata cache read failed, bypassing cache");
            }
        }

        let value = load().await?;

        match serde_json::to_vec(&value) {
            Ok(bytes) => {
                if let Err(e) = self.cache.set(&key, bytes, self.ttl).await {
                    tracing::warn!(key = %key, error = %e, "Metadata cache write failed");
                }
            }
            Err(e) => tracing::warn!(key = %key, error = %e, "Failed to serialize cache entry"),
        }

        Ok(value)
    }
}

#[async_trait]
impl MetadataStore for CachedStore {
    async fn migrate(&self) -> MetadataResult<()> {
        self.inner.migrate().await
    }

    async fn health_check(&self) -> MetadataResult<()> {
        self.inner.health_check().await
    }
}

#[async_trait]
impl NamespaceRepo for CachedStore {
    async fn create_namespace(&self, name: &str) -> MetadataResult<()> {
        self.inner.create_namespace(name).await
    }

    async fn rename_namespace(&self, old_name: &str, new_name: &str) -> MetadataResult<()> {
        self.inner.rename_namespace(old_name, new_name).await
    }

    async fn list_namespaces(&self) -> MetadataResult<Vec<String>> {
        self.read_through("list_namespaces", (), || self.inner.list_namespaces())
            .await
    }

    async fn delete_namespace(&self, name: &str) -> MetadataResult<()> {
        self.inner.delete_namespace(name).await
    }
}

#[async_trait]
impl ContainerRepo for CachedStore {
    async fn create_container(
        &self,
        namespace: &str,
        name: &str,
        versions_ttl: time::Duration,
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
        versions_ttl: time::Duration,
    ) -> MetadataResult<()> {
        self.inner
            .set_container_versions_ttl(namespace, name, versions_ttl)
            .await
    }

    async fn list_containers(&self, namespace: &str) -> MetadataResult<Vec<Container>> {
        self.read_through("list_containers", (namespace,), || {
            self.inner.list_containers(namespace)
        })
        .await
    }

    async fn list_containers_by_page(
        &self,
        namespace: &str,
        offset: u64,
        limit: u64,
    ) -> MetadataResult<(u64, Vec<Container>)> {
        self.read_through(
            "list_containers_by_page",
            (namespace, offset, limit),
            || self.inner.list_containers_by_page(namespace, offset, limit),
        )
        .await
    }

    async fn delete_container(&self, namespace: &str, name: &str) -> MetadataResult<()> {
        self.inner.delete_container(namespace, name).await
    }
}

#[async_trait]
impl VersionRepo for CachedStore {
    async fn create_version(&self, namespace: &str, container: &str) -> MetadataResult<String> {
        self.inner.create_version(namespace, container).await
    }

    async fn get_latest_published_version_by_container(
        &self,
        namespace: &str,
        container: &str,
    ) -> MetadataResult<String> {
        self.read_through(
            "get_latest_published_version_by_container",
            (namespace, container),
            || {
                self.inner
                    .get_latest_published_version_by_container(namespace, container)
            },
        )
        .await
    }

    async fn list_all_versions_by_container(
        &self,
        namespace: &str,
        container: &str,
    ) -> MetadataResult<Vec<Version>> {
        self.read_through(
            "list_all_versions_by_container",
            (namespace, container),
            || self.inner.list_all_versions_by_container(namespace, container),
        )
        .await
    }

    async fn list_published_versions_by_container(
        &self,
        namespace: &str,
        container: &str,
    ) -> MetadataResult<Vec<Version>> {
        self.read_through(
            "list_published_versions_by_container",
            (namespace, container),
            || {
                self.inner
                    .list_published_versions_by_container(namespace, container)
            },
        )
        .await
    }

    async fn list_published_versions_by_container_and_page(
        &self,
        namespace: &str,
        container: &str,
        offset: u64,
        limit: u64,
    ) -> MetadataResult<(u64, Vec<Version>)> {
        self.read_through(
            "list_published_versions_by_container_and_page",
            (namespace, container, offset, limit),
            || {
                self.inner.list_published_versions_by_container_and_page(
                    namespace, container, offset, limit,
                )
            },
        )
        .await
    }

    async fn list_unpublished_versions_by_container(
        &self,
        namespace: &str,
        container: &str,
    ) -> MetadataResult<Vec<Version>> {
        self.read_through(
            "list_unpublished_versions_by_container",
            (namespace, container),
            || {
                self.inner
                    .list_unpublished_versions_by_container(namespace, container)
            },
        )
        .await
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
        self.inner
            .delete_unpublished_version(namespace, container, version)
            .await
    }
}

#[async_trait]
impl ObjectRepo for CachedStore {
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
        self.read_through(
            "list_objects",
            (namespace, container, version, offset, limit),
            || {
                self.inner
                    .list_objects(namespace, container, version, offset, limit)
            },
        )
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
impl BlobRepo for CachedStore {
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
        self.read_through(
            "get_blob_key_by_object",
            (namespace, container, version, key),
            || {
                self.inner
                    .get_blob_key_by_object(namespace, container, version, key)
            },
        )
        .await
    }

    async fn get_blob_by_object(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
        key: &str,
    ) -> MetadataResult<Blob> {
        self.read_through(
            "get_blob_by_object",
            (namespace, container, version, key),
            || {
                self.inner
                    .get_blob_by_object(namespace, container, version, key)
            },
        )
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
impl StatsRepo for CachedStore {
    async fn count_stats(&self) -> MetadataResult<Stats> {
        self.inner.count_stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::cache_key;

    #[test]
    fn test_cache_key_includes_operation_and_arguments() {
        let key = cache_key("list_objects", &("ns", "c", "v", 0u64, 10u64)).unwrap();
        assert_eq!(key, r#"list_objects:["ns","c","v",0,10]"#);
    }

    #[test]
    fn test_cache_key_distinguishes_argument_boundaries() {
        let a = cache_key("list_containers_by_page", &("a:b", 0u64, 1u64)).unwrap();
        let b = cache_key("list_containers_by_page", &("a", 0u64, 1u64)).unwrap();
        assert_ne!(a, b);
    }
}
