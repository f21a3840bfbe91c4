//! Manager service: the operations transports expose to clients.
//!
//! [`AccessService`] covers reads, [`ManageService`] adds mutations. Both are
//! implemented by [`Manager`], which composes a metadata store (usually the
//! cached one) and a blob store that issues signed URLs.

use crate::error::{ServiceError, ServiceResult};
use crate::metrics;
use async_trait::async_trait;
use depot_core::config::PaginationConfig;
use depot_core::{Container, Version};
use depot_metadata::MetadataStore;
use depot_storage::BlobStore;
use std::sync::Arc;
use tracing::instrument;

/// Read-only operations.
#[async_trait]
pub trait AccessService: Send + Sync {
    async fn list_namespaces(&self) -> ServiceResult<Vec<String>>;

    async fn list_containers(&self, namespace: &str) -> ServiceResult<Vec<Container>>;

    /// One page of containers and the total count. A zero limit selects the default page size.
    async fn list_containers_by_page(
        &self,
        namespace: &str,
        offset: u64,
        limit: u64,
    ) -> ServiceResult<(u64, Vec<Container>)>;

    async fn get_latest_published_version(
        &self,
        namespace: &str,
        container: &str,
    ) -> ServiceResult<String>;

    async fn list_all_versions(&self, namespace: &str, container: &str)
    -> ServiceResult<Vec<Version>>;

    async fn list_published_versions(
        &self,
        namespace: &str,
        container: &str,
    ) -> ServiceResult<Vec<Version>>;

    async fn list_published_versions_by_page(
        &self,
        namespace: &str,
        container: &str,
        offset: u64,
        limit: u64,
    ) -> ServiceResult<(u64, Vec<Version>)>;

    async fn list_unpublished_versions(
        &self,
        namespace: &str,
        container: &str,
    ) -> ServiceResult<Vec<Version>>;

    async fn list_objects(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
        offset: u64,
        limit: u64,
    ) -> ServiceResult<(u64, Vec<String>)>;

    /// Checksum of the blob behind an object.
    async fn get_blob_key_by_object(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
        key: &str,
    ) -> ServiceResult<String>;

    /// Signed download URL for an object, served with the blob's content type
    /// and the key's last path segment as filename.
    async fn get_object_url(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
        key: &str,
    ) -> ServiceResult<String>;
}

/// Mutating operations.
#[async_trait]
pub trait ManageService: AccessService {
    async fn create_namespace(&self, name: &str) -> ServiceResult<()>;

    async fn rename_namespace(&self, old_name: &str, new_name: &str) -> ServiceResult<()>;

    async fn delete_namespace(&self, name: &str) -> ServiceResult<()>;

    async fn create_container(
        &self,
        namespace: &str,
        name: &str,
        versions_ttl: time::Duration,
    ) -> ServiceResult<()>;

    /// Rename a container, move it to `new_namespace`, or both.
    async fn rename_container(
        &self,
        namespace: &str,
        old_name: &str,
        new_namespace: &str,
        new_name: &str,
    ) -> ServiceResult<()>;

    async fn set_container_versions_ttl(
        &self,
        namespace: &str,
        name: &str,
        versions_ttl: time::Duration,
    ) -> ServiceResult<()>;

    async fn delete_container(&self, namespace: &str, name: &str) -> ServiceResult<()>;

    /// Create an unpublished version and return its name.
    async fn create_version(&self, namespace: &str, container: &str) -> ServiceResult<String>;

    async fn publish_version(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
    ) -> ServiceResult<()>;

    async fn delete_version(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
    ) -> ServiceResult<()>;

    /// Return an empty string if the blob is already registered, otherwise a
    /// signed upload URL. The blob row is registered before the bytes arrive.
    async fn ensure_blob_or_get_upload_url(
        &self,
        checksum: &str,
        size: u64,
        mime_type: &str,
    ) -> ServiceResult<String>;

    /// Point `key` in an unpublished version at the blob with `checksum`.
    async fn add_object(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
        key: &str,
        checksum: &str,
    ) -> ServiceResult<()>;

    async fn remap_object(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
        key: &str,
        new_checksum: &str,
    ) -> ServiceResult<()>;

    async fn delete_objects(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
        keys: &[String],
    ) -> ServiceResult<()>;
}

/// Default service implementation.
#[derive(Clone)]
pub struct Manager {
    metadata: Arc<dyn MetadataStore>,
    blobs: Arc<dyn BlobStore>,
    pagination: PaginationConfig,
}

impl Manager {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        blobs: Arc<dyn BlobStore>,
        pagination: PaginationConfig,
    ) -> Self {
        Self {
            metadata,
            blobs,
            pagination,
        }
    }

    pub fn metadata(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }
}

/// Download filename for an object key.
fn object_filename(key: &str) -> &str {
    key.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .unwrap_or(key)
}

#[async_trait]
impl AccessService for Manager {
    async fn list_namespaces(&self) -> ServiceResult<Vec<String>> {
        self.metadata
            .list_namespaces()
            .await
            .map_err(|e| ServiceError::from_metadata("list_namespaces", e))
    }

    async fn list_containers(&self, namespace: &str) -> ServiceResult<Vec<Container>> {
        self.metadata
            .list_containers(namespace)
            .await
            .map_err(|e| ServiceError::from_metadata("list_containers", e))
    }

    async fn list_containers_by_page(
        &self,
        namespace: &str,
        offset: u64,
        limit: u64,
    ) -> ServiceResult<(u64, Vec<Container>)> {
        let limit = self.pagination.limit(limit);
        self.metadata
            .list_containers_by_page(namespace, offset, limit)
            .await
            .map_err(|e| ServiceError::from_metadata("list_containers_by_page", e))
    }

    async fn get_latest_published_version(
        &self,
        namespace: &str,
        container: &str,
    ) -> ServiceResult<String> {
        self.metadata
            .get_latest_published_version_by_container(namespace, container)
            .await
            .map_err(|e| ServiceError::from_metadata("get_latest_published_version", e))
    }

    async fn list_all_versions(
        &self,
        namespace: &str,
        container: &str,
    ) -> ServiceResult<Vec<Version>> {
        self.metadata
            .list_all_versions_by_container(namespace, container)
            .await
            .map_err(|e| ServiceError::from_metadata("list_all_versions", e))
    }

    async fn list_published_versions(
        &self,
        namespace: &str,
        container: &str,
    ) -> ServiceResult<Vec<Version>> {
        self.metadata
            .list_published_versions_by_container(namespace, container)
            .await
            .map_err(|e| ServiceError::from_metadata("list_published_versions", e))
    }

    async fn list_published_versions_by_page(
        &self,
        namespace: &str,
        container: &str,
        offset: u64,
        limit: u64,
    ) -> ServiceResult<(u64, Vec<Version>)> {
        let limit = self.pagination.limit(limit);
        self.metadata
            .list_published_versions_by_container_and_page(namespace, container, offset, limit)
            .await
            .map_err(|e| ServiceError::from_metadata("list_published_versions_by_page", e))
    }

    async fn list_unpublished_versions(
        &self,
        namespace: &str,
        container: &str,
    ) -> ServiceResult<Vec<Version>> {
        self.metadata
            .list_unpublished_versions_by_container(namespace, container)
            .await
            .map_err(|e| ServiceError::from_metadata("list_unpublished_versions", e))
    }

    async fn list_objects(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
        offset: u64,
        limit: u64,
    ) -> ServiceResult<(u64, Vec<String>)> {
        let limit = self.pagination.limit(limit);
        self.metadata
            .list_objects(namespace, container, version, offset, limit)
            .await
            .map_err(|e| ServiceError::from_metadata("list_objects", e))
    }

    async fn get_blob_key_by_object(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
        key: &str,
    ) -> ServiceResult<String> {
        self.metadata
            .get_blob_key_by_object(namespace, container, version, key)
            .await
            .map_err(|e| ServiceError::from_metadata("get_blob_key_by_object", e))
    }

    #[instrument(skip(self))]
    async fn get_object_url(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
        key: &str,
    ) -> ServiceResult<String> {
        let blob = self
            .metadata
            .get_blob_by_object(namespace, container, version, key)
            .await
            .map_err(|e| ServiceError::from_metadata("get_object_url", e))?;

        self.blobs
            .get_blob_url(&blob.checksum, &blob.mime_type, object_filename(key))
            .await
            .map_err(|e| ServiceError::from_storage("get_object_url", e))
    }
}

#[async_trait]
impl ManageService for Manager {
    async fn create_namespace(&self, name: &str) -> ServiceResult<()> {
        self.metadata
            .create_namespace(name)
            .await
            .map_err(|e| ServiceError::from_metadata("create_namespace", e))?;
        tracing::info!(namespace = %name, "Namespace created");
        Ok(())
    }

    async fn rename_namespace(&self, old_name: &str, new_name: &str) -> ServiceResult<()> {
        self.metadata
            .rename_namespace(old_name, new_name)
            .await
            .map_err(|e| ServiceError::from_metadata("rename_namespace", e))?;
        tracing::info!(from = %old_name, to = %new_name, "Namespace renamed");
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> ServiceResult<()> {
        self.metadata
            .delete_namespace(name)
            .await
            .map_err(|e| ServiceError::from_metadata("delete_namespace", e))?;
        tracing::info!(namespace = %name, "Namespace deleted");
        Ok(())
    }

    async fn create_container(
        &self,
        namespace: &str,
        name: &str,
        versions_ttl: time::Duration,
    ) -> ServiceResult<()> {
        self.metadata
            .create_container(namespace, name, versions_ttl)
            .await
            .map_err(|e| ServiceError::from_metadata("create_container", e))?;
        tracing::info!(
            namespace = %namespace,
            container = %name,
            versions_ttl_secs = versions_ttl.whole_seconds(),
            "Container created"
        );
        Ok(())
    }

    async fn rename_container(
        &self,
        namespace: &str,
        old_name: &str,
        new_namespace: &str,
        new_name: &str,
    ) -> ServiceResult<()> {
        self.metadata
            .rename_container(namespace, old_name, new_namespace, new_name)
            .await
            .map_err(|e| ServiceError::from_metadata("rename_container", e))?;
        tracing::info!(
            from = %format!("{namespace}/{old_name}"),
            to = %format!("{new_namespace}/{new_name}"),
            "Container renamed"
        );
        Ok(())
    }

    async fn set_container_versions_ttl(
        &self,
        namespace: &str,
        name: &str,
        versions_ttl: time::Duration,
    ) -> ServiceResult<()> {
        self.metadata
            .set_container_versions_ttl(namespace, name, versions_ttl)
            .await
            .map_err(|e| ServiceError::from_metadata("set_container_versions_ttl", e))
    }

    async fn delete_container(&self, namespace: &str, name: &str) -> ServiceResult<()> {
        self.metadata
            .delete_container(namespace, name)
            .await
            .map_err(|e| ServiceError::from_metadata("delete_container", e))?;
        tracing::info!(namespace = %namespace, container = %name, "Container deleted");
        Ok(())
    }

    async fn create_version(&self, namespace: &str, container: &str) -> ServiceResult<String> {
        let version = self
            .metadata
            .create_version(namespace, container)
            .await
            .map_err(|e| ServiceError::from_metadata("create_version", e))?;
        tracing::debug!(namespace = %namespace, container = %container, version = %version, "Version created");
        Ok(version)
    }

    async fn publish_version(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
    ) -> ServiceResult<()> {
        self.metadata
            .mark_version_published(namespace, container, version)
            .await
            .map_err(|e| ServiceError::from_metadata("publish_version", e))?;
        tracing::info!(namespace = %namespace, container = %container, version = %version, "Version published");
        Ok(())
    }

    async fn delete_version(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
    ) -> ServiceResult<()> {
        self.metadata
            .delete_version(namespace, container, version)
            .await
            .map_err(|e| ServiceError::from_metadata("delete_version", e))
    }

    #[instrument(skip(self))]
    async fn ensure_blob_or_get_upload_url(
        &self,
        checksum: &str,
        size: u64,
        mime_type: &str,
    ) -> ServiceResult<String> {
        match self.metadata.ensure_blob_key(checksum, size).await {
            Ok(()) => {
                metrics::BLOBS_DEDUPLICATED.inc();
                return Ok(String::new());
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(ServiceError::from_metadata("ensure_blob_or_get_upload_url", e)),
        }

        let url = self
            .blobs
            .put_blob_url(checksum)
            .await
            .map_err(|e| ServiceError::from_storage("ensure_blob_or_get_upload_url", e))?;

        match self.metadata.create_blob(checksum, size, mime_type).await {
            Ok(()) => metrics::BLOBS_REGISTERED.inc(),
            // A concurrent caller registered the same blob first; the URL is still valid.
            Err(e) if e.is_conflict() => {
                tracing::debug!(checksum = %checksum, size = size, "Blob registered concurrently");
            }
            Err(e) => return Err(ServiceError::from_metadata("ensure_blob_or_get_upload_url", e)),
        }

        Ok(url)
    }

    async fn add_object(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
        key: &str,
        checksum: &str,
    ) -> ServiceResult<()> {
        self.metadata
            .create_object(namespace, container, version, key, checksum)
            .await
            .map_err(|e| ServiceError::from_metadata("add_object", e))
    }

    async fn remap_object(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
        key: &str,
        new_checksum: &str,
    ) -> ServiceResult<()> {
        self.metadata
            .remap_object(namespace, container, version, key, new_checksum)
            .await
            .map_err(|e| ServiceError::from_metadata("remap_object", e))?;
        tracing::info!(
            namespace = %namespace,
            container = %container,
            version = %version,
            key = %key,
            checksum = %new_checksum,
            "Object remapped"
        );
        Ok(())
    }

    async fn delete_objects(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
        keys: &[String],
    ) -> ServiceResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        self.metadata
            .delete_object(namespace, container, version, keys)
            .await
            .map_err(|e| ServiceError::from_metadata("delete_objects", e))
    }
}
