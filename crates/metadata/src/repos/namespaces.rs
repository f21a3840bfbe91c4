//! Namespace repository.

use crate::error::MetadataResult;
use async_trait::async_trait;

/// Repository for namespace operations.
#[async_trait]
pub trait NamespaceRepo: Send + Sync {
    /// Create a namespace. Fails with `Conflict` if the name is taken.
    async fn create_namespace(&self, name: &str) -> MetadataResult<()>;

    /// Rename a namespace.
    async fn rename_namespace(&self, old_name: &str, new_name: &str) -> MetadataResult<()>;

    /// List namespace names ordered by name.
    async fn list_namespaces(&self) -> MetadataResult<Vec<String>>;

    /// Delete an empty namespace. Fails with `Conflict` while it holds containers.
    async fn delete_namespace(&self, name: &str) -> MetadataResult<()>;
}
