//! Test fixtures for building catalog state.

use depot_metadata::MetadataStore;
use depot_metadata::repos::{BlobRepo, ContainerRepo, NamespaceRepo, ObjectRepo, VersionRepo};
use std::sync::atomic::{AtomicU64, Ordering};
use time::Duration;

/// Counter for generating unique checksums.
static CHECKSUM_COUNTER: AtomicU64 = AtomicU64::new(1);

/// A unique hex checksum.
#[allow(dead_code)]
pub fn unique_checksum() -> String {
    let n = CHECKSUM_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{:016x}{:016x}", n.wrapping_mul(0x9e37_79b9_7f4a_7c15), n)
}

/// Retain-forever TTL.
#[allow(dead_code)]
pub fn forever() -> Duration {
    Duration::seconds(-1)
}

/// Create a namespace and container, ignoring an already existing namespace.
#[allow(dead_code)]
pub async fn seed_container(
    store: &dyn MetadataStore,
    namespace: &str,
    container: &str,
    ttl: Duration,
) {
    match store.create_namespace(namespace).await {
        Ok(()) => {}
        Err(e) if e.is_conflict() => {}
        Err(e) => panic!("create_namespace failed: {e}"),
    }
    store
        .create_container(namespace, container, ttl)
        .await
        .expect("create_container failed");
}

/// Create a version holding `keys`, each backed by its own new blob of `size` bytes.
/// Returns the version name.
#[allow(dead_code)]
pub async fn seed_version(
    store: &dyn MetadataStore,
    namespace: &str,
    container: &str,
    keys: &[&str],
    size: u64,
) -> String {
    let version = store
        .create_version(namespace, container)
        .await
        .expect("create_version failed");
    for key in keys {
        let checksum = unique_checksum();
        store
            .create_blob(&checksum, size, "application/octet-stream")
            .await
            .expect("create_blob failed");
        store
            .create_object(namespace, container, &version, key, &checksum)
            .await
            .expect("create_object failed");
    }
    version
}

/// `count` object keys named `obj-00000`, `obj-00001`, ...
#[allow(dead_code)]
pub fn object_keys(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("obj-{i:05}")).collect()
}
