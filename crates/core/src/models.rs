//! Domain models returned by the metadata repository.

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

/// A container inside a namespace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Retention for unpublished versions. Negative means retain forever.
    pub versions_ttl: Duration,
}

impl Container {
    /// Whether the container keeps its versions forever.
    pub fn retains_forever(&self) -> bool {
        self.versions_ttl.is_negative()
    }
}

/// A version of a container.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub name: String,
    pub is_published: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A content-addressed blob.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
    pub checksum: String,
    pub size: u64,
    pub mime_type: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Version count for one (namespace, container, publish state).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionsCount {
    pub namespace: String,
    pub container: String,
    pub is_published: bool,
    pub count: u64,
}

/// Object count for one version.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectsCount {
    pub namespace: String,
    pub container: String,
    pub version: String,
    pub is_published: bool,
    pub count: u64,
}

/// Sum of blob sizes referenced by one version, counting shared blobs once per object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobsRawSize {
    pub namespace: String,
    pub container: String,
    pub version: String,
    pub is_published: bool,
    pub size_bytes: u64,
}

/// Aggregate catalog statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub namespaces_count: u64,
    pub containers_count: u64,
    pub versions_count: Vec<VersionsCount>,
    pub objects_count: Vec<ObjectsCount>,
    pub blobs_count: u64,
    pub blobs_raw_size_bytes: Vec<BlobsRawSize>,
    /// Sum of sizes over distinct blobs.
    pub blobs_effective_size_bytes: u64,
}

impl Stats {
    /// Total raw size across all versions.
    pub fn total_raw_size_bytes(&self) -> u64 {
        self.blobs_raw_size_bytes.iter().map(|r| r.size_bytes).sum()
    }
}
