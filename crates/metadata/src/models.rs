//! Database row types.

use crate::error::{MetadataError, MetadataResult};
use depot_core::models::{Blob, Container, Version};
use sqlx::FromRow;
use time::{Duration, OffsetDateTime};

/// Row from the `containers` table.
#[derive(Clone, Debug, FromRow)]
pub struct ContainerRow {
    pub id: i64,
    pub name: String,
    pub namespace_id: i64,
    pub created_at: OffsetDateTime,
    pub versions_ttl_seconds: i64,
}

impl From<ContainerRow> for Container {
    fn from(row: ContainerRow) -> Self {
        Self {
            name: row.name,
            created_at: row.created_at,
            versions_ttl: Duration::seconds(row.versions_ttl_seconds),
        }
    }
}

/// Row from the `versions` table.
#[derive(Clone, Debug, FromRow)]
pub struct VersionRow {
    pub id: i64,
    pub name: String,
    pub container_id: i64,
    pub is_published: bool,
    pub created_at: OffsetDateTime,
}

impl From<VersionRow> for Version {
    fn from(row: VersionRow) -> Self {
        Self {
            name: row.name,
            is_published: row.is_published,
            created_at: row.created_at,
        }
    }
}

/// Row from the `blobs` table.
#[derive(Clone, Debug, FromRow)]
pub struct BlobRow {
    pub id: i64,
    pub checksum: String,
    pub size: i64,
    pub mime_type: String,
    pub created_at: OffsetDateTime,
}

impl From<BlobRow> for Blob {
    fn from(row: BlobRow) -> Self {
        Self {
            checksum: row.checksum,
            size: u64::try_from(row.size).unwrap_or_default(),
            mime_type: row.mime_type,
            created_at: row.created_at,
        }
    }
}

/// Versions aggregated per (namespace, container, publish state).
#[derive(Clone, Debug, FromRow)]
pub struct VersionsCountRow {
    pub namespace: String,
    pub container: String,
    pub is_published: bool,
    pub count: i64,
}

/// Objects (or raw bytes) aggregated per version.
#[derive(Clone, Debug, FromRow)]
pub struct VersionAggregateRow {
    pub namespace: String,
    pub container: String,
    pub version: String,
    pub is_published: bool,
    pub value: i64,
}

/// Convert a TTL into the stored seconds value. Negative means forever.
pub fn ttl_to_seconds(ttl: Duration) -> i64 {
    ttl.whole_seconds()
}

/// Convert a stored count or size into an unsigned value.
pub fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

/// Convert an offset or limit into a bindable value, saturating at `i64::MAX`.
pub fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Convert a blob size into its stored value. Sizes are part of a blob's
/// identity, so an unrepresentable size is rejected rather than clamped.
pub fn blob_size(size: u64) -> MetadataResult<i64> {
    i64::try_from(size).map_err(|_| {
        MetadataError::Internal(format!(
            "blob size {size} exceeds the maximum of {} bytes",
            i64::MAX
        ))
    })
}
