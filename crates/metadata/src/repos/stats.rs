//! Catalog statistics.

use crate::error::MetadataResult;
use async_trait::async_trait;
use depot_core::Stats;

#[async_trait]
pub trait StatsRepo: Send + Sync {
    /// Aggregate counts and sizes across the whole catalog in one read-only pass.
    async fn count_stats(&self) -> MetadataResult<Stats>;
}
