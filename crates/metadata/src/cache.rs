//! Cache backends for the read-through [`CachedStore`](crate::cached::CachedStore).

use crate::error::MetadataResult;
use async_trait::async_trait;
use moka::future::Cache;
use std::time::Duration;

/// Key/value cache holding serialized read results.
///
/// Entries expire after the TTL given at insertion. Implementations must be
/// safe for concurrent use.
#[async_trait]
pub trait MetadataCache: Send + Sync {
    /// Fetch a value. `Ok(None)` is a miss.
    async fn get(&self, key: &str) -> MetadataResult<Option<Vec<u8>>>;

    /// Store a value for `ttl`.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> MetadataResult<()>;
}

/// In-process cache backed by moka with a fixed time-to-live.
pub struct MemoryCache {
    inner: Cache<String, Vec<u8>>,
}

impl MemoryCache {
    /// Create a cache holding at most `max_entries` values, each living for `ttl`.
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();
        Self { inner }
    }

    /// Number of live entries (approximate).
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

#[async_trait]
impl MetadataCache for MemoryCache {
    async fn get(&self, key: &str) -> MetadataResult<Option<Vec<u8>>> {
        Ok(self.inner.get(key).await)
    }

    // The TTL is fixed at construction; moka applies it to every entry.
    async fn set(&self, key: &str, value: Vec<u8>, _ttl: Duration) -> MetadataResult<()> {
        self.inner.insert(key.to_string(), value).await;
        Ok(())
    }
}
