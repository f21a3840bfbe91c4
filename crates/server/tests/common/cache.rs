//! Fake metadata cache counting hits and misses.

use async_trait::async_trait;
use depot_metadata::{MetadataCache, MetadataError, MetadataResult};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// In-memory cache without expiry that records how it is used.
#[derive(Default)]
pub struct CountingCache {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    ttls: Mutex<Vec<Duration>>,
    pub hits: AtomicUsize,
    pub misses: AtomicUsize,
    pub sets: AtomicUsize,
    broken: AtomicBool,
}

#[allow(dead_code)]
impl CountingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following get/set fail.
    pub fn break_cache(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    /// Drop all entries, as if the TTL had elapsed.
    pub fn expire_all(&self) {
        self.entries.lock().unwrap().clear();
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn ttls(&self) -> Vec<Duration> {
        self.ttls.lock().unwrap().clone()
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::SeqCst)
    }

    fn check(&self) -> MetadataResult<()> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(MetadataError::Internal("cache unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataCache for CountingCache {
    async fn get(&self, key: &str) -> MetadataResult<Option<Vec<u8>>> {
        self.check()?;
        let value = self.entries.lock().unwrap().get(key).cloned();
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::SeqCst);
        } else {
            self.misses.fetch_add(1, Ordering::SeqCst);
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> MetadataResult<()> {
        self.check()?;
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.ttls.lock().unwrap().push(ttl);
        self.entries.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }
}
