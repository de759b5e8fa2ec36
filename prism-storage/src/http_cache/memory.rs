//! In-memory response-byte store.

use async_trait::async_trait;
use prism_core::PrismResult;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::traits::{CacheStats, CachedResponse, ResponseCacheStore};

/// Bounded in-memory store. When full, the oldest-written entry is evicted.
#[derive(Debug)]
pub struct InMemoryResponseCacheStore {
    entries: tokio::sync::RwLock<HashMap<String, CachedResponse>>,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl InMemoryResponseCacheStore {
    /// Create a store holding at most `max_entries` responses (at least one).
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: tokio::sync::RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }
}

impl Default for InMemoryResponseCacheStore {
    fn default() -> Self {
        Self::new(1_000)
    }
}

#[async_trait]
impl ResponseCacheStore for InMemoryResponseCacheStore {
    async fn read(&self, key: &str) -> PrismResult<Option<CachedResponse>> {
        let entries = self.entries.read().await;
        let found = entries.get(key).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(found)
    }

    async fn write(&self, key: &str, response: CachedResponse) -> PrismResult<()> {
        let mut entries = self.entries.write().await;
        if !entries.contains_key(key) && entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, r)| r.cached_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(key = %oldest, "Evicted cached response");
            }
        }
        entries.insert(key.to_string(), response);
        Ok(())
    }

    async fn remove(&self, key: &str) -> PrismResult<bool> {
        let mut entries = self.entries.write().await;
        Ok(entries.remove(key).is_some())
    }

    async fn clear(&self) -> PrismResult<u64> {
        let mut entries = self.entries.write().await;
        let removed = entries.len() as u64;
        entries.clear();
        Ok(removed)
    }

    async fn stats(&self) -> PrismResult<CacheStats> {
        let entries = self.entries.read().await;
        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: entries.len() as u64,
            memory_bytes: entries.values().map(|r| r.body.len() as u64).sum(),
            evictions: self.evictions.load(Ordering::Relaxed),
        })
    }
}
