//! Response-byte store trait and shared types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use prism_core::PrismResult;
use std::time::Duration;

/// Response bytes with the time they were written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub body: Vec<u8>,
    pub cached_at: DateTime<Utc>,
}

impl CachedResponse {
    /// Bytes cached now.
    pub fn new(body: Vec<u8>) -> Self {
        Self::with_timestamp(body, Utc::now())
    }

    pub fn with_timestamp(body: Vec<u8>, cached_at: DateTime<Utc>) -> Self {
        Self { body, cached_at }
    }

    /// Age of the entry at `now`. Entries from the future have zero age.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.cached_at).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Keyed byte store backing the transport-level cache.
///
/// Keys are request signatures. Implementations must be thread-safe; any
/// size bound is theirs to enforce.
#[async_trait]
pub trait ResponseCacheStore: Send + Sync {
    /// Get the entry for `key`, if any.
    async fn read(&self, key: &str) -> PrismResult<Option<CachedResponse>>;

    /// Insert or replace the entry for `key`.
    async fn write(&self, key: &str, response: CachedResponse) -> PrismResult<()>;

    /// Remove the entry for `key`. Returns whether it existed.
    async fn remove(&self, key: &str) -> PrismResult<bool>;

    /// Remove every entry, returning how many were removed.
    async fn clear(&self) -> PrismResult<u64>;

    /// Get store statistics.
    async fn stats(&self) -> PrismResult<CacheStats>;
}

/// Statistics about response cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entry_count: u64,
    /// Total body bytes held.
    pub memory_bytes: u64,
    /// Entries dropped to stay within capacity.
    pub evictions: u64,
}

impl CacheStats {
    /// Hit rate in `0.0..=1.0`.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
