//! Policy-driven response cache.

use chrono::{DateTime, Utc};
use prism_core::{TransportCachePolicy, TransportError};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use super::eviction::EvictionStrategy;
use super::traits::{CacheStats, CachedResponse, ResponseCacheStore};

/// A cached response together with its freshness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpCacheRead {
    pub body: Vec<u8>,
    pub cached_at: DateTime<Utc>,
    pub stale: bool,
}

/// Bytes produced by [`HttpCache::fetch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedBytes {
    pub body: Vec<u8>,
    pub from_cache: bool,
}

/// Response cache combining a byte store with an eviction strategy.
///
/// Store failures are logged and read as misses.
#[derive(Clone)]
pub struct HttpCache {
    store: Arc<dyn ResponseCacheStore>,
    eviction: Arc<dyn EvictionStrategy>,
}

impl fmt::Debug for HttpCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpCache")
            .field("eviction", &self.eviction)
            .finish_non_exhaustive()
    }
}

impl HttpCache {
    pub fn new(store: Arc<dyn ResponseCacheStore>, eviction: Arc<dyn EvictionStrategy>) -> Self {
        Self { store, eviction }
    }

    pub fn eviction(&self) -> &Arc<dyn EvictionStrategy> {
        &self.eviction
    }

    /// Look up the bytes cached for `signature`, stale or not.
    pub async fn read(&self, signature: &str) -> Option<HttpCacheRead> {
        match self.store.read(signature).await {
            Ok(Some(response)) => {
                let stale = self.eviction.is_stale(&response, Utc::now());
                Some(HttpCacheRead {
                    body: response.body,
                    cached_at: response.cached_at,
                    stale,
                })
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(signature = %signature, error = %e, "Response cache read failed");
                None
            }
        }
    }

    pub async fn write(&self, signature: &str, body: &[u8]) {
        let response = CachedResponse::new(body.to_vec());
        if let Err(e) = self.store.write(signature, response).await {
            tracing::warn!(signature = %signature, error = %e, "Response cache write failed");
        }
    }

    pub async fn remove(&self, signature: &str) -> bool {
        match self.store.remove(signature).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!(signature = %signature, error = %e, "Response cache remove failed");
                false
            }
        }
    }

    /// Drop every cached response, returning how many were removed.
    pub async fn clear(&self) -> u64 {
        match self.store.clear().await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!(error = %e, "Response cache clear failed");
                0
            }
        }
    }

    pub async fn stats(&self) -> Option<CacheStats> {
        match self.store.stats().await {
            Ok(stats) => Some(stats),
            Err(e) => {
                tracing::warn!(error = %e, "Response cache stats failed");
                None
            }
        }
    }

    /// Produce the response bytes for `signature` under `policy`.
    ///
    /// `network` is only invoked when the policy calls for it. Bytes fetched
    /// from the network are always written back.
    pub async fn fetch<F, Fut>(
        &self,
        signature: &str,
        policy: TransportCachePolicy,
        network: F,
    ) -> Result<FetchedBytes, TransportError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>, TransportError>>,
    {
        if policy.reads_before_network() {
            if let Some(hit) = self.read(signature).await.filter(|r| !r.stale) {
                if policy == TransportCachePolicy::ExpireAfterRead {
                    self.remove(signature).await;
                }
                tracing::debug!(signature = %signature, policy = %policy, "Response cache hit");
                return Ok(FetchedBytes {
                    body: hit.body,
                    from_cache: true,
                });
            }
            if policy == TransportCachePolicy::CacheOnly {
                return Err(TransportError::NotCached {
                    signature: signature.to_string(),
                });
            }
        }

        match network().await {
            Ok(body) => {
                self.write(signature, &body).await;
                Ok(FetchedBytes {
                    body,
                    from_cache: false,
                })
            }
            Err(TransportError::Cancelled) => Err(TransportError::Cancelled),
            Err(err) if policy == TransportCachePolicy::NetworkFirst => {
                match self.read(signature).await {
                    Some(fallback) => {
                        tracing::debug!(
                            signature = %signature,
                            stale = fallback.stale,
                            error = %err,
                            "Network failed, serving cached response"
                        );
                        Ok(FetchedBytes {
                            body: fallback.body,
                            from_cache: true,
                        })
                    }
                    None => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_cache::{ExpireAfterWrite, InMemoryResponseCacheStore, NeverExpire};
    use async_trait::async_trait;
    use prism_core::{PrismResult, StorageError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn cache() -> HttpCache {
        HttpCache::new(
            Arc::new(InMemoryResponseCacheStore::new(10)),
            Arc::new(NeverExpire),
        )
    }

    async fn fetch_counting(
        cache: &HttpCache,
        policy: TransportCachePolicy,
        calls: &AtomicUsize,
        result: Result<Vec<u8>, TransportError>,
    ) -> Result<FetchedBytes, TransportError> {
        cache
            .fetch("sig", policy, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                result
            })
            .await
    }

    #[tokio::test]
    async fn test_cache_first_serves_fresh_bytes() {
        let cache = cache();
        let calls = AtomicUsize::new(0);

        let first = fetch_counting(&cache, TransportCachePolicy::CacheFirst, &calls, Ok(b"1".to_vec()))
            .await
            .unwrap();
        assert!(!first.from_cache);

        let second = fetch_counting(&cache, TransportCachePolicy::CacheFirst, &calls, Ok(b"2".to_vec()))
            .await
            .unwrap();
        assert!(second.from_cache);
        assert_eq!(second.body, b"1".to_vec());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_first_refetches_stale_bytes() {
        let store = Arc::new(InMemoryResponseCacheStore::new(10));
        store
            .write(
                "sig",
                CachedResponse::with_timestamp(b"old".to_vec(), Utc::now() - chrono::Duration::seconds(120)),
            )
            .await
            .unwrap();
        let cache = HttpCache::new(store, Arc::new(ExpireAfterWrite::new(Duration::from_secs(60))));
        let calls = AtomicUsize::new(0);

        let fetched = fetch_counting(&cache, TransportCachePolicy::CacheFirst, &calls, Ok(b"new".to_vec()))
            .await
            .unwrap();
        assert_eq!(fetched.body, b"new".to_vec());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_only_never_calls_network() {
        let cache = cache();
        let calls = AtomicUsize::new(0);
        let err = fetch_counting(&cache, TransportCachePolicy::CacheOnly, &calls, Ok(vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NotCached { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_network_only_bypasses_reads_but_writes() {
        let cache = cache();
        cache.write("sig", b"cached").await;
        let calls = AtomicUsize::new(0);

        let fetched = fetch_counting(&cache, TransportCachePolicy::NetworkOnly, &calls, Ok(b"fresh".to_vec()))
            .await
            .unwrap();
        assert!(!fetched.from_cache);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.read("sig").await.unwrap().body, b"fresh".to_vec());
    }

    #[tokio::test]
    async fn test_network_first_falls_back_on_failure() {
        let cache = cache();
        cache.write("sig", b"cached").await;
        let calls = AtomicUsize::new(0);

        let fetched = fetch_counting(
            &cache,
            TransportCachePolicy::NetworkFirst,
            &calls,
            Err(TransportError::Io {
                reason: "offline".to_string(),
            }),
        )
        .await
        .unwrap();
        assert!(fetched.from_cache);
        assert_eq!(fetched.body, b"cached".to_vec());
    }

    #[tokio::test]
    async fn test_network_first_without_fallback_fails() {
        let cache = cache();
        let calls = AtomicUsize::new(0);
        let err = fetch_counting(
            &cache,
            TransportCachePolicy::NetworkFirst,
            &calls,
            Err(TransportError::Status {
                status: 502,
                body: String::new(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TransportError::Status { status: 502, .. }));
    }

    #[tokio::test]
    async fn test_expire_after_read_serves_once() {
        let cache = cache();
        cache.write("sig", b"once").await;
        let calls = AtomicUsize::new(0);

        let fetched = fetch_counting(&cache, TransportCachePolicy::ExpireAfterRead, &calls, Ok(b"net".to_vec()))
            .await
            .unwrap();
        assert!(fetched.from_cache);
        assert_eq!(fetched.body, b"once".to_vec());

        let fetched = fetch_counting(&cache, TransportCachePolicy::ExpireAfterRead, &calls, Ok(b"net".to_vec()))
            .await
            .unwrap();
        assert!(!fetched.from_cache);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    struct FailingStore;

    #[async_trait]
    impl ResponseCacheStore for FailingStore {
        async fn read(&self, _key: &str) -> PrismResult<Option<CachedResponse>> {
            Err(StorageError::Backend { reason: "disk".to_string() }.into())
        }

        async fn write(&self, _key: &str, _response: CachedResponse) -> PrismResult<()> {
            Err(StorageError::Backend { reason: "disk".to_string() }.into())
        }

        async fn remove(&self, _key: &str) -> PrismResult<bool> {
            Err(StorageError::Backend { reason: "disk".to_string() }.into())
        }

        async fn clear(&self) -> PrismResult<u64> {
            Err(StorageError::Backend { reason: "disk".to_string() }.into())
        }

        async fn stats(&self) -> PrismResult<CacheStats> {
            Err(StorageError::Backend { reason: "disk".to_string() }.into())
        }
    }

    #[tokio::test]
    async fn test_store_failures_are_misses() {
        let cache = HttpCache::new(Arc::new(FailingStore), Arc::new(NeverExpire));
        let calls = AtomicUsize::new(0);

        let fetched = fetch_counting(&cache, TransportCachePolicy::CacheFirst, &calls, Ok(b"net".to_vec()))
            .await
            .unwrap();
        assert_eq!(fetched.body, b"net".to_vec());
        assert_eq!(cache.clear().await, 0);
        assert!(cache.stats().await.is_none());
    }
}
