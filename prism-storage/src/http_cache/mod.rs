//! Transport-level response cache.
//!
//! Raw response bytes keyed by request signature, consulted only when a call
//! goes to the network. The cache is a pure optimization layer: every
//! failure of the backing store is logged and treated as a miss, never
//! surfaced to the call.
//!
//! # Example
//!
//! ```ignore
//! let cache = HttpCache::new(
//!     Arc::new(InMemoryResponseCacheStore::new(1_000)),
//!     Arc::new(ExpireAfterWrite::new(Duration::from_secs(300))),
//! );
//! let fetched = cache
//!     .fetch(&signature, TransportCachePolicy::CacheFirst, || transport.execute(&request))
//!     .await?;
//! ```

pub mod cache;
pub mod eviction;
pub mod memory;
pub mod traits;

pub use cache::{FetchedBytes, HttpCache, HttpCacheRead};
pub use eviction::{EvictionStrategy, ExpireAfterWrite, NeverExpire};
pub use memory::InMemoryResponseCacheStore;
pub use traits::{CacheStats, CachedResponse, ResponseCacheStore};
