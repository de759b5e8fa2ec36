//! Normalized cache with transactions and change publication.
//!
//! All reads and writes of records go through a [`NormalizedCache`]. Reads
//! run inside a read transaction and never observe a partially committed
//! write. Writes are staged inside a write transaction and committed only if
//! the unit of work succeeds; the field keys whose values changed are then
//! published to subscribers, after the write lock is released.
//!
//! # Example
//!
//! ```ignore
//! let cache = RealCache::new(Arc::new(InMemoryRecordStore::new()), Arc::new(IdFieldResolver::new()));
//! let id = cache.subscribe(Arc::new(|changed: &BTreeSet<String>| println!("{:?}", changed)));
//!
//! let changed = cache.write_transaction(|tx| {
//!     tx.merge(Record::new("User:1").with_field("name", "Ada"))?;
//!     Ok(())
//! })?;
//! ```
//!
//! [`NoOpCache`] stands in when no store is configured: every read misses
//! and every write is discarded.

pub mod noop;
pub mod publisher;
pub mod real;
pub mod traits;
pub mod transaction;

pub use noop::NoOpCache;
pub use publisher::{ChangePublisher, RecordChangeSubscriber, SubscriptionId};
pub use real::RealCache;
pub use traits::{NormalizedCache, NormalizedCacheExt, ReadableCache, WriteableCache};
pub use transaction::{StoreReader, WriteTransaction};
