//! Store-backed normalized cache.

use parking_lot::ReentrantMutex;
use prism_core::{CacheKeyResolver, PrismResult, StorageError};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, RwLock};

use super::publisher::{ChangePublisher, RecordChangeSubscriber, SubscriptionId};
use super::traits::{NormalizedCache, ReadableCache, WriteableCache};
use super::transaction::{StoreReader, WriteTransaction};
use crate::normalizer::ResponseNormalizer;
use crate::RecordStore;

/// Normalized cache over a [`RecordStore`].
///
/// # Locking
///
/// One reader-writer lock covers the whole store: read transactions share
/// it, a write transaction holds it exclusively from staging to commit.
/// A second, reentrant lock orders commits with their publications. It is
/// taken before the write lock and released only after publishing, so a
/// change set is delivered before any later write commits, while a
/// subscriber that writes back into the cache from its callback still makes
/// progress on the same thread.
///
/// Transactions must not be nested inside a transaction's unit of work.
/// The commit lock is held across subscriber callbacks, so a subscriber must
/// not hand a write to another thread and block waiting for it; that write
/// can never take the lock and the two threads deadlock.
pub struct RealCache {
    store: Arc<dyn RecordStore>,
    network_normalizer: ResponseNormalizer,
    cache_normalizer: ResponseNormalizer,
    publisher: ChangePublisher,
    lock: RwLock<()>,
    commit_order: ReentrantMutex<()>,
}

impl fmt::Debug for RealCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealCache")
            .field("publisher", &self.publisher)
            .finish_non_exhaustive()
    }
}

impl RealCache {
    pub fn new(store: Arc<dyn RecordStore>, resolver: Arc<dyn CacheKeyResolver>) -> Self {
        Self {
            store,
            network_normalizer: ResponseNormalizer::strict(Arc::clone(&resolver)),
            cache_normalizer: ResponseNormalizer::lenient(resolver),
            publisher: ChangePublisher::new(),
            lock: RwLock::new(()),
            commit_order: ReentrantMutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn publisher(&self) -> &ChangePublisher {
        &self.publisher
    }
}

impl NormalizedCache for RealCache {
    fn subscribe(&self, subscriber: Arc<dyn RecordChangeSubscriber>) -> SubscriptionId {
        self.publisher.subscribe(subscriber)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.publisher.unsubscribe(id)
    }

    fn publish(&self, changed: &BTreeSet<String>) {
        self.publisher.publish(changed)
    }

    fn clear_all(&self) -> PrismResult<()> {
        let _order = self.commit_order.lock();
        let cleared = {
            let _guard = self.lock.write().map_err(|_| StorageError::LockPoisoned)?;
            self.store.clear_all()?
        };
        tracing::debug!(fields = cleared.len(), "Normalized cache cleared");
        if self.publisher.has_subscribers() {
            self.publisher.publish(&cleared);
        }
        Ok(())
    }

    fn network_response_normalizer(&self) -> &ResponseNormalizer {
        &self.network_normalizer
    }

    fn cache_response_normalizer(&self) -> &ResponseNormalizer {
        &self.cache_normalizer
    }

    fn run_read(
        &self,
        work: &mut dyn FnMut(&dyn ReadableCache) -> PrismResult<()>,
    ) -> PrismResult<()> {
        let _guard = self.lock.read().map_err(|_| StorageError::LockPoisoned)?;
        let view = StoreReader::new(self.store.as_ref());
        work(&view)
    }

    fn run_write(
        &self,
        work: &mut dyn FnMut(&mut dyn WriteableCache) -> PrismResult<()>,
    ) -> PrismResult<BTreeSet<String>> {
        let _order = self.commit_order.lock();
        let changed = {
            let _guard = self.lock.write().map_err(|_| StorageError::LockPoisoned)?;
            let mut tx = WriteTransaction::new(self.store.as_ref());
            work(&mut tx)?;
            tx.commit()?
        };
        if changed.is_empty() {
            tracing::trace!("Write transaction changed nothing");
        } else {
            self.publisher.publish(&changed);
        }
        Ok(changed)
    }
}

// ============================================================================
// TESTS
// ============================================================================
