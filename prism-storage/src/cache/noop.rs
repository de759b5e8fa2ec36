//! Cache used when no record store is configured.

use prism_core::{NoKeyResolver, PrismResult, Record};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::publisher::{RecordChangeSubscriber, SubscriptionId};
use super::traits::{NormalizedCache, ReadableCache, WriteableCache};
use crate::normalizer::ResponseNormalizer;

/// Every read misses, every write is discarded, nothing is published.
#[derive(Debug)]
pub struct NoOpCache {
    network_normalizer: ResponseNormalizer,
    cache_normalizer: ResponseNormalizer,
    next_id: AtomicU64,
}

impl Default for NoOpCache {
    fn default() -> Self {
        Self {
            network_normalizer: ResponseNormalizer::strict(Arc::new(NoKeyResolver)),
            cache_normalizer: ResponseNormalizer::lenient(Arc::new(NoKeyResolver)),
            next_id: AtomicU64::new(0),
        }
    }
}

impl NoOpCache {
    pub fn new() -> Self {
        Self::default()
    }
}

struct EmptyView;

impl ReadableCache for EmptyView {
    fn read(&self, _key: &str) -> PrismResult<Option<Record>> {
        Ok(None)
    }

    fn read_many(&self, _keys: &[String]) -> PrismResult<BTreeMap<String, Record>> {
        Ok(BTreeMap::new())
    }
}

impl WriteableCache for EmptyView {
    fn merge(&mut self, _record: Record) -> PrismResult<BTreeSet<String>> {
        Ok(BTreeSet::new())
    }

    fn remove(&mut self, _key: &str) -> PrismResult<bool> {
        Ok(false)
    }

    fn as_readable(&self) -> &dyn ReadableCache {
        self
    }
}

impl NormalizedCache for NoOpCache {
    fn subscribe(&self, _subscriber: Arc<dyn RecordChangeSubscriber>) -> SubscriptionId {
        // Nothing is ever published, so the subscriber is not retained.
        SubscriptionId::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn unsubscribe(&self, _id: SubscriptionId) -> bool {
        false
    }

    fn publish(&self, _changed: &BTreeSet<String>) {}

    fn clear_all(&self) -> PrismResult<()> {
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
        work(&EmptyView)
    }

    fn run_write(
        &self,
        work: &mut dyn FnMut(&mut dyn WriteableCache) -> PrismResult<()>,
    ) -> PrismResult<BTreeSet<String>> {
        work(&mut EmptyView)?;
        Ok(BTreeSet::new())
    }
}
