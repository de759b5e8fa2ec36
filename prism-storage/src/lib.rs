//! prism Storage - Record Store, Normalizer and Caches
//!
//! Defines the record store abstraction, the response normalizer, the
//! transactional normalized cache with its change publisher, and the
//! transport-level response-byte cache.

pub mod cache;
pub mod http_cache;
pub mod normalizer;

pub use cache::{
    ChangePublisher, NoOpCache, NormalizedCache, NormalizedCacheExt, ReadableCache, RealCache,
    RecordChangeSubscriber, SubscriptionId, WriteableCache,
};
pub use http_cache::{
    CacheStats, CachedResponse, EvictionStrategy, ExpireAfterWrite, FetchedBytes, HttpCache,
    HttpCacheRead, InMemoryResponseCacheStore, NeverExpire, ResponseCacheStore,
};
pub use normalizer::{Denormalized, NormalizeMode, ResponseNormalizer};

use prism_core::{PrismResult, Record, StorageError};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

// ============================================================================
// STORE TRAIT
// ============================================================================

/// Key-addressed record storage.
///
/// Implementations must be safe to share across threads. Every mutation
/// reports the field-qualified keys (`<record key>.<field>`) whose value it
/// actually changed, which is what the cache publishes to subscribers.
pub trait RecordStore: Send + Sync {
    /// Load one record by key.
    fn read(&self, key: &str) -> PrismResult<Option<Record>>;

    /// Load several records. Absent keys are simply missing from the result.
    fn read_many(&self, keys: &[String]) -> PrismResult<BTreeMap<String, Record>>;

    /// Merge a record into the store, field by field.
    ///
    /// Fields absent from `record` are kept. Returns the changed field keys.
    fn merge(&self, record: Record) -> PrismResult<BTreeSet<String>>;

    /// Merge a batch of records.
    ///
    /// Must be atomic with respect to concurrent readers: a reader observes
    /// either none or all of the batch.
    fn merge_many(&self, records: Vec<Record>) -> PrismResult<BTreeSet<String>>;

    /// Remove a record. Returns whether it existed.
    fn delete(&self, key: &str) -> PrismResult<bool>;

    /// Remove every record, returning the field keys that were held.
    fn clear_all(&self) -> PrismResult<BTreeSet<String>>;
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// In-memory record store.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<String, Record>>,
}

impl InMemoryRecordStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with `records`.
    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let store = Self::new();
        if let Ok(mut map) = store.records.write() {
            for record in records {
                merge_into(&mut map, record);
            }
        }
        store
    }

    /// Number of records currently held.
    pub fn record_count(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Keys of every record currently held.
    pub fn keys(&self) -> BTreeSet<String> {
        self.records
            .read()
            .map(|r| r.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn read_guard(&self) -> PrismResult<RwLockReadGuard<'_, HashMap<String, Record>>> {
        self.records
            .read()
            .map_err(|_| StorageError::LockPoisoned.into())
    }

    fn write_guard(&self) -> PrismResult<RwLockWriteGuard<'_, HashMap<String, Record>>> {
        self.records
            .write()
            .map_err(|_| StorageError::LockPoisoned.into())
    }
}

fn merge_into(map: &mut HashMap<String, Record>, record: Record) -> BTreeSet<String> {
    match map.get_mut(record.key()) {
        Some(existing) => existing.merge(record),
        None => {
            let changed = record.field_keys();
            map.insert(record.key().to_string(), record);
            changed
        }
    }
}

impl RecordStore for InMemoryRecordStore {
    fn read(&self, key: &str) -> PrismResult<Option<Record>> {
        let records = self.read_guard()?;
        Ok(records.get(key).cloned())
    }

    fn read_many(&self, keys: &[String]) -> PrismResult<BTreeMap<String, Record>> {
        let records = self.read_guard()?;
        Ok(keys
            .iter()
            .filter_map(|k| records.get(k).map(|r| (k.clone(), r.clone())))
            .collect())
    }

    fn merge(&self, record: Record) -> PrismResult<BTreeSet<String>> {
        let mut records = self.write_guard()?;
        Ok(merge_into(&mut records, record))
    }

    fn merge_many(&self, batch: Vec<Record>) -> PrismResult<BTreeSet<String>> {
        let mut records = self.write_guard()?;
        let mut changed = BTreeSet::new();
        for record in batch {
            changed.extend(merge_into(&mut records, record));
        }
        Ok(changed)
    }

    fn delete(&self, key: &str) -> PrismResult<bool> {
        let mut records = self.write_guard()?;
        Ok(records.remove(key).is_some())
    }

    fn clear_all(&self) -> PrismResult<BTreeSet<String>> {
        let mut records = self.write_guard()?;
        let cleared = records.values().flat_map(Record::field_keys).collect();
        records.clear();
        Ok(cleared)
    }
}

// ============================================================================
// TESTS
// ============================================================================


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn batch_strategy() -> impl Strategy<Value = Vec<(u8, String, i64)>> {
        prop::collection::vec((0u8..4, "[a-d]", any::<i64>()), 1..20)
    }

    fn to_records(batch: &[(u8, String, i64)]) -> Vec<Record> {
        batch
            .iter()
            .map(|(k, f, v)| Record::new(format!("K:{}", k)).with_field(f.clone(), *v))
            .collect()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Merging a batch at once equals merging it record by record.
        #[test]
        fn prop_merge_many_matches_sequential_merge(batch in batch_strategy()) {
            let a = InMemoryRecordStore::new();
            let b = InMemoryRecordStore::new();

            let changed_a = a.merge_many(to_records(&batch)).unwrap();
            let mut changed_b = BTreeSet::new();
            for record in to_records(&batch) {
                changed_b.extend(b.merge(record).unwrap());
            }

            prop_assert_eq!(changed_a, changed_b);
            for key in a.keys() {
                prop_assert_eq!(a.read(&key).unwrap(), b.read(&key).unwrap());
            }
        }

        /// The last write to a field wins and every written field survives.
        #[test]
        fn prop_last_write_wins(batch in batch_strategy()) {
            let store = InMemoryRecordStore::new();
            store.merge_many(to_records(&batch)).unwrap();

            let mut expected: BTreeMap<(u8, String), i64> = BTreeMap::new();
            for (k, f, v) in &batch {
                expected.insert((*k, f.clone()), *v);
            }
            for ((k, f), v) in expected {
                let record = store.read(&format!("K:{}", k)).unwrap().unwrap();
                prop_assert_eq!(record.field(&f), Some(&prism_core::FieldValue::from(v)));
            }
        }
    }
}
