//! Transaction views over a [`RecordStore`].

use prism_core::{field_key, PrismResult, Record, RecordSet};
use std::collections::{BTreeMap, BTreeSet};

use super::traits::{ReadableCache, WriteableCache};
use crate::RecordStore;

/// Read view straight over a store.
pub struct StoreReader<'a> {
    store: &'a dyn RecordStore,
}

impl<'a> StoreReader<'a> {
    pub fn new(store: &'a dyn RecordStore) -> Self {
        Self { store }
    }
}

impl ReadableCache for StoreReader<'_> {
    fn read(&self, key: &str) -> PrismResult<Option<Record>> {
        self.store.read(key)
    }

    fn read_many(&self, keys: &[String]) -> PrismResult<BTreeMap<String, Record>> {
        self.store.read_many(keys)
    }
}

/// Staged writes over a store.
///
/// Removals are applied before merges at commit, so a record removed and
/// then merged again in the same transaction ends up holding only the
/// fields merged after the removal.
pub struct WriteTransaction<'a> {
    store: &'a dyn RecordStore,
    staged: RecordSet,
    removed: BTreeSet<String>,
}

impl<'a> WriteTransaction<'a> {
    pub fn new(store: &'a dyn RecordStore) -> Self {
        Self {
            store,
            staged: RecordSet::new(),
            removed: BTreeSet::new(),
        }
    }

    /// Whether nothing has been staged.
    pub fn is_empty(&self) -> bool {
        self.staged.is_empty() && self.removed.is_empty()
    }

    fn base(&self, key: &str) -> PrismResult<Option<Record>> {
        if self.removed.contains(key) {
            return Ok(None);
        }
        self.store.read(key)
    }

    /// Apply the staged writes to the store, returning the change set.
    pub fn commit(self) -> PrismResult<BTreeSet<String>> {
        let mut changed = BTreeSet::new();
        for key in &self.removed {
            if let Some(record) = self.store.read(key)? {
                self.store.delete(key)?;
                changed.extend(record.field_keys());
            }
        }
        if !self.staged.is_empty() {
            let merged = self.store.merge_many(self.staged.into_records())?;
            changed.extend(merged);
        }
        Ok(changed)
    }
}

impl ReadableCache for WriteTransaction<'_> {
    fn read(&self, key: &str) -> PrismResult<Option<Record>> {
        let base = self.base(key)?;
        match (base, self.staged.get(key)) {
            (None, None) => Ok(None),
            (Some(record), None) => Ok(Some(record)),
            (None, Some(staged)) => Ok(Some(staged.clone())),
            (Some(mut record), Some(staged)) => {
                record.merge(staged.clone());
                Ok(Some(record))
            }
        }
    }

    fn read_many(&self, keys: &[String]) -> PrismResult<BTreeMap<String, Record>> {
        let mut out = BTreeMap::new();
        for key in keys {
            if let Some(record) = self.read(key)? {
                out.insert(key.clone(), record);
            }
        }
        Ok(out)
    }
}

impl WriteableCache for WriteTransaction<'_> {
    fn merge(&mut self, record: Record) -> PrismResult<BTreeSet<String>> {
        let current = self.read(record.key())?;
        let changed = match current {
            Some(current) => record
                .fields()
                .iter()
                .filter(|(field, value)| current.field(field) != Some(*value))
                .map(|(field, _)| field_key(record.key(), field))
                .collect(),
            None => record.field_keys(),
        };
        self.staged.merge(record);
        Ok(changed)
    }

    fn remove(&mut self, key: &str) -> PrismResult<bool> {
        let visible = self.read(key)?.is_some();
        self.removed.insert(key.to_string());
        self.staged.remove(key);
        Ok(visible)
    }

    fn as_readable(&self) -> &dyn ReadableCache {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryRecordStore;

    fn seeded() -> InMemoryRecordStore {
        InMemoryRecordStore::with_records(vec![Record::new("User:1")
            .with_field("id", "1")
            .with_field("name", "Ada")])
    }

    #[test]
    fn test_staged_writes_are_invisible_until_commit() {
        let store = seeded();
        let mut tx = WriteTransaction::new(&store);
        tx.merge(Record::new("User:1").with_field("email", "ada@example.com"))
            .unwrap();

        assert!(tx.read("User:1").unwrap().unwrap().has_field("email"));
        assert!(!store.read("User:1").unwrap().unwrap().has_field("email"));

        let changed = tx.commit().unwrap();
        assert_eq!(changed, BTreeSet::from(["User:1.email".to_string()]));
        assert!(store.read("User:1").unwrap().unwrap().has_field("email"));
    }

    #[test]
    fn test_dropped_transaction_commits_nothing() {
        let store = seeded();
        {
            let mut tx = WriteTransaction::new(&store);
            tx.merge(Record::new("User:2").with_field("id", "2")).unwrap();
        }
        assert!(store.read("User:2").unwrap().is_none());
    }

    #[test]
    fn test_merge_reports_changes_against_view() {
        let store = seeded();
        let mut tx = WriteTransaction::new(&store);
        let changed = tx
            .merge(Record::new("User:1").with_field("id", "1").with_field("name", "Grace"))
            .unwrap();
        assert_eq!(changed, BTreeSet::from(["User:1.name".to_string()]));
    }

    #[test]
    fn test_remove_then_merge() {
        let store = seeded();
        let mut tx = WriteTransaction::new(&store);
        assert!(tx.remove("User:1").unwrap());
        assert!(tx.read("User:1").unwrap().is_none());
        tx.merge(Record::new("User:1").with_field("id", "1")).unwrap();

        let changed = tx.commit().unwrap();
        assert!(changed.contains("User:1.name"));
        let stored = store.read("User:1").unwrap().unwrap();
        assert_eq!(stored.len(), 1);
    }
}
