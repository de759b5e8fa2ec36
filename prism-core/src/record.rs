//! Record model
//!
//! A [`Record`] is the flattened state of one entity: a map from field cache
//! key to [`FieldValue`]. Composite fields never embed another record; they
//! hold a [`CacheReference`] to it, so every entity has exactly one owner
//! (the store) and fields can be merged one at a time.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Stable identity of one entity instance across all operations.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Named pointer to another record. A lookup key, never an owner.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CacheReference(String);

impl CacheReference {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn key(&self) -> &str {
        &self.0
    }
}

impl From<CacheKey> for CacheReference {
    fn from(key: CacheKey) -> Self {
        Self(key.0)
    }
}

/// A single stored field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<FieldValue>),
    Reference(CacheReference),
}

impl FieldValue {
    /// Convert a JSON leaf (or list of leaves) into a stored value.
    ///
    /// Returns `None` for JSON objects, which must be normalized into their
    /// own records instead.
    pub fn from_json_scalar(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::Null),
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => Some(Self::Number(n.clone())),
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(Self::from_json_scalar)
                .collect::<Option<Vec<_>>>()
                .map(Self::List),
            Value::Object(_) => None,
        }
    }

    /// Convert back into JSON. References have no JSON form and yield `None`.
    pub fn to_json_scalar(&self) -> Option<Value> {
        match self {
            Self::Null => Some(Value::Null),
            Self::Bool(b) => Some(Value::Bool(*b)),
            Self::Number(n) => Some(Value::Number(n.clone())),
            Self::String(s) => Some(Value::String(s.clone())),
            Self::List(items) => items
                .iter()
                .map(Self::to_json_scalar)
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
            Self::Reference(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_reference(&self) -> Option<&CacheReference> {
        match self {
            Self::Reference(r) => Some(r),
            _ => None,
        }
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a CacheReference>) {
        match self {
            Self::Reference(r) => out.push(r),
            Self::List(items) => items.iter().for_each(|i| i.collect_references(out)),
            _ => {}
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl From<CacheReference> for FieldValue {
    fn from(r: CacheReference) -> Self {
        Self::Reference(r)
    }
}

/// Qualify a field with its record key, e.g. `User:1.name`.
pub fn field_key(record_key: &str, field: &str) -> String {
    format!("{}.{}", record_key, field)
}

/// Flattened fields of one entity at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    key: String,
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    /// Create an empty record.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field insertion.
    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub fn field(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn set_field(&mut self, field: impl Into<String>, value: FieldValue) {
        self.fields.insert(field.into(), value);
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field-qualified keys of every field in this record.
    pub fn field_keys(&self) -> BTreeSet<String> {
        self.fields
            .keys()
            .map(|f| field_key(&self.key, f))
            .collect()
    }

    /// Every reference held by this record, including those inside lists.
    pub fn references(&self) -> Vec<&CacheReference> {
        let mut out = Vec::new();
        for value in self.fields.values() {
            value.collect_references(&mut out);
        }
        out
    }

    /// Merge `other`'s fields into this record, field by field.
    ///
    /// Fields absent from `other` are left untouched. Returns the
    /// field-qualified keys whose value actually changed; overwriting a field
    /// with an identical value is not a change.
    pub fn merge(&mut self, other: Record) -> BTreeSet<String> {
        let mut changed = BTreeSet::new();
        for (field, value) in other.fields {
            match self.fields.get(&field) {
                Some(existing) if *existing == value => {}
                _ => {
                    changed.insert(field_key(&self.key, &field));
                    self.fields.insert(field, value);
                }
            }
        }
        changed
    }
}

/// Records produced by one normalization pass, keyed by cache key.
///
/// Adding a record whose key is already present merges into the in-progress
/// record instead of replacing it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSet {
    records: BTreeMap<String, Record>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a record into the set, returning the changed field keys.
    pub fn merge(&mut self, record: Record) -> BTreeSet<String> {
        match self.records.get_mut(record.key()) {
            Some(existing) => existing.merge(record),
            None => {
                let changed = record.field_keys();
                self.records.insert(record.key().to_string(), record);
                changed
            }
        }
    }

    /// Get or create the in-progress record for `key`.
    pub fn entry(&mut self, key: &str) -> &mut Record {
        self.records
            .entry(key.to_string())
            .or_insert_with(|| Record::new(key))
    }

    pub fn get(&self, key: &str) -> Option<&Record> {
        self.records.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Record> {
        self.records.remove(key)
    }

    pub fn keys(&self) -> BTreeSet<String> {
        self.records.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records.into_values().collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn fields_strategy(prefix: &'static str) -> impl Strategy<Value = BTreeMap<String, i64>> {
        prop::collection::btree_map("[a-z]{1,6}", any::<i64>(), 0..8).prop_map(move |m| {
            m.into_iter()
                .map(|(k, v)| (format!("{}_{}", prefix, k), v))
                .collect()
        })
    }

    fn record_from(key: &str, fields: &BTreeMap<String, i64>) -> Record {
        fields
            .iter()
            .fold(Record::new(key), |r, (f, v)| r.with_field(f.clone(), *v))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Merging a record with a disjoint field set keeps every original field.
        #[test]
        fn prop_merge_disjoint_is_additive(
            left in fields_strategy("l"),
            right in fields_strategy("r"),
        ) {
            let mut stored = record_from("E:1", &left);
            let changed = stored.merge(record_from("E:1", &right));

            prop_assert_eq!(stored.len(), left.len() + right.len());
            for (field, value) in &left {
                prop_assert_eq!(stored.field(field), Some(&FieldValue::from(*value)));
            }
            prop_assert_eq!(changed.len(), right.len());
        }

        /// Re-merging the same record never reports a change.
        #[test]
        fn prop_merge_is_idempotent(fields in fields_strategy("f")) {
            let record = record_from("E:1", &fields);
            let mut stored = record.clone();
            prop_assert!(stored.merge(record).is_empty());
        }
    }
}
