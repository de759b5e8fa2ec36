//! Response normalization
//!
//! [`ResponseNormalizer::normalize`] flattens a nested response tree into
//! records, replacing every composite value with a reference to its own
//! record. [`ResponseNormalizer::denormalize`] rebuilds the tree for a
//! selection shape by following references, failing with a cache miss as
//! soon as any requested field is absent. A partially satisfied read never
//! produces a result.
//!
//! Objects the key resolver cannot identify are keyed by their path from
//! the root, `<parent key>.<field cache key>`, with list items suffixed by
//! their index.

use prism_core::{
    field_key, type_name_of, CacheKeyResolver, CacheMissError, CacheReference, FieldType,
    FieldValue, JsonObject, NormalizeError, PrismResult, Record, RecordSet, ResponseField,
    Variables, TYPENAME_FIELD,
};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::cache::ReadableCache;

/// How absent fields are treated while normalizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeMode {
    /// Network responses: every selected field must be present, and
    /// non-optional fields must be non-null.
    Strict,
    /// Locally built trees: absent fields are skipped, leaving whatever the
    /// store already holds for them.
    Lenient,
}

/// A tree rebuilt from the cache, with the record keys it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct Denormalized {
    pub data: JsonObject,
    pub dependent_keys: BTreeSet<String>,
}

/// Converts response trees to records and back.
#[derive(Clone)]
pub struct ResponseNormalizer {
    resolver: Arc<dyn CacheKeyResolver>,
    mode: NormalizeMode,
}

impl std::fmt::Debug for ResponseNormalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseNormalizer")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl ResponseNormalizer {
    pub fn new(resolver: Arc<dyn CacheKeyResolver>, mode: NormalizeMode) -> Self {
        Self { resolver, mode }
    }

    /// Normalizer for server responses.
    pub fn strict(resolver: Arc<dyn CacheKeyResolver>) -> Self {
        Self::new(resolver, NormalizeMode::Strict)
    }

    /// Normalizer for locally written trees.
    pub fn lenient(resolver: Arc<dyn CacheKeyResolver>) -> Self {
        Self::new(resolver, NormalizeMode::Lenient)
    }

    pub fn mode(&self) -> NormalizeMode {
        self.mode
    }

    pub fn resolver(&self) -> &Arc<dyn CacheKeyResolver> {
        &self.resolver
    }

    /// Flatten `data` into records, rooted at `root_key`.
    ///
    /// Objects sharing a key anywhere in the tree are merged into one record.
    pub fn normalize(
        &self,
        root_key: &str,
        data: &JsonObject,
        selections: &[ResponseField],
        variables: &Variables,
    ) -> Result<RecordSet, NormalizeError> {
        let mut walker = NormalizeWalker {
            resolver: self.resolver.as_ref(),
            mode: self.mode,
            variables,
            records: RecordSet::new(),
        };
        walker.walk_object(root_key, data, selections)?;
        Ok(walker.records)
    }

    /// Rebuild the tree for `selections` starting at the record `root_key`.
    pub fn denormalize(
        &self,
        cache: &dyn ReadableCache,
        root_key: &str,
        selections: &[ResponseField],
        variables: &Variables,
    ) -> PrismResult<Denormalized> {
        let mut walker = DenormalizeWalker {
            cache,
            resolver: self.resolver.as_ref(),
            variables,
            prefetched: BTreeMap::new(),
            dependent_keys: BTreeSet::new(),
        };
        let root = walker.load(root_key)?;
        let data = walker.read_object(&root, selections)?;
        Ok(Denormalized {
            data,
            dependent_keys: walker.dependent_keys,
        })
    }
}

// ============================================================================
// NORMALIZE
// ============================================================================

struct NormalizeWalker<'a> {
    resolver: &'a dyn CacheKeyResolver,
    mode: NormalizeMode,
    variables: &'a Variables,
    records: RecordSet,
}

impl NormalizeWalker<'_> {
    fn walk_object(
        &mut self,
        key: &str,
        object: &JsonObject,
        selections: &[ResponseField],
    ) -> Result<(), NormalizeError> {
        self.records.entry(key);
        for field in selections {
            let cache_key = field.cache_key(self.variables);
            let path = field_key(key, &cache_key);

            let value = match object.get(field.response_name()) {
                Some(value) => value,
                None if self.mode == NormalizeMode::Lenient => continue,
                None if field.is_optional() => &Value::Null,
                None => return Err(NormalizeError::MissingField { path }),
            };
            if value.is_null() && !field.is_optional() && self.mode == NormalizeMode::Strict {
                return Err(NormalizeError::UnexpectedNull { path });
            }

            let stored = self.normalize_value(&path, field.field_type(), value)?;
            self.records.entry(key).set_field(cache_key, stored);
        }
        Ok(())
    }

    fn normalize_value(
        &mut self,
        path: &str,
        field_type: &FieldType,
        value: &Value,
    ) -> Result<FieldValue, NormalizeError> {
        if value.is_null() {
            return Ok(FieldValue::Null);
        }
        match field_type {
            FieldType::Scalar | FieldType::Custom(_) => {
                FieldValue::from_json_scalar(value).ok_or_else(|| NormalizeError::TypeMismatch {
                    path: path.to_string(),
                    expected: "scalar".to_string(),
                    found: type_name_of(value).to_string(),
                })
            }
            FieldType::Object(selections) => {
                let object = value.as_object().ok_or_else(|| NormalizeError::TypeMismatch {
                    path: path.to_string(),
                    expected: "object".to_string(),
                    found: type_name_of(value).to_string(),
                })?;
                let type_name = object.get(TYPENAME_FIELD).and_then(Value::as_str);
                let key = self
                    .resolver
                    .from_response(type_name, object)
                    .map(|k| k.into_string())
                    .unwrap_or_else(|| path.to_string());
                self.walk_object(&key, object, selections)?;
                Ok(FieldValue::Reference(CacheReference::new(key)))
            }
            FieldType::List(inner) => {
                let items = value.as_array().ok_or_else(|| NormalizeError::TypeMismatch {
                    path: path.to_string(),
                    expected: "list".to_string(),
                    found: type_name_of(value).to_string(),
                })?;
                let values = items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| self.normalize_value(&format!("{}.{}", path, i), inner, item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(FieldValue::List(values))
            }
        }
    }
}

// ============================================================================
// DENORMALIZE
// ============================================================================

struct DenormalizeWalker<'a> {
    cache: &'a dyn ReadableCache,
    resolver: &'a dyn CacheKeyResolver,
    variables: &'a Variables,
    prefetched: BTreeMap<String, Record>,
    dependent_keys: BTreeSet<String>,
}

impl DenormalizeWalker<'_> {
    fn load(&mut self, key: &str) -> PrismResult<Record> {
        if let Some(record) = self.prefetched.get(key) {
            return Ok(record.clone());
        }
        self.cache
            .read(key)?
            .ok_or_else(|| CacheMissError::MissingRecord { key: key.to_string() }.into())
    }

    fn read_object(
        &mut self,
        record: &Record,
        selections: &[ResponseField],
    ) -> PrismResult<JsonObject> {
        self.dependent_keys.insert(record.key().to_string());
        let mut out = JsonObject::new();
        for field in selections {
            let cache_key = field.cache_key(self.variables);
            let value = match self.redirect(field)? {
                Some(reference) => FieldValue::Reference(reference),
                None => record
                    .field(&cache_key)
                    .cloned()
                    .ok_or_else(|| CacheMissError::MissingField {
                        key: record.key().to_string(),
                        field: cache_key.clone(),
                    })?,
            };
            let json = self.read_value(record.key(), &cache_key, field.field_type(), &value)?;
            out.insert(field.response_name().to_string(), json);
        }
        Ok(out)
    }

    /// Resolve an object field straight from its arguments when the
    /// resolver knows the key and that record is present.
    fn redirect(&mut self, field: &ResponseField) -> PrismResult<Option<CacheReference>> {
        if !matches!(field.field_type(), FieldType::Object(_)) {
            return Ok(None);
        }
        let arguments = field.resolve_arguments(self.variables);
        let Some(key) = self.resolver.from_arguments(field, &arguments) else {
            return Ok(None);
        };
        match self.cache.read(key.as_str())? {
            Some(record) => {
                self.prefetched.insert(record.key().to_string(), record);
                Ok(Some(CacheReference::from(key)))
            }
            None => Ok(None),
        }
    }

    fn read_value(
        &mut self,
        key: &str,
        field: &str,
        field_type: &FieldType,
        value: &FieldValue,
    ) -> PrismResult<Value> {
        let unexpected = |reason: &str| -> prism_core::PrismError {
            CacheMissError::UnexpectedValue {
                key: key.to_string(),
                field: field.to_string(),
                reason: reason.to_string(),
            }
            .into()
        };
        match (field_type, value) {
            (_, FieldValue::Null) => Ok(Value::Null),
            (FieldType::Object(selections), FieldValue::Reference(reference)) => {
                let record = self.load(reference.key())?;
                Ok(Value::Object(self.read_object(&record, selections)?))
            }
            (FieldType::Object(_), _) => Err(unexpected("expected a reference")),
            (FieldType::List(inner), FieldValue::List(items)) => {
                self.prefetch(items)?;
                let values = items
                    .iter()
                    .map(|item| self.read_value(key, field, inner, item))
                    .collect::<PrismResult<Vec<_>>>()?;
                Ok(Value::Array(values))
            }
            (FieldType::List(_), _) => Err(unexpected("expected a list")),
            (FieldType::Scalar | FieldType::Custom(_), v) => v
                .to_json_scalar()
                .ok_or_else(|| unexpected("expected a scalar")),
        }
    }

    /// Batch-load the records a list refers to.
    fn prefetch(&mut self, items: &[FieldValue]) -> PrismResult<()> {
        let keys: Vec<String> = items
            .iter()
            .filter_map(FieldValue::as_reference)
            .map(|r| r.key().to_string())
            .filter(|k| !self.prefetched.contains_key(k))
            .collect();
        if keys.len() > 1 {
            self.prefetched.extend(self.cache.read_many(&keys)?);
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::StoreReader;
    use crate::{InMemoryRecordStore, RecordStore};
    use prism_core::{Argument, IdFieldResolver, NoKeyResolver, QUERY_ROOT_KEY};
    use serde_json::json;

    fn object(value: Value) -> JsonObject {
        value.as_object().cloned().unwrap()
    }

    fn vars(value: Value) -> Variables {
        value.as_object().cloned().unwrap()
    }

    fn user_selections() -> Vec<ResponseField> {
        vec![ResponseField::object(
            "user",
            vec![
                ResponseField::typename(),
                ResponseField::scalar("id"),
                ResponseField::scalar("name"),
            ],
        )
        .with_argument("id", Argument::variable("id"))]
    }

    fn strict() -> ResponseNormalizer {
        ResponseNormalizer::strict(Arc::new(IdFieldResolver::new()))
    }

    fn store_with(records: RecordSet) -> InMemoryRecordStore {
        let store = InMemoryRecordStore::new();
        store.merge_many(records.into_records()).unwrap();
        store
    }

    #[test]
    fn test_normalize_identified_object() {
        let data = object(json!({
            "user": {"__typename": "User", "id": "1", "name": "Ada"}
        }));
        let records = strict()
            .normalize(QUERY_ROOT_KEY, &data, &user_selections(), &vars(json!({"id": "1"})))
            .unwrap();

        assert_eq!(records.len(), 2);
        let root = records.get(QUERY_ROOT_KEY).unwrap();
        assert_eq!(
            root.field("user({\"id\":\"1\"})"),
            Some(&FieldValue::Reference(CacheReference::new("User:1")))
        );
        let user = records.get("User:1").unwrap();
        assert_eq!(user.field("name"), Some(&FieldValue::from("Ada")));
    }

    #[test]
    fn test_normalize_unidentified_object_uses_path_key() {
        let data = object(json!({"viewer": {"name": "Ada"}}));
        let selections = vec![ResponseField::object(
            "viewer",
            vec![ResponseField::scalar("name")],
        )];
        let normalizer = ResponseNormalizer::strict(Arc::new(NoKeyResolver));
        let records = normalizer
            .normalize(QUERY_ROOT_KEY, &data, &selections, &Variables::new())
            .unwrap();
        assert!(records.get("QUERY_ROOT.viewer").is_some());
    }

    #[test]
    fn test_normalize_list_items_use_index_paths() {
        let data = object(json!({"tags": [{"label": "a"}, {"label": "b"}]}));
        let selections = vec![ResponseField::object_list(
            "tags",
            vec![ResponseField::scalar("label")],
        )];
        let normalizer = ResponseNormalizer::strict(Arc::new(NoKeyResolver));
        let records = normalizer
            .normalize(QUERY_ROOT_KEY, &data, &selections, &Variables::new())
            .unwrap();
        assert!(records.get("QUERY_ROOT.tags.0").is_some());
        assert!(records.get("QUERY_ROOT.tags.1").is_some());
        let root = records.get(QUERY_ROOT_KEY).unwrap();
        match root.field("tags") {
            Some(FieldValue::List(items)) => assert_eq!(items.len(), 2),
            other => panic!("unexpected tags value {:?}", other),
        }
    }

    #[test]
    fn test_normalize_merges_repeated_keys() {
        let data = object(json!({
            "me": {"__typename": "User", "id": "1", "name": "Ada"},
            "author": {"__typename": "User", "id": "1", "email": "ada@example.com"}
        }));
        let selections = vec![
            ResponseField::object(
                "me",
                vec![
                    ResponseField::typename(),
                    ResponseField::scalar("id"),
                    ResponseField::scalar("name"),
                ],
            ),
            ResponseField::object(
                "author",
                vec![
                    ResponseField::typename(),
                    ResponseField::scalar("id"),
                    ResponseField::scalar("email"),
                ],
            ),
        ];
        let records = strict()
            .normalize(QUERY_ROOT_KEY, &data, &selections, &Variables::new())
            .unwrap();
        assert_eq!(records.len(), 2);
        let user = records.get("User:1").unwrap();
        assert!(user.has_field("name"));
        assert!(user.has_field("email"));
    }

    #[test]
    fn test_strict_missing_field_fails() {
        let data = object(json!({"user": {"__typename": "User", "id": "1"}}));
        let err = strict()
            .normalize(QUERY_ROOT_KEY, &data, &user_selections(), &vars(json!({"id": "1"})))
            .unwrap_err();
        assert!(matches!(err, NormalizeError::MissingField { ref path } if path == "User:1.name"));
    }

    #[test]
    fn test_strict_null_for_required_field_fails() {
        let data = object(json!({"user": null}));
        let err = strict()
            .normalize(QUERY_ROOT_KEY, &data, &user_selections(), &vars(json!({"id": "1"})))
            .unwrap_err();
        assert!(matches!(err, NormalizeError::UnexpectedNull { .. }));
    }

    #[test]
    fn test_optional_null_is_stored_as_null() {
        let data = object(json!({"nickname": null}));
        let selections = vec![ResponseField::scalar("nickname").optional()];
        let records = strict()
            .normalize(QUERY_ROOT_KEY, &data, &selections, &Variables::new())
            .unwrap();
        let root = records.get(QUERY_ROOT_KEY).unwrap();
        assert_eq!(root.field("nickname"), Some(&FieldValue::Null));
    }

    #[test]
    fn test_object_where_scalar_expected_is_rejected() {
        let data = object(json!({"name": {"first": "Ada"}}));
        let selections = vec![ResponseField::scalar("name")];
        let err = strict()
            .normalize(QUERY_ROOT_KEY, &data, &selections, &Variables::new())
            .unwrap_err();
        assert!(matches!(err, NormalizeError::TypeMismatch { ref expected, .. } if expected == "scalar"));
    }

    #[test]
    fn test_lenient_skips_absent_fields() {
        let data = object(json!({"user": {"__typename": "User", "id": "1"}}));
        let normalizer = ResponseNormalizer::lenient(Arc::new(IdFieldResolver::new()));
        let records = normalizer
            .normalize(QUERY_ROOT_KEY, &data, &user_selections(), &vars(json!({"id": "1"})))
            .unwrap();
        let user = records.get("User:1").unwrap();
        assert!(!user.has_field("name"));
        assert!(user.has_field("id"));
    }

    #[test]
    fn test_round_trip() {
        let data = object(json!({
            "user": {"__typename": "User", "id": "1", "name": "Ada"}
        }));
        let variables = vars(json!({"id": "1"}));
        let normalizer = strict();
        let records = normalizer
            .normalize(QUERY_ROOT_KEY, &data, &user_selections(), &variables)
            .unwrap();
        let store = store_with(records);

        let read = normalizer
            .denormalize(&StoreReader::new(&store), QUERY_ROOT_KEY, &user_selections(), &variables)
            .unwrap();
        assert_eq!(read.data, data);
        assert_eq!(
            read.dependent_keys,
            BTreeSet::from([QUERY_ROOT_KEY.to_string(), "User:1".to_string()])
        );
    }

    #[test]
    fn test_round_trip_over_reference_cycle() {
        fn user(friend: Vec<ResponseField>) -> Vec<ResponseField> {
            let mut fields = vec![ResponseField::typename(), ResponseField::scalar("id")];
            if !friend.is_empty() {
                fields.push(ResponseField::object("friend", friend));
            }
            fields
        }
        let selections = vec![ResponseField::object(
            "me",
            user(user(user(Vec::new()))),
        )];
        let data = object(json!({
            "me": {
                "__typename": "User", "id": "1",
                "friend": {
                    "__typename": "User", "id": "2",
                    "friend": {"__typename": "User", "id": "1"}
                }
            }
        }));
        let normalizer = strict();
        let records = normalizer
            .normalize(QUERY_ROOT_KEY, &data, &selections, &Variables::new())
            .unwrap();
        assert_eq!(
            records.get("User:1").unwrap().field("friend"),
            Some(&FieldValue::Reference(CacheReference::new("User:2")))
        );
        assert_eq!(
            records.get("User:2").unwrap().field("friend"),
            Some(&FieldValue::Reference(CacheReference::new("User:1")))
        );
        let store = store_with(records);

        let read = normalizer
            .denormalize(&StoreReader::new(&store), QUERY_ROOT_KEY, &selections, &Variables::new())
            .unwrap();
        assert_eq!(read.data, data);
        assert_eq!(
            read.dependent_keys,
            BTreeSet::from([
                QUERY_ROOT_KEY.to_string(),
                "User:1".to_string(),
                "User:2".to_string(),
            ])
        );
    }

    #[test]
    fn test_denormalize_missing_field_is_a_miss() {
        let store = InMemoryRecordStore::with_records(vec![
            Record::new(QUERY_ROOT_KEY)
                .with_field("user({\"id\":\"1\"})", CacheReference::new("User:1")),
            Record::new("User:1").with_field("__typename", "User").with_field("id", "1"),
        ]);
        let err = strict()
            .denormalize(
                &StoreReader::new(&store),
                QUERY_ROOT_KEY,
                &user_selections(),
                &vars(json!({"id": "1"})),
            )
            .unwrap_err();
        assert!(err.is_cache_miss());
    }

    #[test]
    fn test_denormalize_empty_store_is_a_miss() {
        let store = InMemoryRecordStore::new();
        let err = strict()
            .denormalize(
                &StoreReader::new(&store),
                QUERY_ROOT_KEY,
                &user_selections(),
                &vars(json!({"id": "1"})),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            prism_core::PrismError::CacheMiss(CacheMissError::MissingRecord { .. })
        ));
    }

    #[test]
    fn test_denormalize_redirects_through_arguments() {
        let store = InMemoryRecordStore::with_records(vec![
            Record::new(QUERY_ROOT_KEY),
            Record::new("User:7")
                .with_field("__typename", "User")
                .with_field("id", "7")
                .with_field("name", "Grace"),
        ]);
        let normalizer = ResponseNormalizer::strict(Arc::new(
            IdFieldResolver::new().with_argument_lookup("user", "User"),
        ));
        let read = normalizer
            .denormalize(
                &StoreReader::new(&store),
                QUERY_ROOT_KEY,
                &user_selections(),
                &vars(json!({"id": "7"})),
            )
            .unwrap();
        assert_eq!(read.data["user"]["name"], json!("Grace"));
    }

    #[test]
    fn test_denormalize_list_of_references() {
        let data = object(json!({
            "friends": [
                {"__typename": "User", "id": "1", "name": "Ada"},
                {"__typename": "User", "id": "2", "name": "Grace"},
                null
            ]
        }));
        let selections = vec![ResponseField::object_list(
            "friends",
            vec![
                ResponseField::typename(),
                ResponseField::scalar("id"),
                ResponseField::scalar("name"),
            ],
        )];
        let normalizer = strict();
        let records = normalizer
            .normalize(QUERY_ROOT_KEY, &data, &selections, &Variables::new())
            .unwrap();
        let store = store_with(records);
        let read = normalizer
            .denormalize(&StoreReader::new(&store), QUERY_ROOT_KEY, &selections, &Variables::new())
            .unwrap();
        assert_eq!(read.data, data);
        assert_eq!(read.dependent_keys.len(), 3);
    }

    #[test]
    fn test_aliases_share_stored_value() {
        let data = object(json!({"me": {"__typename": "User", "id": "1", "name": "Ada"}}));
        let selections = vec![ResponseField::object(
            "viewer",
            vec![
                ResponseField::typename(),
                ResponseField::scalar("id"),
                ResponseField::scalar("name"),
            ],
        )
        .with_alias("me")];
        let normalizer = strict();
        let store = store_with(
            normalizer
                .normalize(QUERY_ROOT_KEY, &data, &selections, &Variables::new())
                .unwrap(),
        );
        let root = store.read(QUERY_ROOT_KEY).unwrap().unwrap();
        assert!(root.has_field("viewer"));

        let unaliased = vec![ResponseField::object(
            "viewer",
            vec![ResponseField::scalar("name")],
        )];
        let read = normalizer
            .denormalize(&StoreReader::new(&store), QUERY_ROOT_KEY, &unaliased, &Variables::new())
            .unwrap();
        assert_eq!(read.data["viewer"]["name"], json!("Ada"));
    }
}

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
