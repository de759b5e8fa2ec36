//! Typed reads over a generic response tree.
//!
//! Response mappers never touch JSON directly; they read through a
//! [`ResponseReader`] so that missing fields, type mismatches and custom
//! scalars all surface as [`MappingError`]s.

use serde_json::Value;

use crate::error::MappingError;
use crate::json::JsonObject;
use crate::scalar::{ScalarType, ScalarTypeAdapters};

/// Reader over one object of a response tree.
#[derive(Debug, Clone, Copy)]
pub struct ResponseReader<'a> {
    object: &'a JsonObject,
    adapters: &'a ScalarTypeAdapters,
}

impl<'a> ResponseReader<'a> {
    pub fn new(object: &'a JsonObject, adapters: &'a ScalarTypeAdapters) -> Self {
        Self { object, adapters }
    }

    pub fn object(&self) -> &'a JsonObject {
        self.object
    }

    /// Raw value of a field, `None` if absent.
    pub fn raw(&self, name: &str) -> Option<&'a Value> {
        self.object.get(name)
    }

    fn required(&self, name: &str) -> Result<&'a Value, MappingError> {
        match self.object.get(name) {
            None | Some(Value::Null) => Err(MappingError::MissingField {
                field: name.to_string(),
            }),
            Some(v) => Ok(v),
        }
    }

    fn mismatch(name: &str, expected: &str) -> MappingError {
        MappingError::TypeMismatch {
            field: name.to_string(),
            expected: expected.to_string(),
        }
    }

    pub fn is_null(&self, name: &str) -> bool {
        matches!(self.object.get(name), None | Some(Value::Null))
    }

    pub fn read_string(&self, name: &str) -> Result<String, MappingError> {
        self.required(name)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Self::mismatch(name, "string"))
    }

    pub fn read_opt_string(&self, name: &str) -> Result<Option<String>, MappingError> {
        if self.is_null(name) {
            return Ok(None);
        }
        self.read_string(name).map(Some)
    }

    pub fn read_i64(&self, name: &str) -> Result<i64, MappingError> {
        self.required(name)?
            .as_i64()
            .ok_or_else(|| Self::mismatch(name, "integer"))
    }

    pub fn read_f64(&self, name: &str) -> Result<f64, MappingError> {
        self.required(name)?
            .as_f64()
            .ok_or_else(|| Self::mismatch(name, "number"))
    }

    pub fn read_bool(&self, name: &str) -> Result<bool, MappingError> {
        self.required(name)?
            .as_bool()
            .ok_or_else(|| Self::mismatch(name, "boolean"))
    }

    pub fn read_string_list(&self, name: &str) -> Result<Vec<String>, MappingError> {
        self.required(name)?
            .as_array()
            .ok_or_else(|| Self::mismatch(name, "list"))?
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| Self::mismatch(name, "list of strings"))
            })
            .collect()
    }

    /// Read a list of scalars, converting each item with `f`.
    ///
    /// `f` returns `None` for an item of the wrong type.
    pub fn read_list<T, F>(&self, name: &str, f: F) -> Result<Vec<T>, MappingError>
    where
        F: Fn(&'a Value) -> Option<T>,
    {
        self.required(name)?
            .as_array()
            .ok_or_else(|| Self::mismatch(name, "list"))?
            .iter()
            .map(|item| f(item).ok_or_else(|| Self::mismatch(name, "list item")))
            .collect()
    }

    /// Read a nested object with `f`.
    pub fn read_object<T, F>(&self, name: &str, f: F) -> Result<T, MappingError>
    where
        F: FnOnce(&ResponseReader<'a>) -> Result<T, MappingError>,
    {
        let object = self
            .required(name)?
            .as_object()
            .ok_or_else(|| Self::mismatch(name, "object"))?;
        f(&ResponseReader::new(object, self.adapters))
    }

    pub fn read_opt_object<T, F>(&self, name: &str, f: F) -> Result<Option<T>, MappingError>
    where
        F: FnOnce(&ResponseReader<'a>) -> Result<T, MappingError>,
    {
        if self.is_null(name) {
            return Ok(None);
        }
        self.read_object(name, f).map(Some)
    }

    /// Read a list of objects, mapping each item with `f`.
    pub fn read_object_list<T, F>(&self, name: &str, f: F) -> Result<Vec<T>, MappingError>
    where
        F: Fn(&ResponseReader<'a>) -> Result<T, MappingError>,
    {
        self.required(name)?
            .as_array()
            .ok_or_else(|| Self::mismatch(name, "list"))?
            .iter()
            .map(|item| {
                let object = item
                    .as_object()
                    .ok_or_else(|| Self::mismatch(name, "list of objects"))?;
                f(&ResponseReader::new(object, self.adapters))
            })
            .collect()
    }

    /// Decode a custom scalar through its registered adapter.
    pub fn read_custom<T: 'static>(&self, name: &str, scalar: &ScalarType) -> Result<T, MappingError> {
        let value = self.required(name)?;
        self.adapters.decode(scalar, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scalar::CustomTypeAdapter;
    use serde_json::json;

    struct UpperAdapter;

    impl CustomTypeAdapter<String> for UpperAdapter {
        fn decode(&self, value: &Value) -> Result<String, String> {
            value
                .as_str()
                .map(|s| s.to_uppercase())
                .ok_or_else(|| "expected string".to_string())
        }

        fn encode(&self, value: &String) -> Value {
            Value::String(value.to_lowercase())
        }
    }

    fn tree() -> JsonObject {
        json!({
            "user": {
                "id": "1",
                "age": 30,
                "score": 1.5,
                "active": true,
                "tags": ["a", "b"],
                "friends": [{"id": "2"}, {"id": "3"}],
                "nickname": null,
                "code": "abc"
            }
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn test_reads_nested_values() {
        let object = tree();
        let adapters = ScalarTypeAdapters::new();
        let reader = ResponseReader::new(&object, &adapters);

        let (id, age, score, active, tags, friends, nickname) = reader
            .read_object("user", |user| {
                Ok((
                    user.read_string("id")?,
                    user.read_i64("age")?,
                    user.read_f64("score")?,
                    user.read_bool("active")?,
                    user.read_string_list("tags")?,
                    user.read_object_list("friends", |f| f.read_string("id"))?,
                    user.read_opt_string("nickname")?,
                ))
            })
            .unwrap();

        assert_eq!(id, "1");
        assert_eq!(age, 30);
        assert!((score - 1.5).abs() < f64::EPSILON);
        assert!(active);
        assert_eq!(tags, vec!["a", "b"]);
        assert_eq!(friends, vec!["2", "3"]);
        assert_eq!(nickname, None);
    }

    #[test]
    fn test_read_list_converts_items() {
        let object = json!({"scores": [1, 2, 3], "mixed": [1, "two"]})
            .as_object()
            .cloned()
            .unwrap();
        let adapters = ScalarTypeAdapters::new();
        let reader = ResponseReader::new(&object, &adapters);

        assert_eq!(reader.read_list("scores", Value::as_i64).unwrap(), vec![1, 2, 3]);
        assert!(matches!(
            reader.read_list("mixed", Value::as_i64),
            Err(MappingError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_missing_and_mismatched_fields() {
        let object = tree();
        let adapters = ScalarTypeAdapters::new();
        let reader = ResponseReader::new(&object, &adapters);

        let err = reader.read_string("nope").unwrap_err();
        assert!(matches!(err, MappingError::MissingField { .. }));

        let err = reader
            .read_object("user", |u| u.read_i64("id"))
            .unwrap_err();
        assert!(matches!(err, MappingError::TypeMismatch { .. }));
    }

    #[test]
    fn test_custom_scalar() {
        let object = tree();
        let code = ScalarType::new("Code");
        let mut adapters = ScalarTypeAdapters::new();
        adapters.register::<String, _>(code.clone(), UpperAdapter);
        let reader = ResponseReader::new(&object, &adapters);

        let value: String = reader
            .read_object("user", |u| u.read_custom("code", &code))
            .unwrap();
        assert_eq!(value, "ABC");
    }
}
