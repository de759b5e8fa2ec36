//! Cache key resolution
//!
//! A [`CacheKeyResolver`] decides which response objects are shared entities.
//! It must be a pure function of its inputs: the same object must always
//! resolve to the same key, or two fetches of one entity would not merge.
//! Returning `None` is the normal outcome for embedded value types.

use serde_json::Value;

use crate::field::{ResponseField, TYPENAME_FIELD};
use crate::json::JsonObject;
use crate::record::CacheKey;

/// Derives entity identity for normalization.
pub trait CacheKeyResolver: Send + Sync {
    /// Resolve the key of an object appearing in a response.
    fn from_response(&self, type_name: Option<&str>, object: &JsonObject) -> Option<CacheKey>;

    /// Resolve the key a field points at from its arguments alone.
    ///
    /// Lets a read of `user(id: 1)` find `User:1` even when it was fetched
    /// under a different root field.
    fn from_arguments(&self, _field: &ResponseField, _arguments: &JsonObject) -> Option<CacheKey> {
        None
    }
}

/// Resolver that never yields a key; every object is path-scoped.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoKeyResolver;

impl CacheKeyResolver for NoKeyResolver {
    fn from_response(&self, _type_name: Option<&str>, _object: &JsonObject) -> Option<CacheKey> {
        None
    }
}

/// Resolves `<TypeName>:<id>` from `__typename` and an identity field.
#[derive(Debug, Clone)]
pub struct IdFieldResolver {
    id_field: String,
    /// Field names whose `id` argument also names the entity, e.g. `user`.
    argument_fields: Vec<(String, String)>,
}

impl IdFieldResolver {
    /// Use `id` as the identity field.
    pub fn new() -> Self {
        Self::with_id_field("id")
    }

    pub fn with_id_field(id_field: impl Into<String>) -> Self {
        Self {
            id_field: id_field.into(),
            argument_fields: Vec::new(),
        }
    }

    /// Resolve reads of `field_name(<id_field>: ...)` to `<type_name>:<id>`.
    pub fn with_argument_lookup(
        mut self,
        field_name: impl Into<String>,
        type_name: impl Into<String>,
    ) -> Self {
        self.argument_fields.push((field_name.into(), type_name.into()));
        self
    }

    fn id_string(value: &Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

impl Default for IdFieldResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheKeyResolver for IdFieldResolver {
    fn from_response(&self, type_name: Option<&str>, object: &JsonObject) -> Option<CacheKey> {
        let type_name = type_name.or_else(|| object.get(TYPENAME_FIELD)?.as_str())?;
        let id = Self::id_string(object.get(&self.id_field)?)?;
        Some(CacheKey::new(format!("{}:{}", type_name, id)))
    }

    fn from_arguments(&self, field: &ResponseField, arguments: &JsonObject) -> Option<CacheKey> {
        let (_, type_name) = self
            .argument_fields
            .iter()
            .find(|(name, _)| name == field.field_name())?;
        let id = Self::id_string(arguments.get(&self.id_field)?)?;
        Some(CacheKey::new(format!("{}:{}", type_name, id)))
    }
}

impl<F> CacheKeyResolver for F
where
    F: Fn(Option<&str>, &JsonObject) -> Option<CacheKey> + Send + Sync,
{
    fn from_response(&self, type_name: Option<&str>, object: &JsonObject) -> Option<CacheKey> {
        self(type_name, object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> JsonObject {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_id_field_resolver_uses_typename() {
        let resolver = IdFieldResolver::new();
        let user = object(json!({"__typename": "User", "id": "1", "name": "Ann"}));
        assert_eq!(
            resolver.from_response(None, &user),
            Some(CacheKey::new("User:1"))
        );
    }

    #[test]
    fn test_id_field_resolver_numeric_id() {
        let resolver = IdFieldResolver::new();
        let post = object(json!({"__typename": "Post", "id": 42}));
        assert_eq!(
            resolver.from_response(None, &post),
            Some(CacheKey::new("Post:42"))
        );
    }

    #[test]
    fn test_anonymous_object_has_no_key() {
        let resolver = IdFieldResolver::new();
        let address = object(json!({"__typename": "Address", "city": "Oslo"}));
        assert_eq!(resolver.from_response(None, &address), None);
        let untyped = object(json!({"id": "1"}));
        assert_eq!(resolver.from_response(None, &untyped), None);
    }

    #[test]
    fn test_argument_lookup() {
        let resolver = IdFieldResolver::new().with_argument_lookup("user", "User");
        let field = ResponseField::object("user", vec![]);
        let args = object(json!({"id": "7"}));
        assert_eq!(
            resolver.from_arguments(&field, &args),
            Some(CacheKey::new("User:7"))
        );

        let other = ResponseField::object("post", vec![]);
        assert_eq!(resolver.from_arguments(&other, &args), None);
    }

    #[test]
    fn test_closure_resolver() {
        let resolver = |type_name: Option<&str>, obj: &JsonObject| {
            let uuid = obj.get("uuid")?.as_str()?;
            Some(CacheKey::new(format!("{}/{}", type_name.unwrap_or("Any"), uuid)))
        };
        let obj = object(json!({"uuid": "abc"}));
        assert_eq!(
            resolver.from_response(Some("Doc"), &obj),
            Some(CacheKey::new("Doc/abc"))
        );
        assert_eq!(NoKeyResolver.from_response(Some("Doc"), &obj), None);
    }
}
