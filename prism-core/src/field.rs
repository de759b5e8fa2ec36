//! Selection shapes
//!
//! A [`ResponseField`] describes one field an operation selects: its response
//! name (alias), schema name, arguments, and value shape. Operations expose
//! their root selection as a list of fields; normalization and
//! denormalization walk it instead of the store's reference graph, so the
//! depth of any read is bounded by the query.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::json::{canonical_json, JsonObject, Variables};
use crate::scalar::ScalarType;

/// Name of the introspection field carrying an object's concrete type.
pub const TYPENAME_FIELD: &str = "__typename";

/// Value shape of a selected field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    /// A built-in scalar (string, number, boolean, enum).
    Scalar,
    /// A custom scalar decoded through a registered adapter.
    Custom(ScalarType),
    /// A composite value with its own sub-selection.
    Object(Vec<ResponseField>),
    /// An ordered list of the inner shape.
    List(Box<FieldType>),
}

impl FieldType {
    /// Whether this shape contains objects (at any list depth).
    pub fn is_composite(&self) -> bool {
        match self {
            Self::Object(_) => true,
            Self::List(inner) => inner.is_composite(),
            Self::Scalar | Self::Custom(_) => false,
        }
    }
}

/// Argument value as written in the operation document.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Literal(Value),
    Variable(String),
    Object(BTreeMap<String, Argument>),
}

impl Argument {
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable(name.into())
    }

    /// Substitute variables. An unset variable resolves to `null`.
    pub fn resolve(&self, variables: &Variables) -> Value {
        match self {
            Self::Literal(v) => v.clone(),
            Self::Variable(name) => variables.get(name).cloned().unwrap_or(Value::Null),
            Self::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, a)| (k.clone(), a.resolve(variables)))
                    .collect(),
            ),
        }
    }
}

/// One field of an operation's selection.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseField {
    response_name: String,
    field_name: String,
    arguments: BTreeMap<String, Argument>,
    field_type: FieldType,
    optional: bool,
}

impl ResponseField {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        Self {
            response_name: name.clone(),
            field_name: name,
            arguments: BTreeMap::new(),
            field_type,
            optional: false,
        }
    }

    pub fn scalar(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Scalar)
    }

    pub fn custom(name: impl Into<String>, scalar: ScalarType) -> Self {
        Self::new(name, FieldType::Custom(scalar))
    }

    pub fn object(name: impl Into<String>, fields: Vec<ResponseField>) -> Self {
        Self::new(name, FieldType::Object(fields))
    }

    pub fn scalar_list(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::List(Box::new(FieldType::Scalar)))
    }

    pub fn object_list(name: impl Into<String>, fields: Vec<ResponseField>) -> Self {
        Self::new(name, FieldType::List(Box::new(FieldType::Object(fields))))
    }

    /// The `__typename` field.
    pub fn typename() -> Self {
        Self::scalar(TYPENAME_FIELD)
    }

    /// Expose the field under a different response name.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.response_name = alias.into();
        self
    }

    pub fn with_argument(mut self, name: impl Into<String>, argument: Argument) -> Self {
        self.arguments.insert(name.into(), argument);
        self
    }

    /// Mark the field nullable.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn response_name(&self) -> &str {
        &self.response_name
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn arguments(&self) -> &BTreeMap<String, Argument> {
        &self.arguments
    }

    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Arguments with variables substituted.
    pub fn resolve_arguments(&self, variables: &Variables) -> JsonObject {
        self.arguments
            .iter()
            .map(|(k, a)| (k.clone(), a.resolve(variables)))
            .collect()
    }

    /// Key this field is stored under inside its parent record.
    ///
    /// The schema name, followed by the resolved arguments as canonical JSON
    /// when there are any: `user({"id":"1"})`. Aliases never affect it, so
    /// two queries aliasing the same field share its stored value.
    pub fn cache_key(&self, variables: &Variables) -> String {
        if self.arguments.is_empty() {
            return self.field_name.clone();
        }
        let resolved = Value::Object(self.resolve_arguments(variables));
        format!("{}({})", self.field_name, canonical_json(&resolved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(value: Value) -> Variables {
        match value {
            Value::Object(map) => map,
            _ => Variables::new(),
        }
    }

    #[test]
    fn test_cache_key_without_arguments() {
        let field = ResponseField::scalar("name");
        assert_eq!(field.cache_key(&Variables::new()), "name");
    }

    #[test]
    fn test_cache_key_resolves_variables() {
        let field = ResponseField::object("user", vec![ResponseField::scalar("id")])
            .with_argument("id", Argument::variable("id"));
        let key = field.cache_key(&vars(json!({"id": "1"})));
        assert_eq!(key, r#"user({"id":"1"})"#);
    }

    #[test]
    fn test_cache_key_ignores_alias() {
        let plain = ResponseField::scalar("name").with_argument("lang", Argument::literal("en"));
        let aliased = plain.clone().with_alias("englishName");
        assert_eq!(
            plain.cache_key(&Variables::new()),
            aliased.cache_key(&Variables::new())
        );
        assert_eq!(aliased.response_name(), "englishName");
    }

    #[test]
    fn test_cache_key_argument_order_is_canonical() {
        let a = ResponseField::scalar("search")
            .with_argument("first", Argument::literal(10))
            .with_argument("after", Argument::literal("c1"));
        let b = ResponseField::scalar("search")
            .with_argument("after", Argument::literal("c1"))
            .with_argument("first", Argument::literal(10));
        assert_eq!(a.cache_key(&Variables::new()), b.cache_key(&Variables::new()));
    }

    #[test]
    fn test_missing_variable_is_null() {
        let field = ResponseField::scalar("user").with_argument("id", Argument::variable("id"));
        assert_eq!(field.cache_key(&Variables::new()), r#"user({"id":null})"#);
    }

    #[test]
    fn test_nested_object_argument() {
        let mut filter = BTreeMap::new();
        filter.insert("name".to_string(), Argument::variable("name"));
        let field = ResponseField::object_list("users", vec![ResponseField::scalar("id")])
            .with_argument("filter", Argument::Object(filter));
        let key = field.cache_key(&vars(json!({"name": "Ann"})));
        assert_eq!(key, r#"users({"filter":{"name":"Ann"}})"#);
        assert!(field.field_type().is_composite());
    }
}
