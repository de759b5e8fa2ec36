//! Custom scalar adapters
//!
//! Schemas declare scalars beyond the built-in ones (dates, URLs, money).
//! Callers register a [`CustomTypeAdapter`] per [`ScalarType`]; response
//! mappers look the adapter up by scalar name when reading the field.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::MappingError;

/// Declared name of a custom scalar, e.g. `DateTime`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScalarType(String);

impl ScalarType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Converts between a scalar's wire value and a Rust type.
pub trait CustomTypeAdapter<T>: Send + Sync {
    /// Decode the wire value.
    fn decode(&self, value: &Value) -> Result<T, String>;

    /// Encode back to the wire value.
    fn encode(&self, value: &T) -> Value;
}

/// Registry of custom scalar adapters, keyed by scalar type.
#[derive(Clone, Default)]
pub struct ScalarTypeAdapters {
    // Each entry is an `Arc<dyn CustomTypeAdapter<T>>` for its registered T.
    adapters: HashMap<ScalarType, Arc<dyn Any + Send + Sync>>,
}

impl ScalarTypeAdapters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the adapter for `scalar`.
    pub fn register<T, A>(&mut self, scalar: ScalarType, adapter: A)
    where
        T: 'static,
        A: CustomTypeAdapter<T> + 'static,
    {
        let adapter: Arc<dyn CustomTypeAdapter<T>> = Arc::new(adapter);
        self.adapters.insert(scalar, Arc::new(adapter));
    }

    pub fn contains(&self, scalar: &ScalarType) -> bool {
        self.adapters.contains_key(scalar)
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    fn adapter<T: 'static>(
        &self,
        scalar: &ScalarType,
    ) -> Result<&Arc<dyn CustomTypeAdapter<T>>, MappingError> {
        let entry = self
            .adapters
            .get(scalar)
            .ok_or_else(|| MappingError::UnknownScalar {
                scalar: scalar.to_string(),
            })?;
        entry
            .downcast_ref::<Arc<dyn CustomTypeAdapter<T>>>()
            .ok_or_else(|| MappingError::Adapter {
                scalar: scalar.to_string(),
                reason: format!(
                    "registered adapter does not produce {}",
                    std::any::type_name::<T>()
                ),
            })
    }

    /// Decode a wire value with the adapter registered for `scalar`.
    pub fn decode<T: 'static>(&self, scalar: &ScalarType, value: &Value) -> Result<T, MappingError> {
        self.adapter::<T>(scalar)?
            .decode(value)
            .map_err(|reason| MappingError::Adapter {
                scalar: scalar.to_string(),
                reason,
            })
    }

    /// Encode a value with the adapter registered for `scalar`.
    pub fn encode<T: 'static>(&self, scalar: &ScalarType, value: &T) -> Result<Value, MappingError> {
        Ok(self.adapter::<T>(scalar)?.encode(value))
    }
}

impl fmt::Debug for ScalarTypeAdapters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.adapters.keys()).finish()
    }
}
