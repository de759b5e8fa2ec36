//! Call outcomes delivered to callers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// Where a response's data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResponseSource {
    Cache,
    Network,
}

/// Position in the document an error refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLocation {
    pub line: u64,
    pub column: u64,
}

/// An entry of a response's `errors` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseError {
    pub message: String,
    #[serde(default)]
    pub locations: Vec<ErrorLocation>,
    #[serde(default)]
    pub path: Vec<Value>,
}

/// Successful outcome of a call.
#[derive(Debug, Clone, PartialEq)]
pub struct Response<D> {
    /// Typed result; `None` when the server returned only errors.
    pub data: Option<D>,
    pub errors: Vec<ResponseError>,
    pub source: ResponseSource,
    /// Record keys the result was built from.
    pub dependent_keys: BTreeSet<String>,
}

impl<D> Response<D> {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn is_from_cache(&self) -> bool {
        self.source == ResponseSource::Cache
    }

    /// Map the typed data, keeping metadata.
    pub fn map<U, F>(self, f: F) -> Response<U>
    where
        F: FnOnce(D) -> U,
    {
        Response {
            data: self.data.map(f),
            errors: self.errors,
            source: self.source,
            dependent_keys: self.dependent_keys,
        }
    }
}
