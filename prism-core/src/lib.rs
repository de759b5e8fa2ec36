//! prism Core - Data Types
//!
//! Records, cache keys, selection shapes, policies, the operation capability
//! and the error taxonomy. All other prism crates depend on this one; it
//! holds no I/O and no shared state.

pub mod error;
pub mod field;
pub mod json;
pub mod operation;
pub mod policy;
pub mod reader;
pub mod record;
pub mod resolver;
pub mod response;
pub mod scalar;

pub use error::{
    CacheMissError, ConfigError, ErrorKind, MappingError, NormalizeError, ParseError, PrismError,
    PrismResult, StorageError, TransportError,
};
pub use field::{Argument, FieldType, ResponseField, TYPENAME_FIELD};
pub use json::{canonical_json, type_name_of, JsonObject, Variables};
pub use operation::{
    Operation, OperationKind, ResponseFieldMapper, MUTATION_ROOT_KEY, QUERY_ROOT_KEY,
};
pub use policy::{CachePolicy, TransportCachePolicy};
pub use reader::ResponseReader;
pub use record::{field_key, CacheKey, CacheReference, FieldValue, Record, RecordSet};
pub use resolver::{CacheKeyResolver, IdFieldResolver, NoKeyResolver};
pub use response::{ErrorLocation, Response, ResponseError, ResponseSource};
pub use scalar::{CustomTypeAdapter, ScalarType, ScalarTypeAdapters};

use sha2::{Digest, Sha256};

/// Hex SHA-256 of `content`.
pub fn compute_signature(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}
