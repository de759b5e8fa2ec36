//! Operation capability
//!
//! Operations arrive pre-compiled: the document text, variables, the root
//! selection shape and a mapper from a generic tree to the typed result. The
//! pipeline consumes any [`Operation`] through this trait alone.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::MappingError;
use crate::field::ResponseField;
use crate::json::Variables;
use crate::reader::ResponseReader;

/// Root record key for query results.
pub const QUERY_ROOT_KEY: &str = "QUERY_ROOT";

/// Root record key for mutation results.
pub const MUTATION_ROOT_KEY: &str = "MUTATION_ROOT";

/// Kind of operation, which decides its root record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OperationKind {
    #[default]
    Query,
    Mutation,
}

impl OperationKind {
    pub fn root_key(&self) -> &'static str {
        match self {
            Self::Query => QUERY_ROOT_KEY,
            Self::Mutation => MUTATION_ROOT_KEY,
        }
    }
}

/// Maps a response tree into an operation's typed result.
pub trait ResponseFieldMapper<D>: Send + Sync {
    fn map(&self, reader: &ResponseReader<'_>) -> Result<D, MappingError>;
}

impl<D, F> ResponseFieldMapper<D> for F
where
    F: Fn(&ResponseReader<'_>) -> Result<D, MappingError> + Send + Sync,
{
    fn map(&self, reader: &ResponseReader<'_>) -> Result<D, MappingError> {
        self(reader)
    }
}

/// A pre-compiled operation.
pub trait Operation: Send + Sync + 'static {
    /// Typed result of the operation.
    type Data: Send + 'static;

    /// Operation name, sent as `operationName`.
    fn name(&self) -> &str;

    /// Document text sent to the server.
    fn document(&self) -> &str;

    fn kind(&self) -> OperationKind {
        OperationKind::Query
    }

    /// Variables used both on the wire and for field cache keys.
    fn variables(&self) -> Variables {
        Variables::new()
    }

    /// Root selection shape.
    fn selections(&self) -> &[ResponseField];

    /// Build the response mapper. Called once per operation type per client.
    fn response_field_mapper(&self) -> Arc<dyn ResponseFieldMapper<Self::Data>>;
}
