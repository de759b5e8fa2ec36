//! Per-operation-type response mapper pool.
//!
//! The first call of an operation type builds its mapper; every later call,
//! including ones racing the first, gets that same instance. The pool lives
//! as long as its client.

use dashmap::DashMap;
use prism_core::{Operation, ResponseFieldMapper};
use std::any::{Any, TypeId};
use std::sync::Arc;

type AnyMapper = Arc<dyn Any + Send + Sync>;

/// Memoized response mappers keyed by operation type.
#[derive(Debug, Default)]
pub struct ResponseMapperPool {
    mappers: DashMap<TypeId, AnyMapper>,
}

impl ResponseMapperPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the mapper for `O`, building it from `operation` on first use.
    pub fn get<O: Operation>(&self, operation: &O) -> Arc<dyn ResponseFieldMapper<O::Data>> {
        let entry = self
            .mappers
            .entry(TypeId::of::<O>())
            .or_insert_with(|| {
                tracing::trace!(operation = operation.name(), "Building response mapper");
                let mapper: AnyMapper = Arc::new(operation.response_field_mapper());
                mapper
            })
            .value()
            .clone();

        match entry.downcast_ref::<Arc<dyn ResponseFieldMapper<O::Data>>>() {
            Some(mapper) => Arc::clone(mapper),
            None => operation.response_field_mapper(),
        }
    }

    pub fn len(&self) -> usize {
        self.mappers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappers.is_empty()
    }
}
