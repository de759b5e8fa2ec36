//! Cache watchers.
//!
//! A watcher is a change subscriber bound to one operation. It re-reads the
//! operation from the normalized cache when a published change touches a
//! record the last result was built from, and delivers only when the
//! rebuilt tree differs from the previous one. Reads that miss are skipped
//! silently; a later write can make the operation readable again.

use parking_lot::Mutex;
use prism_core::{JsonObject, Operation, Response, ResponseSource};
use prism_storage::{NormalizedCache, SubscriptionId};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::client::ClientInner;

#[derive(Default)]
struct WatchState {
    dependent_keys: Mutex<BTreeSet<String>>,
    last: Mutex<Option<JsonObject>>,
}

impl WatchState {
    /// Whether `changed` touches a dependent record.
    ///
    /// With no known dependencies every change counts.
    fn is_affected(&self, changed: &BTreeSet<String>) -> bool {
        let dependent = self.dependent_keys.lock();
        if dependent.is_empty() {
            return true;
        }
        changed
            .iter()
            .any(|field_key| dependent.iter().any(|record| touches(field_key, record)))
    }
}

fn touches(field_key: &str, record_key: &str) -> bool {
    field_key
        .strip_prefix(record_key)
        .is_some_and(|rest| rest.starts_with('.'))
}

/// Live subscription created by `Client::watch`. Dropping it unsubscribes.
pub struct Watcher {
    cache: Arc<dyn NormalizedCache>,
    id: SubscriptionId,
    operation: String,
}

impl Watcher {
    pub(crate) fn register<O, F>(inner: &Arc<ClientInner>, operation: Arc<O>, callback: F) -> Self
    where
        O: Operation,
        F: Fn(Response<O::Data>) + Send + Sync + 'static,
    {
        let state = Arc::new(WatchState::default());
        if let Ok(initial) = inner.denormalize(operation.as_ref()) {
            *state.dependent_keys.lock() = initial.dependent_keys;
            *state.last.lock() = Some(initial.data);
        }

        let client: Weak<ClientInner> = Arc::downgrade(inner);
        let watched = Arc::clone(&operation);
        let subscriber = move |changed: &BTreeSet<String>| {
            let Some(client) = client.upgrade() else {
                return;
            };
            if !state.is_affected(changed) {
                return;
            }
            let denormalized = match client.denormalize(watched.as_ref()) {
                Ok(denormalized) => denormalized,
                Err(e) => {
                    tracing::trace!(operation = %watched.name(), error = %e, "Watched operation not readable");
                    return;
                }
            };
            *state.dependent_keys.lock() = denormalized.dependent_keys.clone();
            {
                let mut last = state.last.lock();
                if last.as_ref() == Some(&denormalized.data) {
                    return;
                }
                *last = Some(denormalized.data.clone());
            }
            match client.map_tree(watched.as_ref(), &denormalized.data) {
                Ok(data) => callback(Response {
                    data: Some(data),
                    errors: Vec::new(),
                    source: ResponseSource::Cache,
                    dependent_keys: denormalized.dependent_keys,
                }),
                Err(e) => {
                    tracing::warn!(operation = %watched.name(), error = %e, "Watched operation failed to map");
                }
            }
        };

        let id = inner.cache.subscribe(Arc::new(subscriber));
        tracing::debug!(operation = %operation.name(), subscription = %id, "Watcher registered");
        Self {
            cache: Arc::clone(&inner.cache),
            id,
            operation: operation.name().to_string(),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Stop watching. Equivalent to dropping the watcher, which unsubscribes
    /// it from the cache.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        if self.cache.unsubscribe(self.id) {
            tracing::debug!(operation = %self.operation, subscription = %self.id, "Watcher removed");
        }
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.id)
            .field("operation", &self.operation)
            .finish()
    }
}
