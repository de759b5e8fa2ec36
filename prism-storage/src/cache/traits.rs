//! Cache façade traits.
//!
//! [`NormalizedCache`] is object safe so the client can hold either a
//! [`RealCache`](super::RealCache) or a [`NoOpCache`](super::NoOpCache)
//! behind one `Arc<dyn NormalizedCache>`. Transactions take type-erased
//! units of work; [`NormalizedCacheExt`] wraps them in generic, value
//! returning helpers.

use prism_core::{PrismResult, Record, RecordSet, StorageError};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::publisher::{RecordChangeSubscriber, SubscriptionId};
use crate::normalizer::ResponseNormalizer;

/// Read view over records.
pub trait ReadableCache {
    fn read(&self, key: &str) -> PrismResult<Option<Record>>;

    /// Load several records; absent keys are missing from the result.
    fn read_many(&self, keys: &[String]) -> PrismResult<BTreeMap<String, Record>>;
}

/// Read-write view inside a write transaction.
///
/// Writes are staged and only reach the store when the transaction commits.
/// Reads see the staged writes.
pub trait WriteableCache: ReadableCache {
    /// Stage a field-by-field merge, returning the field keys it changes
    /// relative to the current view.
    fn merge(&mut self, record: Record) -> PrismResult<BTreeSet<String>>;

    /// Stage a removal. Returns whether the record was visible.
    fn remove(&mut self, key: &str) -> PrismResult<bool>;

    fn as_readable(&self) -> &dyn ReadableCache;

    /// Stage every record of a normalization pass.
    fn merge_all(&mut self, records: RecordSet) -> PrismResult<BTreeSet<String>> {
        let mut changed = BTreeSet::new();
        for record in records.into_records() {
            changed.extend(self.merge(record)?);
        }
        Ok(changed)
    }
}

/// The normalized cache façade used by the execution pipeline.
pub trait NormalizedCache: Send + Sync {
    /// Register a subscriber for change sets.
    fn subscribe(&self, subscriber: Arc<dyn RecordChangeSubscriber>) -> SubscriptionId;

    /// Remove a subscriber. Returns whether it was registered.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;

    /// Notify subscribers of `changed`. Empty sets are not delivered.
    fn publish(&self, changed: &BTreeSet<String>);

    /// Remove every record.
    fn clear_all(&self) -> PrismResult<()>;

    /// Normalizer for server responses.
    fn network_response_normalizer(&self) -> &ResponseNormalizer;

    /// Normalizer for locally written trees.
    fn cache_response_normalizer(&self) -> &ResponseNormalizer;

    /// Run `work` inside a read transaction.
    fn run_read(
        &self,
        work: &mut dyn FnMut(&dyn ReadableCache) -> PrismResult<()>,
    ) -> PrismResult<()>;

    /// Run `work` inside a write transaction.
    ///
    /// The staged writes are committed only if `work` returns `Ok`. Returns
    /// the committed change set, which has already been published.
    fn run_write(
        &self,
        work: &mut dyn FnMut(&mut dyn WriteableCache) -> PrismResult<()>,
    ) -> PrismResult<BTreeSet<String>>;
}

/// Generic transaction helpers over any [`NormalizedCache`].
pub trait NormalizedCacheExt: NormalizedCache {
    /// Run `work` in a read transaction and return its value.
    fn read_transaction<R, F>(&self, work: F) -> PrismResult<R>
    where
        F: FnOnce(&dyn ReadableCache) -> PrismResult<R>,
    {
        let mut work = Some(work);
        let mut output = None;
        self.run_read(&mut |view: &dyn ReadableCache| {
            if let Some(work) = work.take() {
                output = Some(work(view)?);
            }
            Ok(())
        })?;
        output.ok_or_else(|| transaction_not_run("read"))
    }

    /// Run `work` in a write transaction, returning its value and the
    /// committed change set.
    fn write_transaction<R, F>(&self, work: F) -> PrismResult<(R, BTreeSet<String>)>
    where
        F: FnOnce(&mut dyn WriteableCache) -> PrismResult<R>,
    {
        let mut work = Some(work);
        let mut output = None;
        let changed = self.run_write(&mut |tx: &mut dyn WriteableCache| {
            if let Some(work) = work.take() {
                output = Some(work(tx)?);
            }
            Ok(())
        })?;
        let output = output.ok_or_else(|| transaction_not_run("write"))?;
        Ok((output, changed))
    }
}

impl<T: NormalizedCache + ?Sized> NormalizedCacheExt for T {}

fn transaction_not_run(kind: &str) -> prism_core::PrismError {
    StorageError::TransactionFailed {
        reason: format!("{} transaction did not run its unit of work", kind),
    }
    .into()
}
