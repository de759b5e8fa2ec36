//! Change publication.
//!
//! Subscribers receive the full change set of each committed write; any
//! per-watcher filtering is theirs to do. Delivery is synchronous and runs
//! over a snapshot of the subscriber list taken when publication starts, so
//! subscribe and unsubscribe never block on a running publication. A
//! subscriber removed mid-publication, including by itself, is not called
//! again for that publication.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Receives change sets of field-qualified keys.
pub trait RecordChangeSubscriber: Send + Sync {
    fn on_cache_keys_changed(&self, changed: &BTreeSet<String>);
}

impl<F> RecordChangeSubscriber for F
where
    F: Fn(&BTreeSet<String>) + Send + Sync,
{
    fn on_cache_keys_changed(&self, changed: &BTreeSet<String>) {
        self(changed)
    }
}

/// Handle returned by [`ChangePublisher::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

type Subscribers = BTreeMap<SubscriptionId, Arc<dyn RecordChangeSubscriber>>;

/// Registry of change subscribers.
#[derive(Default)]
pub struct ChangePublisher {
    subscribers: RwLock<Subscribers>,
    next_id: AtomicU64,
}

impl fmt::Debug for ChangePublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangePublisher")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl ChangePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    // Callbacks never run under this lock; a poisoned map is still consistent.
    fn read_guard(&self) -> RwLockReadGuard<'_, Subscribers> {
        self.subscribers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, Subscribers> {
        self.subscribers.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn subscribe(&self, subscriber: Arc<dyn RecordChangeSubscriber>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.write_guard().insert(id, subscriber);
        tracing::trace!(subscription = %id, "Subscriber registered");
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.write_guard().remove(&id).is_some();
        if removed {
            tracing::trace!(subscription = %id, "Subscriber removed");
        }
        removed
    }

    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.read_guard().contains_key(&id)
    }

    pub fn has_subscribers(&self) -> bool {
        !self.read_guard().is_empty()
    }

    pub fn subscriber_count(&self) -> usize {
        self.read_guard().len()
    }

    /// Deliver `changed` to every subscriber. Empty sets are dropped.
    pub fn publish(&self, changed: &BTreeSet<String>) {
        if changed.is_empty() {
            return;
        }
        let snapshot: Vec<(SubscriptionId, Arc<dyn RecordChangeSubscriber>)> = self
            .read_guard()
            .iter()
            .map(|(id, s)| (*id, Arc::clone(s)))
            .collect();
        tracing::debug!(
            keys = changed.len(),
            subscribers = snapshot.len(),
            "Publishing change set"
        );
        for (id, subscriber) in snapshot {
            if self.is_subscribed(id) {
                subscriber.on_cache_keys_changed(changed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn keys(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_publish_reaches_all_subscribers() {
        let publisher = ChangePublisher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for _ in 0..3 {
            let seen = Arc::clone(&seen);
            publisher.subscribe(Arc::new(move |changed: &BTreeSet<String>| {
                seen.lock().unwrap().push(changed.clone());
            }));
        }
        publisher.publish(&keys(&["User:1.name"]));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|s| s.contains("User:1.name")));
    }

    #[test]
    fn test_empty_change_set_is_not_published() {
        let publisher = ChangePublisher::new();
        let calls = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&calls);
        publisher.subscribe(Arc::new(move |_: &BTreeSet<String>| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        publisher.publish(&BTreeSet::new());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unsubscribe() {
        let publisher = ChangePublisher::new();
        let calls = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&calls);
        let id = publisher.subscribe(Arc::new(move |_: &BTreeSet<String>| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(publisher.unsubscribe(id));
        assert!(!publisher.unsubscribe(id));
        publisher.publish(&keys(&["a.b"]));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!publisher.has_subscribers());
    }

    struct SelfRemoving {
        publisher: Arc<ChangePublisher>,
        id: Mutex<Option<SubscriptionId>>,
        calls: AtomicU64,
    }

    impl RecordChangeSubscriber for SelfRemoving {
        fn on_cache_keys_changed(&self, _changed: &BTreeSet<String>) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = self.id.lock().unwrap().take() {
                self.publisher.unsubscribe(id);
            }
        }
    }

    #[test]
    fn test_unsubscribe_during_own_notification() {
        let publisher = Arc::new(ChangePublisher::new());
        let subscriber = Arc::new(SelfRemoving {
            publisher: Arc::clone(&publisher),
            id: Mutex::new(None),
            calls: AtomicU64::new(0),
        });
        let id = publisher.subscribe(subscriber.clone());
        *subscriber.id.lock().unwrap() = Some(id);

        publisher.publish(&keys(&["a.b"]));
        publisher.publish(&keys(&["a.c"]));
        assert_eq!(subscriber.calls.load(Ordering::SeqCst), 1);
        assert!(!publisher.is_subscribed(id));
    }

    #[test]
    fn test_subscriber_removed_by_earlier_subscriber_is_skipped() {
        let publisher = Arc::new(ChangePublisher::new());
        let late_calls = Arc::new(AtomicU64::new(0));
        let victim: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let p = Arc::clone(&publisher);
        let v = Arc::clone(&victim);
        publisher.subscribe(Arc::new(move |_: &BTreeSet<String>| {
            if let Some(id) = v.lock().unwrap().take() {
                p.unsubscribe(id);
            }
        }));
        let counter = Arc::clone(&late_calls);
        let id = publisher.subscribe(Arc::new(move |_: &BTreeSet<String>| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        *victim.lock().unwrap() = Some(id);

        publisher.publish(&keys(&["a.b"]));
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);
    }
}
