use crate::metrics_defs::{CALLBACKS_OVERWRITTEN, CALLBACKS_PENDING};
use dashmap::DashMap;
use shared::{counter, gauge};
use std::sync::Arc;
use tokio::sync::Notify;

/// Values delivered by the remote service, keyed by correlation id.
///
/// Clones share the same entries. The store is built once by whatever owns the
/// webhook and the dispatcher and handed to both. Entries that are delivered
/// but never taken stay until the process exits.
///
/// Retrievers waiting on an id register a watch for it, and a `put` only
/// signals the watch registered for its own id.
#[derive(Clone, Default)]
pub struct CorrelationStore {
    values: Arc<DashMap<String, String>>,
    watchers: Arc<DashMap<String, Arc<Notify>>>,
}

impl CorrelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates `value` with `id`, replacing any value that has not been taken yet.
    pub fn put(&self, id: impl Into<String>, value: impl Into<String>) {
        let id = id.into();

        if self.values.insert(id.clone(), value.into()).is_some() {
            tracing::debug!(correlation_id = %id, "Replaced a callback value that was never taken");
            counter!(CALLBACKS_OVERWRITTEN).increment(1);
        }
        gauge!(CALLBACKS_PENDING).set(self.values.len() as f64);

        if let Some(watcher) = self.watchers.get(&id) {
            watcher.notify_one();
        }
    }

    /// Removes and returns the value delivered for `id`, if any.
    ///
    /// The read and the removal are a single operation on the entry's shard, so
    /// concurrent callers never both receive the same value.
    pub fn take(&self, id: &str) -> Option<String> {
        let (_, value) = self.values.remove(id)?;
        gauge!(CALLBACKS_PENDING).set(self.values.len() as f64);
        Some(value)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.values.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Registers interest in deliveries for `id` until the returned watch is
    /// dropped. A `put` made before the watch is awaited is not lost: it leaves
    /// a pending signal that completes the next [`Watch::delivered`].
    pub(crate) fn watch(&self, id: &str) -> Watch<'_> {
        let notify = self.watchers.entry(id.to_string()).or_default().clone();
        Watch {
            store: self,
            id: id.to_string(),
            notify,
        }
    }

    #[cfg(test)]
    pub(crate) fn is_watched(&self, id: &str) -> bool {
        self.watchers.contains_key(id)
    }
}

/// Delivery signal for a single correlation id.
pub(crate) struct Watch<'a> {
    store: &'a CorrelationStore,
    id: String,
    notify: Arc<Notify>,
}

impl Watch<'_> {
    /// Completes once a value has been put for the watched id.
    pub(crate) async fn delivered(&self) {
        self.notify.notified().await
    }
}

impl Drop for Watch<'_> {
    fn drop(&mut self) {
        // Other watches on the same id keep the entry alive.
        self.store.watchers.remove_if(&self.id, |_, notify| {
            Arc::ptr_eq(notify, &self.notify) && Arc::strong_count(notify) <= 2
        });
    }
}
