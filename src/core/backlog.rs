//! Deduplicated set of tracked items.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::{Disposable, WorkItem};

/// The set of all currently tracked items, keyed by the disposable's logical
/// identity so equal disposables collapse into one entry.
///
/// Every operation holds the lock for a short critical section only; nothing
/// here blocks for the duration of an attempt, and callers never get a live
/// view of the underlying map.
#[derive(Default)]
pub struct Backlog {
    items: Mutex<HashMap<String, Arc<WorkItem>>>,
}

impl Backlog {
    /// Create an empty backlog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a disposable, collapsing it into an existing entry when an
    /// equal one is already tracked.
    ///
    /// Returns the tracked item and whether it was newly added. Registration
    /// never fails.
    pub fn register(&self, disposable: Arc<dyn Disposable>) -> (Arc<WorkItem>, bool) {
        let key = WorkItem::key_of(disposable.as_ref());
        let mut items = self.items.lock();
        if let Some(existing) = items.get(&key) {
            return (Arc::clone(existing), false);
        }
        let item = Arc::new(WorkItem::new(disposable));
        items.insert(key, Arc::clone(&item));
        (item, true)
    }

    /// Re-insert a recovered item unless an equal entry already exists.
    pub(crate) fn restore(&self, item: Arc<WorkItem>) -> bool {
        let key = item.dedup_key();
        let mut items = self.items.lock();
        if items.contains_key(&key) {
            return false;
        }
        items.insert(key, item);
        true
    }

    /// Point-in-time copy of the tracked items.
    pub fn snapshot(&self) -> Vec<Arc<WorkItem>> {
        self.items.lock().values().cloned().collect()
    }

    /// Remove one entry by its opaque id.
    ///
    /// Returns `true` iff an entry was actually removed; the item may have
    /// completed or been removed concurrently.
    pub fn remove_by_id(&self, id: u64) -> bool {
        let mut items = self.items.lock();
        let key = items
            .iter()
            .find(|(_, item)| item.id() == id)
            .map(|(key, _)| key.clone());
        key.is_some_and(|key| items.remove(&key).is_some())
    }

    /// Remove a completed item, verifying it is still the tracked entry for
    /// its key (an equal disposable re-registered after a manual removal
    /// gets a distinct item).
    ///
    /// Returns `(removed, now_empty)`; `now_empty` signals the caller to
    /// persist the drained state.
    pub(crate) fn remove_item(&self, item: &WorkItem) -> (bool, bool) {
        let key = item.dedup_key();
        let mut items = self.items.lock();
        match items.get(&key) {
            Some(current) if current.id() == item.id() => {
                items.remove(&key);
                (true, items.is_empty())
            }
            _ => (false, false),
        }
    }

    /// Number of tracked items.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}
