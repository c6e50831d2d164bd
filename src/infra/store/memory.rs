//! In-memory snapshot store for testing and dev.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::core::DisposerError;
use crate::infra::store::{BacklogSnapshot, SnapshotStore};

/// Snapshot store keeping the latest snapshot in memory.
///
/// Supports failure injection so persistence-tolerance paths stay testable.
#[derive(Default)]
pub struct InMemoryStore {
    snapshot: Mutex<Option<BacklogSnapshot>>,
    fail_saves: AtomicBool,
    saves: AtomicU64,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent save fail until switched back off.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::Release);
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::Acquire)
    }

    /// The most recently saved snapshot.
    pub fn last(&self) -> Option<BacklogSnapshot> {
        self.snapshot.lock().clone()
    }
}

impl SnapshotStore for InMemoryStore {
    fn save(&self, snapshot: &BacklogSnapshot) -> Result<(), DisposerError> {
        if self.fail_saves.load(Ordering::Acquire) {
            return Err(DisposerError::Store("injected save failure".into()));
        }
        *self.snapshot.lock() = Some(snapshot.clone());
        self.saves.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn load(&self) -> Result<Option<BacklogSnapshot>, DisposerError> {
        Ok(self.snapshot.lock().clone())
    }
}
