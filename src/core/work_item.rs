//! Tracked item pairing a disposable with retry bookkeeping.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::{Disposable, Outcome};
use crate::util::clock::now_ms;

/// Process-lifetime id sequence. Ids address items externally (manual
/// removal) and never participate in equality.
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// One registration in the backlog.
///
/// Pairs the producer's [`Disposable`] with the engine's bookkeeping: when it
/// was registered, what the last attempt reported, and whether an attempt is
/// running right now. The outcome and the in-progress flag are transient and
/// reset to their initial values after every restart.
pub struct WorkItem {
    disposable: Arc<dyn Disposable>,
    registered_at_ms: u128,
    id: u64,
    /// Retained so eventual problems restoring the disposable can be
    /// diagnosed by the operator.
    diagnostic_label: String,
    last_outcome: Mutex<Outcome>,
    in_progress: AtomicBool,
}

impl WorkItem {
    pub(crate) fn new(disposable: Arc<dyn Disposable>) -> Self {
        Self::with_registered_at(disposable, now_ms())
    }

    /// Build an item with an explicit registration time (recovery path).
    pub(crate) fn with_registered_at(disposable: Arc<dyn Disposable>, registered_at_ms: u128) -> Self {
        let diagnostic_label = format!("{}:{}", disposable.kind(), disposable.display_name());
        Self {
            disposable,
            registered_at_ms,
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            diagnostic_label,
            last_outcome: Mutex::new(Outcome::Pending),
            in_progress: AtomicBool::new(false),
        }
    }

    /// The wrapped disposable.
    pub fn disposable(&self) -> &Arc<dyn Disposable> {
        &self.disposable
    }

    /// Registration time in milliseconds since the Unix epoch.
    #[must_use]
    pub const fn registered_at_ms(&self) -> u128 {
        self.registered_at_ms
    }

    /// Opaque id, stable for the lifetime of the process.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// `kind:display_name` label retained for recovery diagnostics.
    #[must_use]
    pub fn diagnostic_label(&self) -> &str {
        &self.diagnostic_label
    }

    /// Outcome of the most recent attempt, `Pending` before the first one.
    pub fn last_outcome(&self) -> Outcome {
        self.last_outcome.lock().clone()
    }

    pub(crate) fn record_outcome(&self, outcome: Outcome) {
        *self.last_outcome.lock() = outcome;
    }

    /// Backlog identity: two items with the same key are the same entry.
    #[must_use]
    pub fn dedup_key(&self) -> String {
        Self::key_of(self.disposable.as_ref())
    }

    pub(crate) fn key_of(disposable: &dyn Disposable) -> String {
        format!("{}:{}", disposable.kind(), disposable.dedup_key())
    }

    /// Whether an attempt is executing right now.
    pub fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Claim the item for one attempt. Fails when an attempt already runs,
    /// so a near-simultaneous duplicate submission becomes a no-op.
    pub(crate) fn try_begin(&self) -> bool {
        self.in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn finish(&self) {
        self.in_progress.store(false, Ordering::Release);
    }
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem")
            .field("id", &self.id)
            .field("label", &self.diagnostic_label)
            .field("registered_at_ms", &self.registered_at_ms)
            .field("in_progress", &self.is_in_progress())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Disposer work item: {}", self.disposable.display_name())
    }
}
