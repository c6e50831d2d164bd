//! Bounded-concurrency execution of disposal attempts.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{oneshot, Semaphore};

use crate::core::engine::Persister;
use crate::core::{Backlog, Outcome, WorkItem};

/// Abstraction for spawning attempt execution on a runtime.
pub trait Spawn {
    /// Spawn an async task.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Attempt counters, read by [`crate::core::Disposer::stats`].
#[derive(Debug, Default)]
pub(crate) struct AttemptCounters {
    /// Attempts currently executing.
    pub active: AtomicU64,
    /// Attempts that actually began (duplicates filtered out).
    pub attempts: AtomicU64,
    /// Attempts that reported the terminal outcome.
    pub purged: AtomicU64,
    /// Attempts that threw or reported failure.
    pub failed: AtomicU64,
}

/// Clears the per-item guard and the active counter on every exit path,
/// including an unwinding attempt.
struct InProgressGuard {
    item: Arc<WorkItem>,
    counters: Arc<AttemptCounters>,
}

impl InProgressGuard {
    fn new(item: Arc<WorkItem>, counters: Arc<AttemptCounters>) -> Self {
        counters.active.fetch_add(1, Ordering::AcqRel);
        counters.attempts.fetch_add(1, Ordering::AcqRel);
        Self { item, counters }
    }
}

impl Drop for InProgressGuard {
    fn drop(&mut self) {
        self.item.finish();
        self.counters.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Executes disposal attempts under two limits honored simultaneously: at
/// most one in-flight attempt per item (atomic claim on the item) and at
/// most a fixed ceiling of attempts across the whole backlog (semaphore).
///
/// Submissions return immediately; an attempt beyond the ceiling waits for a
/// slot without busy-looping and without occupying a worker. A stuck attempt
/// wastes its slot, nothing more: registrations keep being accepted and stay
/// visible in the backlog.
pub struct Dispatcher<S> {
    semaphore: Arc<Semaphore>,
    backlog: Arc<Backlog>,
    persister: Persister,
    spawner: S,
    counters: Arc<AttemptCounters>,
}

impl<S> Dispatcher<S>
where
    S: Spawn + Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        max_in_flight: usize,
        backlog: Arc<Backlog>,
        persister: Persister,
        spawner: S,
    ) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_in_flight)),
            backlog,
            persister,
            spawner,
            counters: Arc::new(AttemptCounters::default()),
        }
    }

    pub(crate) fn counters(&self) -> Arc<AttemptCounters> {
        Arc::clone(&self.counters)
    }

    /// Stop accepting queued attempts; waiters exit without executing.
    pub(crate) fn shutdown(&self) {
        self.semaphore.close();
    }

    /// Enqueue one attempt for the item. Returns immediately; a no-op when
    /// the item is already being worked.
    pub fn submit(&self, item: Arc<WorkItem>) {
        self.submit_inner(item, None);
    }

    /// Like [`submit`](Self::submit), additionally delivering the outcome of
    /// this attempt (or, for a collapsed duplicate, the item's most recent
    /// outcome) on the channel.
    pub(crate) fn submit_with_notify(&self, item: Arc<WorkItem>, notify: oneshot::Sender<Outcome>) {
        self.submit_inner(item, Some(notify));
    }

    fn submit_inner(&self, item: Arc<WorkItem>, notify: Option<oneshot::Sender<Outcome>>) {
        if item.is_in_progress() {
            tracing::debug!(item = %item.diagnostic_label(), "attempt already in flight");
            if let Some(tx) = notify {
                let _ = tx.send(item.last_outcome());
            }
            return;
        }

        let semaphore = Arc::clone(&self.semaphore);
        let backlog = Arc::clone(&self.backlog);
        let persister = self.persister.clone();
        let counters = Arc::clone(&self.counters);

        self.spawner.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::debug!(item = %item.diagnostic_label(), "dispatcher shut down");
                    return;
                }
            };

            if !item.try_begin() {
                // Lost the claim to a concurrent submission.
                if let Some(tx) = notify {
                    let _ = tx.send(item.last_outcome());
                }
                return;
            }
            let guard = InProgressGuard::new(Arc::clone(&item), Arc::clone(&counters));

            let outcome = run_attempt(Arc::clone(item.disposable())).await;
            item.record_outcome(outcome.clone());

            match &outcome {
                Outcome::Purged => {
                    counters.purged.fetch_add(1, Ordering::AcqRel);
                    let (removed, now_empty) = backlog.remove_item(&item);
                    if removed {
                        tracing::debug!(item = %item.diagnostic_label(), "purged, no longer tracked");
                        // Structural removals normally ride on the next
                        // sweep's save; a drain to empty must persist now or
                        // the emptied backlog would never be captured.
                        if now_empty {
                            persister.save();
                        }
                    }
                }
                Outcome::Thrown(err) => {
                    counters.failed.fetch_add(1, Ordering::AcqRel);
                    tracing::debug!(item = %item.diagnostic_label(), error = %err, "attempt threw");
                }
                Outcome::Failed(reason) => {
                    counters.failed.fetch_add(1, Ordering::AcqRel);
                    tracing::debug!(item = %item.diagnostic_label(), reason = %reason, "attempt failed");
                }
                Outcome::Pending => {}
            }

            drop(guard);
            if let Some(tx) = notify {
                let _ = tx.send(outcome);
            }
        });
    }
}

/// Run one attempt with the error boundary: a returned error or a panic in
/// producer code becomes [`Outcome::Thrown`] and never reaches the runtime.
async fn run_attempt(disposable: Arc<dyn crate::core::Disposable>) -> Outcome {
    match AssertUnwindSafe(disposable.dispose()).catch_unwind().await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(err)) => Outcome::Thrown(Arc::new(err)),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".into());
            Outcome::Thrown(Arc::new(anyhow::anyhow!(
                "disposal attempt panicked: {message}"
            )))
        }
    }
}
