//! Disposer engine: registration, scheduling, recovery, reporting.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

use tokio::sync::{oneshot, watch};
use tokio::time::MissedTickBehavior;

use crate::config::DisposerConfig;
use crate::core::dispatcher::{Dispatcher, Spawn};
use crate::core::{Backlog, Disposable, DisposerError, Outcome, WorkItem};
use crate::infra::registry::DisposableRegistry;
use crate::infra::store::{BacklogSnapshot, PersistedEntry, SnapshotStore};
use crate::util::clock::now_ms;

/// Row of the reporting surface, one per tracked item. Rendering is the
/// host's concern.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BacklogReport {
    /// Human-meaningful description of the resource.
    pub description: String,
    /// Registration time in milliseconds since the Unix epoch.
    pub registered_at_ms: u128,
    /// Display text of the last attempt's outcome.
    pub outcome_text: String,
    /// Opaque id accepted by [`Disposer::stop_tracking`].
    pub id: u64,
}

/// Snapshot of engine counters.
#[derive(Debug, Clone, Default)]
pub struct DisposerStats {
    /// Items currently tracked.
    pub tracked: usize,
    /// Attempts executing right now.
    pub in_flight: u64,
    /// Attempts that actually began since process start.
    pub attempts: u64,
    /// Attempts that reported the terminal outcome.
    pub purged_total: u64,
    /// Attempts that threw or reported failure.
    pub failed_attempts: u64,
}

/// Builds identity snapshots and writes them through the store, swallowing
/// and logging failures: an unpersisted change is retried at the next
/// structural change or sweep, and worst case the producer re-registers
/// after a restart, which deduplication makes idempotent.
#[derive(Clone)]
pub(crate) struct Persister {
    backlog: Arc<Backlog>,
    store: Arc<dyn SnapshotStore>,
}

impl Persister {
    fn new(backlog: Arc<Backlog>, store: Arc<dyn SnapshotStore>) -> Self {
        Self { backlog, store }
    }

    pub(crate) fn save(&self) {
        let snapshot = self.snapshot();
        if let Err(err) = self.store.save(&snapshot) {
            tracing::warn!(error = %err, "unable to store disposer backlog");
        }
    }

    fn load(&self) -> Result<Option<BacklogSnapshot>, DisposerError> {
        self.store.load()
    }

    fn snapshot(&self) -> BacklogSnapshot {
        let entries = self
            .backlog
            .snapshot()
            .into_iter()
            .map(|item| {
                let payload = match item.disposable().encode() {
                    Ok(value) => Some(value),
                    Err(err) => {
                        tracing::warn!(
                            item = %item.diagnostic_label(),
                            error = %err,
                            "unable to encode disposable, entry persisted without payload"
                        );
                        None
                    }
                };
                PersistedEntry {
                    kind: item.disposable().kind().to_string(),
                    label: item.diagnostic_label().to_string(),
                    registered_at_ms: item.registered_at_ms(),
                    payload,
                }
            })
            .collect();
        BacklogSnapshot { entries }
    }
}

/// The disposal engine.
///
/// One explicit instance per process, constructed at startup and passed by
/// reference to every producer; there is no ambient global lookup. Producers
/// register resources with [`dispose`](Self::dispose); the engine retries
/// each one on a fixed cadence until it purges or an operator abandons it,
/// and persists the identity set so registrations survive restarts.
pub struct Disposer<S> {
    config: DisposerConfig,
    backlog: Arc<Backlog>,
    dispatcher: Dispatcher<S>,
    persister: Persister,
    registry: DisposableRegistry,
    spawner: S,
    shutdown_tx: watch::Sender<bool>,
}

impl<S> Disposer<S>
where
    S: Spawn + Clone + Send + Sync + 'static,
{
    /// Build an engine without touching the store or starting sweeps;
    /// callers drive [`recover`](Self::recover) and
    /// [`reschedule`](Self::reschedule) themselves (useful in tests).
    ///
    /// # Errors
    ///
    /// [`DisposerError::Config`] when the configuration is invalid.
    pub fn new(
        config: DisposerConfig,
        store: Arc<dyn SnapshotStore>,
        registry: DisposableRegistry,
        spawner: S,
    ) -> Result<Self, DisposerError> {
        config.validate().map_err(DisposerError::Config)?;
        let backlog = Arc::new(Backlog::new());
        let persister = Persister::new(Arc::clone(&backlog), store);
        let dispatcher = Dispatcher::new(
            config.max_in_flight,
            Arc::clone(&backlog),
            persister.clone(),
            spawner.clone(),
        );
        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            config,
            backlog,
            dispatcher,
            persister,
            registry,
            spawner,
            shutdown_tx,
        })
    }

    /// Build an engine, recover the persisted backlog, and start the
    /// periodic sweep task.
    ///
    /// # Errors
    ///
    /// [`DisposerError::Config`] when the configuration is invalid.
    pub fn start(
        config: DisposerConfig,
        store: Arc<dyn SnapshotStore>,
        registry: DisposableRegistry,
        spawner: S,
    ) -> Result<Arc<Self>, DisposerError> {
        let disposer = Arc::new(Self::new(config, store, registry, spawner)?);
        disposer.recover();
        disposer.start_sweeps();
        Ok(disposer)
    }

    /// Schedule resources to be disposed. Fire and forget: equal disposables
    /// collapse into existing entries, newly tracked ones trigger one save
    /// and are submitted for their first attempt.
    pub fn dispose<I>(&self, disposables: I)
    where
        I: IntoIterator<Item = Arc<dyn Disposable>>,
    {
        let mut new_items = Vec::new();
        for disposable in disposables {
            let (item, added) = self.backlog.register(disposable);
            if added {
                tracing::info!(item = %item.diagnostic_label(), "tracking resource for disposal");
                new_items.push(item);
            }
        }
        if new_items.is_empty() {
            return;
        }
        self.persister.save();
        for item in new_items {
            self.dispatcher.submit(item);
        }
    }

    /// Schedule one resource and receive the outcome of its first attempt.
    ///
    /// Meant for callers, notably tests, that need synchronous confirmation.
    /// When the disposable collapses into an entry whose attempt is already
    /// running, the receiver gets that item's most recent outcome instead.
    pub fn dispose_and_await(&self, disposable: Arc<dyn Disposable>) -> oneshot::Receiver<Outcome> {
        let (tx, rx) = oneshot::channel();
        let (item, added) = self.backlog.register(disposable);
        if added {
            self.persister.save();
        }
        self.dispatcher.submit_with_notify(item, tx);
        rx
    }

    /// Abandon one tracked item by its opaque id, regardless of outcome.
    ///
    /// Returns `true` iff the entry was still tracked and is now removed;
    /// the removal is persisted. An attempt already executing against the
    /// item is not interrupted, its result is discarded.
    pub fn stop_tracking(&self, id: u64) -> bool {
        let removed = self.backlog.remove_by_id(id);
        if removed {
            tracing::info!(id, "stopped tracking disposer item");
            self.persister.save();
        }
        removed
    }

    /// Point-in-time copy of the tracked items.
    pub fn backlog(&self) -> Vec<Arc<WorkItem>> {
        self.backlog.snapshot()
    }

    /// Reporting rows for the host's management surface.
    pub fn report(&self) -> Vec<BacklogReport> {
        self.backlog
            .snapshot()
            .into_iter()
            .map(|item| BacklogReport {
                description: item.disposable().display_name(),
                registered_at_ms: item.registered_at_ms(),
                outcome_text: item.last_outcome().display_text(),
                id: item.id(),
            })
            .collect()
    }

    /// True iff at least one unresolved item has been tracked for longer
    /// than the configured staleness threshold. The host decides whether to
    /// surface an operator-visible warning.
    pub fn is_stale(&self) -> bool {
        if self.backlog.is_empty() {
            return false;
        }
        let threshold = now_ms().saturating_sub(u128::from(self.config.stale_after_secs) * 1000);
        self.backlog
            .snapshot()
            .iter()
            .any(|item| !item.last_outcome().is_purged() && item.registered_at_ms() < threshold)
    }

    /// Snapshot of engine counters.
    pub fn stats(&self) -> DisposerStats {
        let counters = self.dispatcher.counters();
        DisposerStats {
            tracked: self.backlog.len(),
            in_flight: counters.active.load(Ordering::Acquire),
            attempts: counters.attempts.load(Ordering::Acquire),
            purged_total: counters.purged.load(Ordering::Acquire),
            failed_attempts: counters.failed.load(Ordering::Acquire),
        }
    }

    /// One sweep: persist opportunistically (capturing successful removals
    /// since the last save), then resubmit every item not currently being
    /// worked. Never blocks on attempts and never mutates item state.
    pub fn reschedule(&self) {
        if self.backlog.is_empty() {
            return;
        }

        self.persister.save();
        for item in self.backlog.snapshot() {
            if item.is_in_progress() {
                tracing::debug!(item = %item.diagnostic_label(), "in progress, not rescheduling");
            } else {
                tracing::debug!(item = %item.diagnostic_label(), "rescheduling");
                self.dispatcher.submit(item);
            }
        }
    }

    /// Restore the persisted identity set.
    ///
    /// Only the disposables and their registration times are restorable;
    /// outcome and in-progress state always restart as `Pending`/idle.
    /// Entries that cannot be decoded come back as placeholders that drain
    /// on the next sweep.
    pub fn recover(&self) {
        let snapshot = match self.persister.load() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return,
            Err(err) => {
                tracing::warn!(error = %err, "unable to load disposer backlog");
                return;
            }
        };

        let mut restored = 0_usize;
        for entry in &snapshot.entries {
            let disposable = self.registry.decode(entry);
            let item = Arc::new(WorkItem::with_registered_at(
                disposable,
                entry.registered_at_ms,
            ));
            if self.backlog.restore(item) {
                restored += 1;
            }
        }
        tracing::info!(restored, "recovered disposer backlog");
    }

    /// Start the periodic sweep task. The task holds only a weak reference,
    /// so dropping the engine stops it as reliably as
    /// [`shutdown`](Self::shutdown).
    pub fn start_sweeps(self: &Arc<Self>) {
        let engine = Arc::downgrade(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let period = self.config.sweep_interval();

        self.spawner.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so a freshly
            // recovered backlog is first swept one full period after start.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(engine) = Weak::upgrade(&engine) else {
                            break;
                        };
                        engine.reschedule();
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("disposer sweep task stopped");
        });
    }

    /// Stop the sweep task and release attempts still waiting for a slot.
    /// In-flight attempts run to completion.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        self.dispatcher.shutdown();
        tracing::info!("disposer shut down");
    }
}
