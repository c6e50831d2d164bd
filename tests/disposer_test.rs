//! Integration tests for the disposal engine core.
//!
//! Covers the backlog deduplication contract, the per-item state machine,
//! error retention, the global concurrency ceiling, staleness reporting, and
//! the operator abandon action.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Notify;

use resource_disposer::config::DisposerConfig;
use resource_disposer::core::{Disposable, Disposer, Outcome};
use resource_disposer::infra::{DisposableRegistry, InMemoryStore};
use resource_disposer::runtime::TokioSpawner;

// ============================================================================
// Test disposables
// ============================================================================

/// Purges on the first attempt.
struct PurgeDisposable {
    name: String,
    attempts: Arc<AtomicU32>,
}

impl PurgeDisposable {
    fn new(name: &str) -> (Arc<dyn Disposable>, Arc<AtomicU32>) {
        let attempts = Arc::new(AtomicU32::new(0));
        let disposable = Arc::new(Self {
            name: name.into(),
            attempts: Arc::clone(&attempts),
        });
        (disposable, attempts)
    }
}

#[async_trait]
impl Disposable for PurgeDisposable {
    async fn dispose(&self) -> anyhow::Result<Outcome> {
        self.attempts.fetch_add(1, Ordering::AcqRel);
        Ok(Outcome::Purged)
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }

    fn kind(&self) -> &'static str {
        "purge"
    }

    fn dedup_key(&self) -> String {
        self.name.clone()
    }

    fn encode(&self) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::json!({ "name": self.name }))
    }
}

/// Reports `Pending` until the n-th attempt, then purges.
struct CountingDisposable {
    name: String,
    purge_on: u32,
    attempts: Arc<AtomicU32>,
}

impl CountingDisposable {
    fn new(name: &str, purge_on: u32) -> (Arc<dyn Disposable>, Arc<AtomicU32>) {
        let attempts = Arc::new(AtomicU32::new(0));
        let disposable = Arc::new(Self {
            name: name.into(),
            purge_on,
            attempts: Arc::clone(&attempts),
        });
        (disposable, attempts)
    }
}

#[async_trait]
impl Disposable for CountingDisposable {
    async fn dispose(&self) -> anyhow::Result<Outcome> {
        let n = self.attempts.fetch_add(1, Ordering::AcqRel) + 1;
        if n >= self.purge_on {
            Ok(Outcome::Purged)
        } else {
            Ok(Outcome::Pending)
        }
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }

    fn kind(&self) -> &'static str {
        "counting"
    }

    fn dedup_key(&self) -> String {
        self.name.clone()
    }

    fn encode(&self) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::json!({ "name": self.name }))
    }
}

/// Fails every attempt with the same error.
struct FailingDisposable {
    name: String,
    attempts: Arc<AtomicU32>,
}

impl FailingDisposable {
    const ERROR: &'static str = "Unable to dispose";

    fn new(name: &str) -> Arc<dyn Disposable> {
        Self::with_counter(name).0
    }

    fn with_counter(name: &str) -> (Arc<dyn Disposable>, Arc<AtomicU32>) {
        let attempts = Arc::new(AtomicU32::new(0));
        let disposable = Arc::new(Self {
            name: name.into(),
            attempts: Arc::clone(&attempts),
        });
        (disposable, attempts)
    }
}

#[async_trait]
impl Disposable for FailingDisposable {
    async fn dispose(&self) -> anyhow::Result<Outcome> {
        self.attempts.fetch_add(1, Ordering::AcqRel);
        Err(anyhow::anyhow!(Self::ERROR))
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }

    fn kind(&self) -> &'static str {
        "failing"
    }

    fn dedup_key(&self) -> String {
        self.name.clone()
    }

    fn encode(&self) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::json!({ "name": self.name }))
    }
}

/// Blocks until released, then purges.
struct BlockingDisposable {
    name: String,
    started: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    release: Arc<Notify>,
}

#[derive(Clone)]
struct BlockingHandle {
    started: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    release: Arc<Notify>,
}

impl BlockingHandle {
    fn is_active(&self) -> bool {
        self.started.load(Ordering::Acquire) && !self.finished.load(Ordering::Acquire)
    }
}

impl BlockingDisposable {
    fn new(name: &str) -> (Arc<dyn Disposable>, BlockingHandle) {
        let handle = BlockingHandle {
            started: Arc::new(AtomicBool::new(false)),
            finished: Arc::new(AtomicBool::new(false)),
            release: Arc::new(Notify::new()),
        };
        let disposable = Arc::new(Self {
            name: name.into(),
            started: Arc::clone(&handle.started),
            finished: Arc::clone(&handle.finished),
            release: Arc::clone(&handle.release),
        });
        (disposable, handle)
    }
}

#[async_trait]
impl Disposable for BlockingDisposable {
    async fn dispose(&self) -> anyhow::Result<Outcome> {
        self.started.store(true, Ordering::Release);
        self.release.notified().await;
        self.finished.store(true, Ordering::Release);
        Ok(Outcome::Purged)
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }

    fn kind(&self) -> &'static str {
        "blocking"
    }

    fn dedup_key(&self) -> String {
        self.name.clone()
    }

    fn encode(&self) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::json!({ "name": self.name }))
    }
}

/// Panics on every attempt.
struct PanickingDisposable;

#[async_trait]
impl Disposable for PanickingDisposable {
    async fn dispose(&self) -> anyhow::Result<Outcome> {
        panic!("producer defect");
    }

    fn display_name(&self) -> String {
        "panicking resource".into()
    }

    fn kind(&self) -> &'static str {
        "panicking"
    }

    fn dedup_key(&self) -> String {
        "only".into()
    }

    fn encode(&self) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::json!({}))
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn new_disposer(config: DisposerConfig) -> (Disposer<TokioSpawner>, Arc<InMemoryStore>) {
    resource_disposer::util::init_tracing();
    let store = Arc::new(InMemoryStore::new());
    let disposer = Disposer::new(
        config,
        Arc::clone(&store) as _,
        DisposableRegistry::new(),
        TokioSpawner::current(),
    )
    .unwrap();
    (disposer, store)
}

async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting until {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dispose_immediately() {
    let (disposer, _) = new_disposer(DisposerConfig::default());
    let (disposable, attempts) = PurgeDisposable::new("vm-1");

    let outcome = disposer.dispose_and_await(disposable).await.unwrap();

    assert!(outcome.is_purged());
    assert_eq!(attempts.load(Ordering::Acquire), 1);
    assert!(disposer.backlog().is_empty());
    assert!(!disposer.is_stale());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn collapse_same_disposables() {
    let (disposer, _) = new_disposer(DisposerConfig::default());

    // Identical instance collapses.
    let same = FailingDisposable::new("vm-1");
    disposer.dispose([Arc::clone(&same), same]);
    assert_eq!(disposer.backlog().len(), 1);

    // Equal instances collapse.
    disposer.dispose([FailingDisposable::new("vm-1")]);
    disposer.dispose([FailingDisposable::new("vm-1")]);
    assert_eq!(disposer.backlog().len(), 1);

    // Distinct resources do not.
    disposer.dispose([FailingDisposable::new("vm-2")]);
    assert_eq!(disposer.backlog().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn postponed_disposal_takes_exactly_three_attempts() {
    let (disposer, _) = new_disposer(DisposerConfig::default());
    let (disposable, attempts) = CountingDisposable::new("vm-1", 3);

    let outcome = disposer.dispose_and_await(disposable).await.unwrap();
    assert!(matches!(outcome, Outcome::Pending));
    assert_eq!(attempts.load(Ordering::Acquire), 1);
    assert_eq!(disposer.backlog().len(), 1);

    disposer.reschedule();
    wait_until("second attempt settles", || {
        attempts.load(Ordering::Acquire) == 2 && disposer.stats().in_flight == 0
    })
    .await;
    assert_eq!(disposer.backlog().len(), 1);

    disposer.reschedule();
    wait_until("backlog drains", || disposer.backlog().is_empty()).await;
    assert_eq!(attempts.load(Ordering::Acquire), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn thrown_error_is_retained_across_retries() {
    let (disposer, _) = new_disposer(DisposerConfig::default());
    let (disposable, attempts) = FailingDisposable::with_counter("vm-1");

    let outcome = disposer.dispose_and_await(disposable).await.unwrap();
    match &outcome {
        Outcome::Thrown(err) => assert!(err.to_string().contains(FailingDisposable::ERROR)),
        other => panic!("expected Thrown, got {other}"),
    }

    disposer.reschedule();
    wait_until("retry settles", || {
        attempts.load(Ordering::Acquire) == 2 && disposer.stats().in_flight == 0
    })
    .await;

    let backlog = disposer.backlog();
    assert_eq!(backlog.len(), 1);
    assert!(backlog[0]
        .last_outcome()
        .display_text()
        .contains(FailingDisposable::ERROR));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_outcome_is_retained_for_reporting() {
    struct SoftFail;

    #[async_trait]
    impl Disposable for SoftFail {
        async fn dispose(&self) -> anyhow::Result<Outcome> {
            Ok(Outcome::Failed("resource still referenced".into()))
        }

        fn display_name(&self) -> String {
            "soft failing resource".into()
        }

        fn kind(&self) -> &'static str {
            "soft"
        }

        fn dedup_key(&self) -> String {
            "only".into()
        }

        fn encode(&self) -> anyhow::Result<serde_json::Value> {
            Ok(serde_json::json!({}))
        }
    }

    let (disposer, _) = new_disposer(DisposerConfig::default());
    let outcome = disposer.dispose_and_await(Arc::new(SoftFail)).await.unwrap();
    assert!(matches!(outcome, Outcome::Failed(_)));

    let report = disposer.report();
    assert_eq!(report.len(), 1);
    assert_eq!(report[0].description, "soft failing resource");
    assert_eq!(report[0].outcome_text, "Failed: resource still referenced");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn producer_panic_is_contained_as_thrown() {
    let (disposer, _) = new_disposer(DisposerConfig::default());

    let outcome = disposer
        .dispose_and_await(Arc::new(PanickingDisposable))
        .await
        .unwrap();
    match &outcome {
        Outcome::Thrown(err) => assert!(err.to_string().contains("panicked")),
        other => panic!("expected Thrown, got {other}"),
    }
    assert_eq!(disposer.backlog().len(), 1);

    // The worker pool survived the panic.
    let (disposable, _) = PurgeDisposable::new("vm-after-panic");
    let outcome = disposer.dispose_and_await(disposable).await.unwrap();
    assert!(outcome.is_purged());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_disposals_are_throttled() {
    let ceiling = 3;
    let (disposer, _) = new_disposer(DisposerConfig {
        max_in_flight: ceiling,
        ..DisposerConfig::default()
    });

    let mut handles = Vec::new();
    for i in 0..ceiling {
        let (disposable, handle) = BlockingDisposable::new(&format!("blocked-{i}"));
        handles.push(handle);
        disposer.dispose([disposable]);
    }
    wait_until("ceiling fills", || {
        handles.iter().filter(|h| h.is_active()).count() == ceiling
    })
    .await;

    // One past the ceiling: tracked and pending, not executing.
    let (extra, extra_handle) = BlockingDisposable::new("blocked-extra");
    disposer.dispose([extra]);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!extra_handle.started.load(Ordering::Acquire));
    assert_eq!(disposer.backlog().len(), ceiling + 1);

    // Many past the ceiling: all remain pending and visible, none dropped.
    for i in 0..100 {
        let (disposable, _) = BlockingDisposable::new(&format!("overflow-{i}"));
        disposer.dispose([disposable]);
    }
    assert_eq!(disposer.backlog().len(), ceiling + 101);
    assert_eq!(disposer.stats().in_flight, ceiling as u64);

    // Releasing one blocked attempt frees exactly one slot.
    handles[0].release.notify_one();
    wait_until("released item purges", || {
        disposer.backlog().len() == ceiling + 100
    })
    .await;
    wait_until("next pending item starts", || {
        disposer.stats().in_flight == ceiling as u64
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn duplicate_of_running_item_is_a_noop() {
    let (disposer, _) = new_disposer(DisposerConfig::default());
    let (disposable, handle) = BlockingDisposable::new("vm-1");
    disposer.dispose([disposable]);
    wait_until("attempt starts", || handle.is_active()).await;

    // An equal registration collapses and does not start a second attempt.
    let (duplicate, dup_handle) = BlockingDisposable::new("vm-1");
    let outcome = disposer.dispose_and_await(duplicate).await.unwrap();
    assert!(matches!(outcome, Outcome::Pending));
    assert!(!dup_handle.started.load(Ordering::Acquire));
    assert_eq!(disposer.backlog().len(), 1);

    handle.release.notify_one();
    wait_until("backlog drains", || disposer.backlog().is_empty()).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stop_tracking_removes_exactly_one_entry() {
    let (disposer, store) = new_disposer(DisposerConfig::default());

    assert!(!disposer.stop_tracking(42));

    disposer.dispose([FailingDisposable::new("vm-1"), FailingDisposable::new("vm-2")]);
    wait_until("first attempts settle", || disposer.stats().in_flight == 0).await;

    let id = disposer
        .backlog()
        .iter()
        .find(|item| item.disposable().display_name() == "vm-1")
        .map(|item| item.id())
        .unwrap();

    assert!(disposer.stop_tracking(id));
    assert!(!disposer.stop_tracking(id));
    assert_eq!(disposer.backlog().len(), 1);

    // The removal was persisted.
    let persisted = store.last().unwrap();
    assert_eq!(persisted.entries.len(), 1);
    assert!(persisted.entries[0].label.contains("vm-2"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn staleness_tracks_unresolved_age() {
    let (disposer, _) = new_disposer(DisposerConfig {
        stale_after_secs: 0,
        ..DisposerConfig::default()
    });
    assert!(!disposer.is_stale());

    let outcome = disposer
        .dispose_and_await(FailingDisposable::new("vm-1"))
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Thrown(_)));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(disposer.is_stale());

    let id = disposer.backlog()[0].id();
    assert!(disposer.stop_tracking(id));
    assert!(!disposer.is_stale());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn periodic_sweeps_retry_until_purged() {
    let store = Arc::new(InMemoryStore::new());
    let disposer = Disposer::start(
        DisposerConfig {
            sweep_interval_secs: 1,
            ..DisposerConfig::default()
        },
        store as _,
        DisposableRegistry::new(),
        TokioSpawner::current(),
    )
    .unwrap();

    let (disposable, attempts) = CountingDisposable::new("vm-1", 2);
    disposer.dispose([disposable]);

    wait_until("sweep drains the backlog", || disposer.backlog().is_empty()).await;
    assert_eq!(attempts.load(Ordering::Acquire), 2);
    disposer.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stats_reflect_activity() {
    let (disposer, _) = new_disposer(DisposerConfig::default());

    let (purge, _) = PurgeDisposable::new("vm-1");
    disposer.dispose_and_await(purge).await.unwrap();
    disposer
        .dispose_and_await(FailingDisposable::new("vm-2"))
        .await
        .unwrap();
    wait_until("attempts settle", || disposer.stats().in_flight == 0).await;

    let stats = disposer.stats();
    assert_eq!(stats.tracked, 1);
    assert_eq!(stats.purged_total, 1);
    assert_eq!(stats.failed_attempts, 1);
    assert_eq!(stats.attempts, 2);
}
