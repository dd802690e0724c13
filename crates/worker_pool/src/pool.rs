//! WorkerPool - bounded priority executor with a resizable permit budget

use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use contracts::{NetworkInfo, PoolConfig};
use parking_lot::Mutex;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, instrument};

use crate::error::PoolError;
use crate::job::{Job, WaitingJob};
use crate::sizing::thread_count_for;

/// Handle to a running worker pool
///
/// Jobs wait in a priority heap; a scheduler task hands the best waiting job
/// a permit and runs it on a blocking thread. The number of permits is the
/// pool's thread count.
pub struct WorkerPool<J: Job> {
    shared: Arc<Shared<J>>,
}

struct Shared<J> {
    config: PoolConfig,
    queue: Mutex<BinaryHeap<WaitingJob<J>>>,
    job_ready: Notify,
    permits: Arc<Semaphore>,
    /// Current target; the lock serialises resizes
    thread_count: Mutex<usize>,
    /// Permits to retire once their busy worker finishes
    pending_shrink: AtomicUsize,
    next_sequence: AtomicU64,
    shutdown: AtomicBool,
    stats: PoolStats,
}

#[derive(Debug, Default)]
struct PoolStats {
    active: AtomicUsize,
    submitted: AtomicU64,
    completed: AtomicU64,
    skipped_cancelled: AtomicU64,
}

/// Snapshot of pool state (for reporting)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub thread_count: usize,
    pub active: usize,
    pub queued: usize,
    pub submitted: u64,
    pub completed: u64,
    pub skipped_cancelled: u64,
    pub is_shutdown: bool,
}

impl<J: Job> WorkerPool<J> {
    /// Create the pool with `default_threads` permits and spawn its scheduler.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: PoolConfig) -> Self {
        let threads = config.default_threads.max(1);
        let shared = Arc::new(Shared {
            queue: Mutex::new(BinaryHeap::new()),
            job_ready: Notify::new(),
            permits: Arc::new(Semaphore::new(threads)),
            thread_count: Mutex::new(threads),
            pending_shrink: AtomicUsize::new(0),
            next_sequence: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
            stats: PoolStats::default(),
            config,
        });

        tokio::spawn(schedule(Arc::clone(&shared)));
        observability::metrics::record_pool_thread_count(threads);
        debug!(threads, "Worker pool started");

        Self { shared }
    }

    /// Queue a job.
    ///
    /// # Errors
    /// [`PoolError::Shutdown`] once the pool has been shut down.
    pub fn submit(&self, job: Arc<J>) -> Result<(), PoolError> {
        if self.is_shutdown() {
            return Err(PoolError::Shutdown);
        }

        let waiting = WaitingJob {
            priority: job.priority(),
            sequence: self.shared.next_sequence.fetch_add(1, Ordering::Relaxed),
            job,
        };
        self.shared.queue.lock().push(waiting);
        self.shared.stats.submitted.fetch_add(1, Ordering::Relaxed);
        self.shared.job_ready.notify_one();
        Ok(())
    }

    /// Re-rank a queued job after its priority changed.
    ///
    /// Returns false when the job is not waiting (already running or never
    /// submitted) or its priority is unchanged.
    pub fn reprioritize(&self, job: &Arc<J>) -> bool {
        let priority = job.priority();
        let mut queue = self.shared.queue.lock();
        let mut waiting = std::mem::take(&mut *queue).into_vec();
        let mut changed = false;
        for entry in waiting.iter_mut().filter(|entry| Arc::ptr_eq(&entry.job, job)) {
            changed |= entry.priority != priority;
            entry.priority = priority;
        }
        *queue = BinaryHeap::from(waiting);
        if changed {
            debug!(?priority, "Queued job re-ranked");
        }
        changed
    }

    /// Resize the pool for the given connectivity; returns the new thread count
    #[instrument(
        name = "worker_pool_adjust",
        skip(self, info),
        fields(connected = info.is_some_and(NetworkInfo::is_connected))
    )]
    pub fn adjust_thread_count(&self, info: Option<&NetworkInfo>) -> usize {
        let target = thread_count_for(&self.shared.config, info);
        self.set_thread_count(target);
        target
    }

    /// Resize the pool to exactly `target` threads (at least one).
    ///
    /// Growing adds permits. Shrinking forgets idle permits right away and
    /// retires the rest as running jobs finish; no running job is interrupted.
    pub fn set_thread_count(&self, target: usize) {
        if self.is_shutdown() {
            return;
        }
        let target = target.max(1);
        let mut current = self.shared.thread_count.lock();
        if target == *current {
            return;
        }

        if target > *current {
            let grow = target - *current;
            let cancelled = self.shared.take_pending_shrink(grow);
            self.shared.permits.add_permits(grow - cancelled);
        } else {
            let shrink = *current - target;
            let forgotten = self.shared.permits.forget_permits(shrink);
            self.shared
                .pending_shrink
                .fetch_add(shrink - forgotten, Ordering::SeqCst);
        }

        info!(from = *current, to = target, "Worker pool resized");
        *current = target;
        observability::metrics::record_pool_thread_count(target);
    }

    pub fn thread_count(&self) -> usize {
        *self.shared.thread_count.lock()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::Acquire)
    }

    /// Stop accepting jobs and drop the queued ones; running jobs finish.
    /// Idempotent.
    #[instrument(name = "worker_pool_shutdown", skip(self))]
    pub fn shutdown(&self) {
        if self.shared.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        let dropped = {
            let mut queue = self.shared.queue.lock();
            let dropped = queue.len();
            queue.clear();
            dropped
        };
        self.shared.permits.close();
        self.shared.job_ready.notify_one();
        info!(dropped, "Worker pool shut down");
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        let stats = &self.shared.stats;
        PoolSnapshot {
            thread_count: self.thread_count(),
            active: stats.active.load(Ordering::Relaxed),
            queued: self.shared.queue.lock().len(),
            submitted: stats.submitted.load(Ordering::Relaxed),
            completed: stats.completed.load(Ordering::Relaxed),
            skipped_cancelled: stats.skipped_cancelled.load(Ordering::Relaxed),
            is_shutdown: self.is_shutdown(),
        }
    }
}

impl<J: Job> Drop for WorkerPool<J> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<J: Job> Shared<J> {
    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Cancel up to `n` pending shrinks; returns how many were cancelled
    fn take_pending_shrink(&self, n: usize) -> usize {
        let mut taken = 0;
        let _ = self
            .pending_shrink
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |pending| {
                taken = pending.min(n);
                Some(pending - taken)
            });
        taken
    }

    /// Pop the best job that is still wanted
    fn pop_runnable(&self) -> Option<Arc<J>> {
        let mut queue = self.queue.lock();
        while let Some(waiting) = queue.pop() {
            if waiting.job.is_cancelled() {
                self.stats.skipped_cancelled.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            return Some(waiting.job);
        }
        None
    }

    async fn next_job(&self) -> Option<Arc<J>> {
        loop {
            if self.is_shutdown() {
                return None;
            }
            if let Some(job) = self.pop_runnable() {
                return Some(job);
            }
            self.job_ready.notified().await;
        }
    }
}

/// Scheduler loop: permit first, then the best job at that moment
#[instrument(name = "worker_pool_scheduler", skip(shared))]
async fn schedule<J: Job>(shared: Arc<Shared<J>>) {
    loop {
        // Closed on shutdown
        let Ok(permit) = Arc::clone(&shared.permits).acquire_owned().await else {
            break;
        };
        let Some(job) = shared.next_job().await else {
            break;
        };

        let slot = WorkerSlot::new(Arc::clone(&shared), permit);
        tokio::task::spawn_blocking(move || {
            let _slot = slot;
            job.run();
        });
    }
    debug!("Worker pool scheduler stopped");
}

/// Bookkeeping for one running job; releases or retires its permit on drop,
/// including when the job panics
struct WorkerSlot<J: Job> {
    shared: Arc<Shared<J>>,
    permit: Option<OwnedSemaphorePermit>,
    started: Instant,
}

impl<J: Job> WorkerSlot<J> {
    fn new(shared: Arc<Shared<J>>, permit: OwnedSemaphorePermit) -> Self {
        shared.stats.active.fetch_add(1, Ordering::Relaxed);
        Self {
            shared,
            permit: Some(permit),
            started: Instant::now(),
        }
    }
}

impl<J: Job> Drop for WorkerSlot<J> {
    fn drop(&mut self) {
        let stats = &self.shared.stats;
        stats.active.fetch_sub(1, Ordering::Relaxed);
        stats.completed.fetch_add(1, Ordering::Relaxed);
        observability::metrics::record_pool_job_duration_ms(
            self.started.elapsed().as_secs_f64() * 1000.0,
        );

        if let Some(permit) = self.permit.take() {
            if self.shared.take_pending_shrink(1) == 1 {
                permit.forget();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::Priority;
    use std::sync::atomic::AtomicBool;
    use tokio::time::{sleep, timeout, Duration};

    struct TestJob {
        name: &'static str,
        priority: parking_lot::Mutex<Priority>,
        cancelled: AtomicBool,
        hold: Option<Arc<AtomicBool>>,
        work: Duration,
        log: Arc<parking_lot::Mutex<Vec<&'static str>>>,
        running: Arc<AtomicUsize>,
        max_running: Arc<AtomicUsize>,
    }

    struct Harness {
        log: Arc<parking_lot::Mutex<Vec<&'static str>>>,
        running: Arc<AtomicUsize>,
        max_running: Arc<AtomicUsize>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                log: Arc::default(),
                running: Arc::default(),
                max_running: Arc::default(),
            }
        }

        fn job(&self, name: &'static str, priority: Priority) -> TestJob {
            TestJob {
                name,
                priority: parking_lot::Mutex::new(priority),
                cancelled: AtomicBool::new(false),
                hold: None,
                work: Duration::ZERO,
                log: Arc::clone(&self.log),
                running: Arc::clone(&self.running),
                max_running: Arc::clone(&self.max_running),
            }
        }
    }

    impl Job for TestJob {
        fn priority(&self) -> Priority {
            *self.priority.lock()
        }

        fn is_cancelled(&self) -> bool {
            self.cancelled.load(Ordering::SeqCst)
        }

        fn run(self: Arc<Self>) {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            if let Some(hold) = &self.hold {
                while hold.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
            std::thread::sleep(self.work);
            self.log.lock().push(self.name);
            self.running.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn config(default_threads: usize) -> PoolConfig {
        PoolConfig {
            default_threads,
            ..PoolConfig::default()
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        timeout(Duration::from_secs(5), async {
            while !condition() {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_runs_submitted_jobs() {
        let harness = Harness::new();
        let pool = WorkerPool::new(config(2));

        for name in ["a", "b", "c"] {
            pool.submit(Arc::new(harness.job(name, Priority::Normal)))
                .unwrap();
        }

        wait_until(|| pool.snapshot().completed == 3).await;
        let mut log = harness.log.lock().clone();
        log.sort();
        assert_eq!(log, vec!["a", "b", "c"]);
        assert_eq!(pool.snapshot().submitted, 3);
    }

    #[tokio::test]
    async fn test_priority_order_when_saturated() {
        let harness = Harness::new();
        let pool = WorkerPool::new(config(1));

        let hold = Arc::new(AtomicBool::new(true));
        let mut gate = harness.job("gate", Priority::Normal);
        gate.hold = Some(Arc::clone(&hold));
        pool.submit(Arc::new(gate)).unwrap();
        wait_until(|| pool.snapshot().active == 1).await;

        pool.submit(Arc::new(harness.job("low", Priority::Low))).unwrap();
        pool.submit(Arc::new(harness.job("normal-1", Priority::Normal)))
            .unwrap();
        pool.submit(Arc::new(harness.job("high", Priority::High))).unwrap();
        pool.submit(Arc::new(harness.job("normal-2", Priority::Normal)))
            .unwrap();

        hold.store(false, Ordering::SeqCst);
        wait_until(|| pool.snapshot().completed == 5).await;

        assert_eq!(
            *harness.log.lock(),
            vec!["gate", "high", "normal-1", "normal-2", "low"]
        );
    }

    #[tokio::test]
    async fn test_raised_priority_reorders_queue() {
        let harness = Harness::new();
        let pool = WorkerPool::new(config(1));

        let hold = Arc::new(AtomicBool::new(true));
        let mut gate = harness.job("gate", Priority::Normal);
        gate.hold = Some(Arc::clone(&hold));
        pool.submit(Arc::new(gate)).unwrap();
        wait_until(|| pool.snapshot().active == 1).await;

        let raised = Arc::new(harness.job("low-then-high", Priority::Low));
        pool.submit(Arc::clone(&raised)).unwrap();
        pool.submit(Arc::new(harness.job("normal", Priority::Normal)))
            .unwrap();

        *raised.priority.lock() = Priority::High;
        assert!(pool.reprioritize(&raised));
        // Nothing left to re-rank
        assert!(!pool.reprioritize(&raised));

        hold.store(false, Ordering::SeqCst);
        wait_until(|| pool.snapshot().completed == 3).await;

        assert_eq!(
            *harness.log.lock(),
            vec!["gate", "low-then-high", "normal"]
        );
        assert!(!pool.reprioritize(&raised));
    }

    #[tokio::test]
    async fn test_cancelled_job_is_skipped() {
        let harness = Harness::new();
        let pool = WorkerPool::new(config(1));

        let hold = Arc::new(AtomicBool::new(true));
        let mut gate = harness.job("gate", Priority::Normal);
        gate.hold = Some(Arc::clone(&hold));
        pool.submit(Arc::new(gate)).unwrap();
        wait_until(|| pool.snapshot().active == 1).await;

        let doomed = Arc::new(harness.job("doomed", Priority::High));
        pool.submit(Arc::clone(&doomed)).unwrap();
        doomed.cancelled.store(true, Ordering::SeqCst);
        pool.submit(Arc::new(harness.job("kept", Priority::Low))).unwrap();

        hold.store(false, Ordering::SeqCst);
        wait_until(|| pool.snapshot().completed == 2).await;

        assert_eq!(*harness.log.lock(), vec!["gate", "kept"]);
        assert_eq!(pool.snapshot().skipped_cancelled, 1);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let harness = Harness::new();
        let pool = WorkerPool::new(config(2));

        for _ in 0..6 {
            let mut job = harness.job("work", Priority::Normal);
            job.work = Duration::from_millis(20);
            pool.submit(Arc::new(job)).unwrap();
        }

        wait_until(|| pool.snapshot().completed == 6).await;
        assert!(harness.max_running.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_adjust_thread_count_by_network() {
        let pool: WorkerPool<TestJob> = WorkerPool::new(PoolConfig::default());
        assert_eq!(pool.thread_count(), 3);

        assert_eq!(pool.adjust_thread_count(Some(&NetworkInfo::wifi())), 4);
        assert_eq!(pool.thread_count(), 4);

        assert_eq!(pool.adjust_thread_count(None), 1);
        assert_eq!(pool.snapshot().thread_count, 1);
    }

    #[tokio::test]
    async fn test_shrink_limits_new_work() {
        let harness = Harness::new();
        let pool = WorkerPool::new(PoolConfig::default());
        pool.adjust_thread_count(Some(&NetworkInfo::wifi()));
        pool.adjust_thread_count(Some(&NetworkInfo::disconnected()));

        for _ in 0..4 {
            let mut job = harness.job("work", Priority::Normal);
            job.work = Duration::from_millis(10);
            pool.submit(Arc::new(job)).unwrap();
        }

        wait_until(|| pool.snapshot().completed == 4).await;
        assert_eq!(harness.max_running.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shrink_waits_for_running_jobs() {
        let harness = Harness::new();
        let pool = WorkerPool::new(config(2));

        let hold = Arc::new(AtomicBool::new(true));
        for name in ["busy-1", "busy-2"] {
            let mut job = harness.job(name, Priority::Normal);
            job.hold = Some(Arc::clone(&hold));
            pool.submit(Arc::new(job)).unwrap();
        }
        wait_until(|| pool.snapshot().active == 2).await;

        // Both permits are busy; the shrink is deferred, nothing is interrupted
        pool.set_thread_count(1);
        assert_eq!(pool.snapshot().active, 2);

        hold.store(false, Ordering::SeqCst);
        wait_until(|| pool.snapshot().completed == 2).await;

        harness.max_running.store(0, Ordering::SeqCst);
        for _ in 0..3 {
            let mut job = harness.job("after", Priority::Normal);
            job.work = Duration::from_millis(10);
            pool.submit(Arc::new(job)).unwrap();
        }
        wait_until(|| pool.snapshot().completed == 5).await;
        assert_eq!(harness.max_running.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_jobs() {
        let harness = Harness::new();
        let pool = WorkerPool::new(config(1));
        assert!(!pool.is_shutdown());

        pool.shutdown();
        pool.shutdown();

        assert!(pool.is_shutdown());
        let result = pool.submit(Arc::new(harness.job("late", Priority::High)));
        assert_eq!(result, Err(PoolError::Shutdown));
        assert!(pool.snapshot().is_shutdown);
    }
}
