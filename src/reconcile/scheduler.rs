//! Bounded task pools for the discovery and repair stages.
//!
//! Each pool caps how many of its tasks run at once, applies a per-task
//! timeout and keeps one failing or panicking task from affecting the
//! others. Pools are owned values; nothing here is process-global.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{error, warn, Instrument, Span};

use crate::config::SchedulerConfig;

#[derive(Debug, Clone)]
pub struct TaskPool {
    name: &'static str,
    semaphore: Arc<Semaphore>,
    tracker: TaskTracker,
    task_timeout: Duration,
}

impl TaskPool {
    pub fn new(name: &'static str, concurrency: usize, task_timeout: Duration) -> Self {
        Self {
            name,
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            tracker: TaskTracker::new(),
            task_timeout,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Tasks submitted and not yet finished, queued ones included.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Queues `task`. It starts once a slot is free and is abandoned if it
    /// outlives the pool's task timeout.
    pub fn spawn<F>(&self, span: Span, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = self.name;
        let semaphore = self.semaphore.clone();
        let task_timeout = self.task_timeout;
        let inner_span = span.clone();

        self.tracker.spawn(
            async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        warn!(pool = name, "pool closed before task could start");
                        return;
                    }
                };

                let work = tokio::spawn(
                    tokio::time::timeout(task_timeout, task).instrument(inner_span),
                );
                match work.await {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) => warn!(
                        pool = name,
                        timeout_secs = task_timeout.as_secs(),
                        "task exceeded its timeout and was cancelled"
                    ),
                    Err(e) if e.is_panic() => error!(pool = name, "task panicked"),
                    Err(e) => warn!(pool = name, error = %e, "task did not complete"),
                }
            }
            .instrument(span),
        );
    }

    /// Waits for every task submitted so far, then accepts new ones again.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

/// The two stages of reconciliation: probing pull requests and repairing
/// the ones that need it.
#[derive(Debug, Clone)]
pub struct Scheduler {
    discovery: TaskPool,
    repair: TaskPool,
}

impl Scheduler {
    pub fn new(discovery: TaskPool, repair: TaskPool) -> Self {
        Self { discovery, repair }
    }

    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(
            TaskPool::new("discovery", config.discovery_concurrency, config.task_timeout()),
            TaskPool::new("repair", config.repair_concurrency, config.task_timeout()),
        )
    }

    pub fn discovery(&self) -> &TaskPool {
        &self.discovery
    }

    pub fn repair(&self) -> &TaskPool {
        &self.repair
    }

    /// Waits until both stages are idle. Discovery goes first because its
    /// tasks feed the repair pool.
    pub async fn drain(&self) {
        self.discovery.drain().await;
        self.repair.drain().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Gauge {
        current: AtomicUsize,
        peak: AtomicUsize,
        finished: AtomicUsize,
    }

    impl Gauge {
        fn enter(&self) {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
        }

        fn exit(&self) {
            self.current.fetch_sub(1, Ordering::SeqCst);
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_pool_never_exceeds_concurrency() {
        let pool = TaskPool::new("test", 3, Duration::from_secs(10));
        let gauge = Arc::new(Gauge::default());

        for _ in 0..12 {
            let gauge = gauge.clone();
            pool.spawn(Span::none(), async move {
                gauge.enter();
                tokio::time::sleep(Duration::from_millis(10)).await;
                gauge.exit();
            });
        }
        pool.drain().await;

        assert_eq!(gauge.finished.load(Ordering::SeqCst), 12);
        assert_eq!(gauge.peak.load(Ordering::SeqCst), 3);
        assert_eq!(pool.pending(), 0);
    }

    #[tokio::test]
    async fn test_panicking_task_does_not_affect_siblings() {
        let pool = TaskPool::new("test", 1, Duration::from_secs(10));
        let gauge = Arc::new(Gauge::default());

        pool.spawn(Span::none(), async { panic!("boom") });
        for _ in 0..2 {
            let gauge = gauge.clone();
            pool.spawn(Span::none(), async move {
                gauge.enter();
                gauge.exit();
            });
        }
        pool.drain().await;

        assert_eq!(gauge.finished.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_task_frees_its_slot() {
        let pool = TaskPool::new("test", 1, Duration::from_secs(1));
        let gauge = Arc::new(Gauge::default());

        pool.spawn(Span::none(), async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        let after = gauge.clone();
        pool.spawn(Span::none(), async move {
            after.enter();
            after.exit();
        });
        pool.drain().await;

        assert_eq!(gauge.finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drain_reopens_pool() {
        let pool = TaskPool::new("test", 2, Duration::from_secs(10));
        let gauge = Arc::new(Gauge::default());

        for round in 0..2 {
            let task_gauge = gauge.clone();
            pool.spawn(Span::none(), async move {
                task_gauge.enter();
                task_gauge.exit();
            });
            pool.drain().await;
            assert_eq!(gauge.finished.load(Ordering::SeqCst), round + 1);
        }
    }

    #[test]
    fn test_scheduler_from_config_names_pools() {
        let scheduler = Scheduler::from_config(&SchedulerConfig::default());
        assert_eq!(scheduler.discovery().name(), "discovery");
        assert_eq!(scheduler.repair().name(), "repair");
    }
}
