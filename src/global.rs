//! Process-wide task pool for background and periodic work.
//!
//! The pool is a dedicated tokio runtime: one driver thread keeps timers
//! going while at most `threads` blocking workers run submitted closures.
//! It is never torn down; periodic tasks run until cancelled or until the
//! process exits.

use super::{
    config,
    errors::TaskError,
    handle::JoinHandle,
    model::PoolMetrics,
    result::SpawnResult,
    worker::NamedWorkerFactory,
};
use std::{
    io,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, OnceLock,
    },
};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::{
    runtime::{Builder, Runtime},
    time::{Duration, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

static GLOBAL: OnceLock<GlobalTaskPool> = OnceLock::new();

/// The process-wide pool, started on first use.
///
/// Its size comes from [`config::current`] and is fixed for the lifetime
/// of the process.
///
/// # Panics
///
/// Panics if the underlying runtime cannot be started.
pub fn global() -> &'static GlobalTaskPool {
    GLOBAL.get_or_init(|| {
        GlobalTaskPool::new(config::current().global_threads)
            .unwrap_or_else(|e| panic!("failed to start global task pool: {e}"))
    })
}

#[derive(Debug, Default)]
struct Counters {
    active: AtomicUsize,
    total_spawned: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    cancelled: AtomicUsize,
    scheduled: AtomicUsize,
}

impl Counters {
    fn started(&self) {
        self.total_spawned.fetch_add(1, Ordering::Relaxed);
    }

    fn finished<T>(&self, result: &SpawnResult<T>) {
        let counter = match result {
            Ok(_) => &self.completed,
            Err(TaskError::Cancelled) => &self.cancelled,
            Err(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Fixed-size pool for fire-and-forget, awaitable and fixed-rate tasks.
pub struct GlobalTaskPool {
    runtime: Runtime,
    threads: usize,
    counters: Arc<Counters>,
}

impl GlobalTaskPool {
    pub fn new(threads: usize) -> io::Result<Self> {
        let threads = threads.max(1);
        let factory = NamedWorkerFactory::new(Some("latchpool"), Some("global")).daemon(true);
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(threads)
            .thread_name_fn(factory.name_fn())
            .enable_time()
            .build()?;

        log::debug!("global task pool started with {threads} threads");

        Ok(Self {
            runtime,
            threads,
            counters: Arc::new(Counters::default()),
        })
    }

    #[inline]
    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            threads: self.threads,
            active_tasks: self.counters.active.load(Ordering::Relaxed),
            total_spawned: self.counters.total_spawned.load(Ordering::Relaxed),
            completed_tasks: self.counters.completed.load(Ordering::Relaxed),
            failed_tasks: self.counters.failed.load(Ordering::Relaxed),
            cancelled_tasks: self.counters.cancelled.load(Ordering::Relaxed),
            scheduled_tasks: self.counters.scheduled.load(Ordering::Relaxed),
        }
    }

    /// Runs `task` in the background. A panic is logged and swallowed.
    pub fn run<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = self.submit(task);
        self.runtime.spawn(async move {
            if let Err(e) = handle.await {
                log::error!("background task failed: {e}");
            }
        });
    }

    /// Runs `task` in the background and hands back a handle to its result.
    pub fn submit<T, F>(&self, task: F) -> JoinHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = tokio::sync::oneshot::channel::<SpawnResult<T>>();
        let cancel_token = CancellationToken::new();
        let ct = cancel_token.clone();
        let counters = self.counters.clone();

        counters.started();

        self.runtime.spawn(async move {
            let worker_counters = counters.clone();
            let worker_token = ct.clone();
            // A task cancelled while still queued never starts.
            let worker = tokio::task::spawn_blocking(move || {
                if worker_token.is_cancelled() {
                    return None;
                }
                worker_counters.active.fetch_add(1, Ordering::Relaxed);
                let out = panic::catch_unwind(AssertUnwindSafe(task));
                worker_counters.active.fetch_sub(1, Ordering::Relaxed);
                Some(out)
            });

            let result: SpawnResult<T> = tokio::select! {
                biased;
                _ = ct.cancelled() => Err(TaskError::Cancelled),
                val = worker => {
                    match val {
                        Ok(Some(Ok(v))) => Ok(v),
                        Ok(Some(Err(panic_info))) => Err(TaskError::from_panic(panic_info)),
                        Ok(None) => Err(TaskError::Cancelled),
                        Err(join_err) => Err(TaskError::JoinFailed(join_err.to_string())),
                    }
                }
            };

            counters.finished(&result);
            let _ = tx.send(result);
        });

        JoinHandle::new(cancel_token, rx, self.runtime.handle().clone())
    }

    /// Starts a fixed-rate schedule with the given period.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    pub fn every(&self, interval: Duration) -> ScheduleBuilder<'_> {
        assert!(!interval.is_zero(), "schedule period must be non-zero");
        ScheduleBuilder {
            pool: self,
            period: interval,
            delay: Duration::ZERO,
        }
    }

    /// Waits for every handle, yielding results in completion order.
    pub async fn join_all<T>(handles: Vec<JoinHandle<T>>) -> Vec<SpawnResult<T>>
    where
        T: Send + 'static,
    {
        if handles.is_empty() {
            return Vec::new();
        }

        let len = handles.len();
        let mut futures = FuturesUnordered::from_iter(handles);
        let mut results = Vec::with_capacity(len);

        while let Some(result) = futures.next().await {
            results.push(result);
        }

        results
    }

    /// Blocking form of [`GlobalTaskPool::join_all`].
    pub fn join_all_blocking<T>(&self, handles: Vec<JoinHandle<T>>) -> Vec<SpawnResult<T>>
    where
        T: Send + 'static,
    {
        self.runtime.block_on(Self::join_all(handles))
    }
}

/// Builder returned by [`GlobalTaskPool::every`].
#[must_use = "a schedule does nothing until `run` is called"]
pub struct ScheduleBuilder<'a> {
    pool: &'a GlobalTaskPool,
    period: Duration,
    delay: Duration,
}

impl ScheduleBuilder<'_> {
    /// Initial delay before the first execution.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Runs `task` at a fixed rate until the returned token is cancelled.
    ///
    /// Ticks missed while an execution overran are fired back-to-back.
    /// A panicking execution is logged and the schedule keeps going.
    pub fn run<F>(self, task: F) -> CancellationToken
    where
        F: Fn() + Send + Sync + 'static,
    {
        let token = CancellationToken::new();
        let token_clone = token.clone();
        let task = Arc::new(task);
        let counters = self.pool.counters.clone();
        let period = self.period;
        let start = Instant::now() + self.delay;

        counters.scheduled.fetch_add(1, Ordering::Relaxed);

        self.pool.runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

            loop {
                tokio::select! {
                    _ = token_clone.cancelled() => break,
                    _ = ticker.tick() => {
                        let task = Arc::clone(&task);
                        let worker_counters = counters.clone();
                        counters.started();
                        let outcome = tokio::task::spawn_blocking(move || {
                            worker_counters.active.fetch_add(1, Ordering::Relaxed);
                            let out = panic::catch_unwind(AssertUnwindSafe(|| task()));
                            worker_counters.active.fetch_sub(1, Ordering::Relaxed);
                            out
                        }).await;

                        let result: SpawnResult<()> = match outcome {
                            Ok(Ok(())) => Ok(()),
                            Ok(Err(panic_info)) => Err(TaskError::from_panic(panic_info)),
                            Err(join_err) => Err(TaskError::JoinFailed(join_err.to_string())),
                        };
                        if let Err(e) = &result {
                            log::error!("scheduled task failed: {e}");
                        }
                        counters.finished(&result);
                    }
                }
            }

            counters.scheduled.fetch_sub(1, Ordering::Relaxed);
            log::debug!("periodic schedule stopped");
        });

        token
    }
}
