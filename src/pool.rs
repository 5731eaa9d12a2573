use super::{
    config::Config,
    errors::{BoxError, ParallelError, TaskError},
    latch::{CompletionLatch, Countdown, WaitOutcome},
    model::ParallelizerMetrics,
    result::ParallelResult,
    worker::NamedWorkerFactory,
};
use std::{
    io,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
    thread,
    time::Duration,
};
use crossbeam::channel::{self, Sender};
use tokio_util::sync::CancellationToken;

type Job = Box<dyn FnOnce() + Send + 'static>;

static NEXT_ID: AtomicUsize = AtomicUsize::new(1);

/// Input marker for a [`Parallelizer`] that has no sequence bound yet.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbound;

/// Keeps the first recorded failure and counts the rest.
#[derive(Debug, Default)]
struct FailureSlot {
    first: Mutex<Option<TaskError>>,
    count: AtomicUsize,
}

impl FailureSlot {
    fn record(&self, error: TaskError) {
        let current = thread::current();
        log::error!(
            "parallel task failed on {}: {error}",
            current.name().unwrap_or("<unnamed>")
        );

        self.count.fetch_add(1, Ordering::SeqCst);
        let mut first = self.first.lock().unwrap_or_else(PoisonError::into_inner);
        if first.is_none() {
            *first = Some(error);
        }
    }

    fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    fn take(&self) -> Option<ParallelError> {
        let cause = self
            .first
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        Some(ParallelError::TaskFailed {
            failures: self.count.swap(0, Ordering::SeqCst),
            cause,
        })
    }
}

/// State shared between the submitting thread and the workers.
#[derive(Debug)]
struct Shared {
    latch: CompletionLatch,
    failures: FailureSlot,
    completed: AtomicUsize,
}

impl Shared {
    fn new(cancel_poll: Duration) -> Self {
        Self {
            latch: CompletionLatch::with_cancel_poll(0, cancel_poll),
            failures: FailureSlot::default(),
            completed: AtomicUsize::new(0),
        }
    }

    /// Runs one unit of work. Errors and panics are recorded, never
    /// propagated, so the worker survives.
    fn invoke<F>(&self, task: F)
    where
        F: FnOnce() -> Result<(), BoxError>,
    {
        match panic::catch_unwind(AssertUnwindSafe(task)) {
            Ok(Ok(())) => {
                self.completed.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => self.failures.record(TaskError::Failed(e)),
            Err(panic_info) => self.failures.record(TaskError::from_panic(panic_info)),
        }
    }
}

/// Long-lived workers backing [`Parallelizer::execute`].
struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<thread::JoinHandle<()>>,
    daemon: bool,
}

impl WorkerPool {
    fn start(size: usize, factory: &NamedWorkerFactory) -> io::Result<Self> {
        let (tx, rx) = channel::unbounded::<Job>();
        let mut workers = Vec::with_capacity(size);

        for _ in 0..size {
            let rx = rx.clone();
            workers.push(factory.spawn(move || {
                for job in rx {
                    job();
                }
            })?);
        }

        log::debug!("{} started {size} workers", factory.prefix());

        Ok(Self {
            sender: Some(tx),
            workers,
            daemon: factory.is_daemon(),
        })
    }

    fn submit(&self, job: Job) -> Result<(), Job> {
        match &self.sender {
            Some(tx) => tx.send(job).map_err(|e| e.into_inner()),
            None => Err(job),
        }
    }

    /// Stops accepting work. Queued jobs still drain; non-daemon workers
    /// are joined.
    fn shutdown(&mut self) {
        if self.sender.take().is_none() {
            return;
        }
        if self.daemon {
            self.workers.clear();
            return;
        }
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("parallelizer worker exited abnormally");
            }
        }
    }

    /// Stops accepting work without waiting for the workers.
    fn detach(&mut self) {
        self.sender.take();
        self.workers.clear();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Disposable worker pool that fans work out and joins on it.
///
/// A `Parallelizer` is used for one unit of work: either bind an input
/// with [`input`](Parallelizer::input) and call [`run`](Parallelizer::run),
/// or fire tasks with [`execute`](Parallelizer::execute) and finish with
/// [`await_all`](Parallelizer::await_all). Both consume it.
///
/// At most one failure is raised. It is the first one recorded; all
/// failures are logged and counted.
pub struct Parallelizer<I = Unbound> {
    size: usize,
    input: I,
    await_timeout: Duration,
    factory: NamedWorkerFactory,
    shared: Arc<Shared>,
    pool: Option<WorkerPool>,
}

impl Parallelizer<Unbound> {
    /// Parallelizer with `size` workers and default timeouts.
    pub fn new(size: usize) -> ParallelResult<Self> {
        Self::with_config(size, &Config::default())
    }

    /// Takes the join bound and the cancellation poll interval from
    /// `config`.
    pub fn with_config(size: usize, config: &Config) -> ParallelResult<Self> {
        if size == 0 {
            return Err(ParallelError::InvalidPoolSize(size));
        }

        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let tag = format!("parallelizer-{id}");

        Ok(Self {
            size,
            input: Unbound,
            await_timeout: config.await_timeout,
            factory: NamedWorkerFactory::new(Some(&tag), Some("worker")),
            shared: Arc::new(Shared::new(config.cancel_poll)),
            pool: None,
        })
    }

    /// Binds the sequence that [`run`](Parallelizer::run) iterates.
    pub fn input<S>(self, input: S) -> Parallelizer<S::IntoIter>
    where
        S: IntoIterator,
    {
        let Parallelizer {
            size,
            await_timeout,
            factory,
            shared,
            pool,
            ..
        } = self;

        Parallelizer {
            size,
            input: input.into_iter(),
            await_timeout,
            factory,
            shared,
            pool,
        }
    }
}

impl<I> Parallelizer<I> {
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Bound on [`await_all`](Parallelizer::await_all).
    pub fn await_timeout(mut self, timeout: Duration) -> Self {
        self.await_timeout = timeout;
        self
    }

    /// Detach workers on shutdown instead of joining them.
    pub fn daemon(mut self, daemon: bool) -> Self {
        self.factory = self.factory.clone().daemon(daemon);
        self
    }

    pub fn metrics(&self) -> ParallelizerMetrics {
        ParallelizerMetrics {
            pending: self.shared.latch.pending(),
            completed: self.shared.completed.load(Ordering::Relaxed),
            failed: self.shared.failures.count(),
        }
    }

    /// Submits `task` to this Parallelizer's own pool.
    ///
    /// The pool is started on first use. Failures are logged right away
    /// and surfaced by [`await_all`](Parallelizer::await_all).
    pub fn execute<F>(&mut self, task: F) -> ParallelResult<()>
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        let pool = match self.pool.take() {
            Some(pool) => pool,
            None => WorkerPool::start(self.size, &self.factory)?,
        };
        let pool = self.pool.insert(pool);

        let shared = self.shared.clone();
        shared.latch.increment();

        let job: Job = Box::new(move || {
            let _done = Countdown(&shared.latch);
            shared.invoke(task);
        });

        if pool.submit(job).is_err() {
            self.shared.latch.decrement();
            return Err(ParallelError::Spawn(io::Error::other(
                "parallelizer pool is shut down",
            )));
        }

        Ok(())
    }

    /// Stops accepting work, waits for every executed task and raises the
    /// retained failure, if any.
    pub fn await_all(self) -> ParallelResult<()> {
        let outcome = self.shared.latch.await_zero_timeout(self.await_timeout);
        self.finish(outcome)
    }

    /// Like [`await_all`](Parallelizer::await_all), but returns
    /// [`ParallelError::Interrupted`] once `token` is cancelled. Tasks
    /// already handed to the pool keep running in the background.
    pub fn await_cancellable(self, token: &CancellationToken) -> ParallelResult<()> {
        let outcome = self
            .shared
            .latch
            .await_zero_cancellable_timeout(token, self.await_timeout);
        self.finish(outcome)
    }

    fn finish(mut self, outcome: WaitOutcome) -> ParallelResult<()> {
        match outcome {
            WaitOutcome::Zero => {
                if let Some(mut pool) = self.pool.take() {
                    pool.shutdown();
                }
            }
            WaitOutcome::Cancelled => {
                if let Some(mut pool) = self.pool.take() {
                    pool.detach();
                }
                return Err(ParallelError::Interrupted);
            }
            WaitOutcome::TimedOut => {
                if let Some(mut pool) = self.pool.take() {
                    pool.detach();
                }
                return Err(ParallelError::TimedOut);
            }
        }

        match self.shared.failures.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl<I> Parallelizer<I>
where
    I: Iterator,
    I::Item: Send,
{
    /// Calls `callback` once per input element on up to `size` workers and
    /// blocks until every call has returned.
    ///
    /// Workers are scoped to this call, so `callback` and the elements may
    /// borrow from the caller. Calls run in no particular order.
    pub fn run<F>(self, callback: F) -> ParallelResult<()>
    where
        F: Fn(I::Item) -> Result<(), BoxError> + Sync,
    {
        let Parallelizer {
            size,
            input,
            factory,
            shared,
            mut pool,
            ..
        } = self;

        let latch = CompletionLatch::new(0);
        let latch = &latch;
        let callback = &callback;
        let state = &*shared;

        log::debug!("{} running with {size} workers", factory.prefix());

        thread::scope(|scope| -> ParallelResult<()> {
            let (tx, rx) = channel::bounded::<I::Item>(size);

            for _ in 0..size {
                let rx = rx.clone();
                factory.builder().spawn_scoped(scope, move || {
                    for item in rx {
                        let _done = Countdown(latch);
                        state.invoke(|| callback(item));
                    }
                })?;
            }
            drop(rx);

            // Count each element before it is handed over, so the latch
            // cannot reach zero while work is still in flight.
            for item in input {
                latch.increment();
                if tx.send(item).is_err() {
                    latch.decrement();
                    break;
                }
            }
            drop(tx);

            latch.await_zero();
            Ok(())
        })?;

        if let Some(pool) = pool.as_mut() {
            pool.shutdown();
        }

        match shared.failures.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
