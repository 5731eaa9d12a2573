use std::{
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};
use tokio_util::sync::CancellationToken;

use super::config::CANCEL_POLL;

/// How a wait on a [`CompletionLatch`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Zero,
    Cancelled,
    TimedOut,
}

/// Counting barrier that releases waiters when its count drops to zero.
///
/// Every `increment` must be balanced by exactly one `decrement`.
/// Counts are cumulative, so unrelated batches need separate latches.
#[derive(Debug)]
pub struct CompletionLatch {
    pending: Mutex<usize>,
    zero: Condvar,
    cancel_poll: Duration,
}

impl Default for CompletionLatch {
    fn default() -> Self {
        Self::new(0)
    }
}

impl CompletionLatch {
    pub fn new(initial: usize) -> Self {
        Self::with_cancel_poll(initial, CANCEL_POLL)
    }

    /// Latch whose cancellable waits check their token every `poll`.
    /// A zero `poll` is raised to one millisecond.
    pub fn with_cancel_poll(initial: usize, poll: Duration) -> Self {
        Self {
            pending: Mutex::new(initial),
            zero: Condvar::new(),
            cancel_poll: poll.max(Duration::from_millis(1)),
        }
    }

    #[inline]
    pub fn cancel_poll(&self) -> Duration {
        self.cancel_poll
    }

    // No user code runs under this lock, so a poisoned guard is still sound.
    #[inline]
    fn lock(&self) -> MutexGuard<'_, usize> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    pub fn pending(&self) -> usize {
        *self.lock()
    }

    #[inline]
    pub fn increment(&self) {
        *self.lock() += 1;
    }

    /// # Panics
    ///
    /// Panics if the count is already zero.
    pub fn decrement(&self) {
        let mut pending = self.lock();
        assert!(*pending > 0, "CompletionLatch decremented below zero");
        *pending -= 1;
        if *pending == 0 {
            self.zero.notify_all();
        }
    }

    /// Blocks until the count is zero.
    pub fn await_zero(&self) {
        let mut pending = self.lock();
        while *pending > 0 {
            pending = self
                .zero
                .wait(pending)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Blocks until the count is zero or `timeout` elapses.
    pub fn await_zero_timeout(&self, timeout: Duration) -> WaitOutcome {
        let deadline = Instant::now().checked_add(timeout);
        let mut pending = self.lock();
        while *pending > 0 {
            let remaining = match deadline {
                Some(d) => match d.checked_duration_since(Instant::now()) {
                    Some(r) if !r.is_zero() => r,
                    _ => return WaitOutcome::TimedOut,
                },
                None => {
                    pending = self
                        .zero
                        .wait(pending)
                        .unwrap_or_else(PoisonError::into_inner);
                    continue;
                }
            };
            pending = self
                .zero
                .wait_timeout(pending, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        WaitOutcome::Zero
    }

    /// Blocks until the count is zero or `token` is cancelled.
    ///
    /// A cancelled wait is a normal return, not an error. Work still
    /// counted by the latch keeps running.
    pub fn await_zero_cancellable(&self, token: &CancellationToken) -> WaitOutcome {
        self.await_zero_cancellable_timeout(token, Duration::MAX)
    }

    /// Blocks until the count is zero, `token` is cancelled or `timeout`
    /// elapses.
    ///
    /// A decrement to zero wakes the waiter at once. Cancellation is not
    /// signalled through the condvar, so the waiter also wakes every
    /// [`cancel_poll`](CompletionLatch::cancel_poll) to check the token; it
    /// is otherwise parked and idle.
    pub fn await_zero_cancellable_timeout(
        &self,
        token: &CancellationToken,
        timeout: Duration,
    ) -> WaitOutcome {
        let deadline = Instant::now().checked_add(timeout);
        let mut pending = self.lock();
        while *pending > 0 {
            if token.is_cancelled() {
                return WaitOutcome::Cancelled;
            }
            let mut slice = self.cancel_poll;
            if let Some(d) = deadline {
                match d.checked_duration_since(Instant::now()) {
                    Some(r) if !r.is_zero() => slice = slice.min(r),
                    _ => return WaitOutcome::TimedOut,
                }
            }
            pending = self
                .zero
                .wait_timeout(pending, slice)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        WaitOutcome::Zero
    }
}

/// Decrements the latch when dropped, so the count is released on every
/// exit path of a task.
pub(crate) struct Countdown<'a>(pub(crate) &'a CompletionLatch);

impl Drop for Countdown<'_> {
    fn drop(&mut self) {
        self.0.decrement();
    }
}
