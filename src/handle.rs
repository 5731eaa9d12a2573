use super::{
    errors::TaskError,
    result::SpawnResult,
};
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::{
    runtime::Handle,
    sync::oneshot,
    time::Duration,
};
use tokio_util::sync::CancellationToken;

/// Handle to a task submitted to a [`GlobalTaskPool`](crate::global::GlobalTaskPool).
///
/// Can be joined from a plain thread with [`JoinHandle::join`] or awaited
/// from async code.
pub struct JoinHandle<T> {
    cancel_token: CancellationToken,
    receiver: oneshot::Receiver<SpawnResult<T>>,
    runtime: Handle,
}

impl<T> JoinHandle<T> {
    pub(crate) fn new(
        cancel_token: CancellationToken,
        receiver: oneshot::Receiver<SpawnResult<T>>,
        runtime: Handle,
    ) -> Self {
        Self {
            cancel_token,
            receiver,
            runtime,
        }
    }

    /// Stops the task if it has not started yet. A running task finishes,
    /// but the handle resolves to [`TaskError::Cancelled`].
    #[inline]
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Blocks the current thread until the task finishes.
    ///
    /// # Panics
    ///
    /// Panics when called from inside an async context.
    pub fn join(self) -> SpawnResult<T> {
        self.receiver.blocking_recv().unwrap_or(Err(TaskError::ChannelClosed))
    }

    /// Like [`JoinHandle::join`], giving up after `timeout`.
    ///
    /// # Panics
    ///
    /// Panics when called from inside an async context.
    pub fn join_timeout(self, timeout: Duration) -> SpawnResult<T> {
        let receiver = self.receiver;
        self.runtime.block_on(async move {
            match tokio::time::timeout(timeout, receiver).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(TaskError::ChannelClosed),
                Err(_) => Err(TaskError::Timeout),
            }
        })
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = SpawnResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(res) => Poll::Ready(res.unwrap_or(Err(TaskError::ChannelClosed))),
            Poll::Pending => Poll::Pending,
        }
    }
}
