use std::{error::Error, io};

use thiserror::Error;

/// Boxed error returned by fallible task callbacks.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Failure of a single unit of work.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The callback returned an error.
    #[error("task failed: {0}")]
    Failed(#[source] BoxError),

    /// The callback panicked; carries the panic message.
    #[error("task panicked: {0}")]
    Panic(String),

    #[error("failed to join task: {0}")]
    JoinFailed(String),

    #[error("task result channel closed")]
    ChannelClosed,

    #[error("timed out waiting for task")]
    Timeout,

    #[error("task was cancelled")]
    Cancelled,
}

impl TaskError {
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_owned()
        };
        Self::Panic(message)
    }

    #[inline]
    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panic(_))
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Failure surfaced at a join point.
#[derive(Debug, Error)]
pub enum ParallelError {
    /// At least one task failed. Only the first recorded failure is kept
    /// as the cause; `failures` counts all of them.
    #[error("one or more parallel tasks failed ({failures} in total)")]
    TaskFailed {
        failures: usize,
        #[source]
        cause: TaskError,
    },

    #[error("wait for parallel tasks was interrupted")]
    Interrupted,

    #[error("timed out waiting for parallel tasks")]
    TimedOut,

    #[error("invalid pool size {0}; must be at least 1")]
    InvalidPoolSize(usize),

    #[error("failed to spawn worker thread")]
    Spawn(#[from] io::Error),
}

impl ParallelError {
    /// The retained task failure, if this error came from one.
    pub fn task_error(&self) -> Option<&TaskError> {
        match self {
            Self::TaskFailed { cause, .. } => Some(cause),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Error)]
#[error("invalid value in {var}; must be a natural number")]
pub struct BadConfiguration {
    pub var: &'static str,
}
