//! Concurrency coordination primitives
//!
//! # Features
//! - `CompletionLatch`: counting barrier released when its count hits zero
//! - `Parallelizer`: disposable fan-out/join worker pool with failure capture
//! - `GlobalTaskPool`: process-wide pool for background and fixed-rate tasks
//! - `ConcurrentIterable`: one-shot parallel traversal over collections
//! - `NamedWorkerFactory`: uniquely named worker threads

pub mod concurrent;
pub mod config;
pub mod errors;
pub mod global;
pub mod handle;
pub mod latch;
pub mod model;
pub mod pool;
pub mod result;
pub mod worker;

pub use concurrent::{Concurrent, ConcurrentIterable, Seq};
pub use config::Config;
pub use errors::{BoxError, ParallelError, TaskError};
pub use global::{global, GlobalTaskPool, ScheduleBuilder};
pub use handle::JoinHandle;
pub use latch::{CompletionLatch, WaitOutcome};
pub use pool::Parallelizer;
pub use result::{ParallelResult, SpawnResult};
pub use worker::NamedWorkerFactory;
