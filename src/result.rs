use super::errors::{ParallelError, TaskError};

pub type SpawnResult<T> = Result<T, TaskError>;

pub type ParallelResult<T> = Result<T, ParallelError>;
