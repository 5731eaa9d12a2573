use super::errors::BadConfiguration;
use std::{env, sync::OnceLock, time::Duration};

pub const GLOBAL_THREADS_ENV: &str = "LATCHPOOL_GLOBAL_THREADS";

pub const DEFAULT_GLOBAL_THREADS: usize = 16;

/// Join bound used where a wait should never time out in practice.
pub const AWAIT_TIMEOUT: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// How often a cancellable wait wakes up to check its token.
pub const CANCEL_POLL: Duration = Duration::from_millis(10);

static CURRENT: OnceLock<Config> = OnceLock::new();

/// Process-level configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub global_threads: usize,
    pub default_concurrency: usize,
    pub await_timeout: Duration,
    pub cancel_poll: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            global_threads: DEFAULT_GLOBAL_THREADS,
            default_concurrency: default_concurrency(),
            await_timeout: AWAIT_TIMEOUT,
            cancel_poll: CANCEL_POLL,
        }
    }
}

impl Config {
    /// Reads `LATCHPOOL_GLOBAL_THREADS`, keeping defaults for everything
    /// the environment does not set.
    pub fn from_env() -> Result<Self, BadConfiguration> {
        let global_threads = match env::var(GLOBAL_THREADS_ENV) {
            Ok(value) => parse_threads(&value)?,
            Err(_) => DEFAULT_GLOBAL_THREADS,
        };

        Ok(Self {
            global_threads,
            ..Default::default()
        })
    }

    /// Like [`Config::from_env`], but logs and falls back to defaults on a
    /// bad value.
    pub fn from_env_or_default() -> Self {
        Self::from_env().unwrap_or_else(|e| {
            log::warn!("{e}; using {DEFAULT_GLOBAL_THREADS} global threads");
            Self::default()
        })
    }
}

/// Configuration shared by [`global`](crate::global::global) and
/// [`concurrent_default`](crate::concurrent::ConcurrentIterable::concurrent_default).
///
/// Read from the environment on first use and fixed afterwards.
pub fn current() -> &'static Config {
    CURRENT.get_or_init(Config::from_env_or_default)
}

fn parse_threads(value: &str) -> Result<usize, BadConfiguration> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(BadConfiguration {
            var: GLOBAL_THREADS_ENV,
        }),
    }
}

/// Degree used by `concurrent()`: twice the logical CPU count, since
/// traversal callbacks are often I/O-bound.
#[inline]
pub fn default_concurrency() -> usize {
    num_cpus::get() * 2
}
