use std::{
    io,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
};

const DEFAULT_NAME: &str = "worker";

/// Produces uniquely named worker threads: `<tag>-<suffix>-<n>`.
///
/// Numbering starts at 1 and is never reused, even after threads exit.
/// Clones share the counter.
#[derive(Debug, Clone)]
pub struct NamedWorkerFactory {
    prefix: Arc<str>,
    next: Arc<AtomicUsize>,
    daemon: bool,
    stack_size: Option<usize>,
}

impl NamedWorkerFactory {
    pub fn new(tag: Option<&str>, suffix: Option<&str>) -> Self {
        let parts: Vec<&str> = [tag, suffix]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect();
        let prefix = if parts.is_empty() {
            DEFAULT_NAME.to_owned()
        } else {
            parts.join("-")
        };

        Self {
            prefix: prefix.into(),
            next: Arc::new(AtomicUsize::new(1)),
            daemon: false,
            stack_size: None,
        }
    }

    /// Daemon workers are detached on shutdown instead of joined, so they
    /// never hold the owner (or the process) open.
    pub fn daemon(mut self, daemon: bool) -> Self {
        self.daemon = daemon;
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }

    #[inline]
    pub fn is_daemon(&self) -> bool {
        self.daemon
    }

    #[inline]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn next_name(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.prefix, n)
    }

    /// A thread builder carrying the next name.
    pub fn builder(&self) -> thread::Builder {
        let builder = thread::Builder::new().name(self.next_name());
        match self.stack_size {
            Some(size) => builder.stack_size(size),
            None => builder,
        }
    }

    pub fn spawn<F, T>(&self, f: F) -> io::Result<thread::JoinHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.builder().spawn(f)
    }

    /// Naming callback for runtimes that create their own threads.
    pub fn name_fn(&self) -> impl Fn() -> String + Send + Sync + 'static {
        let this = self.clone();
        move || this.next_name()
    }
}
