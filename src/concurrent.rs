//! Opt-in parallel traversal for collections.
//!
//! `items.concurrent(4).map(f)` runs the very same traversal as
//! `items.iter().map(f)`, but through a [`Parallelizer`]. The degree lives
//! on the returned [`Concurrent`] view and is gone after that one call, so
//! the collection itself never carries a parallelism flag.
//!
//! Collecting operations on the parallel path append from several workers
//! at once; their output order is unspecified. The sequential path keeps
//! input order.

use super::{
    config,
    errors::{BoxError, ParallelError, TaskError},
    pool::Parallelizer,
    result::ParallelResult,
};
use std::{
    collections::HashMap,
    hash::Hash,
    ops::{Deref, DerefMut},
    sync::{Mutex, PoisonError},
};

/// Collections that can hand out a one-shot parallel view of themselves.
pub trait ConcurrentIterable {
    type Item;

    fn as_items(&self) -> &[Self::Item];

    /// Runs the next chained traversal on up to `n` workers.
    /// `0` is treated as `1`.
    fn concurrent(&self, n: usize) -> Concurrent<'_, Self::Item> {
        Concurrent::new(self.as_items(), n)
    }

    /// Uses the process-wide `default_concurrency`, twice the number of
    /// logical CPUs unless configured otherwise.
    fn concurrent_default(&self) -> Concurrent<'_, Self::Item> {
        self.concurrent(config::current().default_concurrency)
    }

    /// One worker per element.
    fn concurrent_all(&self) -> Concurrent<'_, Self::Item> {
        let items = self.as_items();
        Concurrent::new(items, items.len())
    }
}

impl<T> ConcurrentIterable for [T] {
    type Item = T;

    #[inline]
    fn as_items(&self) -> &[T] {
        self
    }
}

impl<T> ConcurrentIterable for Vec<T> {
    type Item = T;

    #[inline]
    fn as_items(&self) -> &[T] {
        self
    }
}

impl<T> ConcurrentIterable for Seq<T> {
    type Item = T;

    #[inline]
    fn as_items(&self) -> &[T] {
        &self.0
    }
}

/// View over a collection that carries the degree of parallelism for
/// exactly one traversal.
#[derive(Debug)]
#[must_use = "a concurrent view does nothing until traversed"]
pub struct Concurrent<'a, T> {
    items: &'a [T],
    degree: usize,
}

impl<'a, T> Concurrent<'a, T> {
    fn new(items: &'a [T], degree: usize) -> Self {
        Self {
            items,
            degree: degree.max(1),
        }
    }

    #[inline]
    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Number of workers the traversal will actually use.
    #[inline]
    pub fn workers(&self) -> usize {
        self.degree.min(self.items.len()).max(1)
    }

    #[inline]
    fn is_parallel(&self) -> bool {
        self.workers() > 1
    }
}

impl<'a, T: Sync> Concurrent<'a, T> {
    /// Calls `f` for every element. Errors stop the sequential path at
    /// the first failure; the parallel path visits every element and
    /// raises one failure at the end.
    pub fn try_for_each<F>(self, f: F) -> ParallelResult<()>
    where
        F: Fn(&'a T) -> Result<(), BoxError> + Sync,
    {
        if !self.is_parallel() {
            for item in self.items {
                f(item).map_err(|e| ParallelError::TaskFailed {
                    failures: 1,
                    cause: TaskError::Failed(e),
                })?;
            }
            return Ok(());
        }

        Parallelizer::with_config(self.workers(), config::current())?
            .input(self.items.iter())
            .run(f)
    }

    /// Calls `f` for every element. A panic in `f` on the parallel path is
    /// caught and raised as a [`ParallelError::TaskFailed`].
    pub fn for_each<F>(self, f: F) -> ParallelResult<()>
    where
        F: Fn(&'a T) + Sync,
    {
        self.try_for_each(|item| {
            f(item);
            Ok(())
        })
    }

    pub fn try_map<U, F>(self, f: F) -> ParallelResult<Vec<U>>
    where
        U: Send,
        F: Fn(&'a T) -> Result<U, BoxError> + Sync,
    {
        let out = Mutex::new(Vec::with_capacity(self.items.len()));
        self.try_for_each(|item| {
            let value = f(item)?;
            out.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(value);
            Ok(())
        })?;
        Ok(out.into_inner().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn map<U, F>(self, f: F) -> ParallelResult<Vec<U>>
    where
        U: Send,
        F: Fn(&'a T) -> U + Sync,
    {
        self.try_map(|item| Ok(f(item)))
    }

    pub fn filter<P>(self, predicate: P) -> ParallelResult<Vec<&'a T>>
    where
        P: Fn(&T) -> bool + Sync,
    {
        let out = Mutex::new(Vec::new());
        self.for_each(|item| {
            if predicate(item) {
                out.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(item);
            }
        })?;
        Ok(out.into_inner().unwrap_or_else(PoisonError::into_inner))
    }

    /// Builds a map from `f`'s pairs. Later pairs overwrite earlier ones
    /// with the same key; on the parallel path "later" is unspecified.
    pub fn to_map<K, V, F>(self, f: F) -> ParallelResult<HashMap<K, V>>
    where
        K: Eq + Hash + Send,
        V: Send,
        F: Fn(&'a T) -> (K, V) + Sync,
    {
        let out = Mutex::new(HashMap::with_capacity(self.items.len()));
        self.for_each(|item| {
            let (key, value) = f(item);
            out.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(key, value);
        })?;
        Ok(out.into_inner().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Ordered collection wrapper.
///
/// Its own traversals are sequential and keep input order; call
/// [`ConcurrentIterable::concurrent`] for a parallel one. Equality and
/// hashing depend on the elements only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Seq<T>(Vec<T>);

impl<T> Seq<T> {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn into_inner(self) -> Vec<T> {
        self.0
    }

    pub fn for_each<F>(&self, f: F)
    where
        F: FnMut(&T),
    {
        self.0.iter().for_each(f);
    }

    pub fn map<U, F>(&self, f: F) -> Seq<U>
    where
        F: FnMut(&T) -> U,
    {
        Seq(self.0.iter().map(f).collect())
    }

    pub fn filter<P>(&self, mut predicate: P) -> Seq<&T>
    where
        P: FnMut(&T) -> bool,
    {
        Seq(self.0.iter().filter(|item| predicate(item)).collect())
    }

    pub fn to_map<K, V, F>(&self, f: F) -> HashMap<K, V>
    where
        K: Eq + Hash,
        F: FnMut(&T) -> (K, V),
    {
        self.0.iter().map(f).collect()
    }
}

impl<T> Deref for Seq<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.0
    }
}

impl<T> DerefMut for Seq<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.0
    }
}

impl<T> From<Vec<T>> for Seq<T> {
    fn from(items: Vec<T>) -> Self {
        Self(items)
    }
}

impl<T> FromIterator<T> for Seq<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<T> IntoIterator for Seq<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a Seq<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
