//! Source adapters: where a chain's records come from.
//!
//! A source only has to produce a finite, ordered sequence of records on
//! demand. Database clients, file readers and the like live outside this crate
//! and plug in by implementing [`SourceAdapter`] or by handing a closure to
//! [`from_fn`](crate::from_fn).
//!
//! Sources are re-opened for every execution that misses the cache, so every
//! handle derived from a source can be collected independently.

use std::sync::Arc;

pub trait SourceAdapter<T>: Send + Sync + 'static {
    /// Name used in logs and in [`StreamError::Source`](crate::StreamError::Source).
    fn name(&self) -> &str {
        "source"
    }

    /// Produce the records, in order.
    ///
    /// # Errors
    ///
    /// Any failure to reach or read the underlying data.
    fn open(&self) -> anyhow::Result<Box<dyn Iterator<Item = T> + Send>>;
}

/// An in-memory source, cloned on every open.
pub struct VecSource<T> {
    data: Arc<Vec<T>>,
}

impl<T> VecSource<T> {
    pub fn new(data: Vec<T>) -> Self {
        Self {
            data: Arc::new(data),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<T> SourceAdapter<T> for VecSource<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        "vec"
    }

    fn open(&self) -> anyhow::Result<Box<dyn Iterator<Item = T> + Send>> {
        Ok(Box::new((*self.data).clone().into_iter()))
    }
}

/// A source backed by a fallible closure, e.g. one that runs a query and
/// returns its rows.
pub struct FnSource<F> {
    name: String,
    f: F,
}

impl<F> FnSource<F> {
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<T, F> SourceAdapter<T> for FnSource<F>
where
    T: Send + 'static,
    F: Fn() -> anyhow::Result<Vec<T>> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self) -> anyhow::Result<Box<dyn Iterator<Item = T> + Send>> {
        Ok(Box::new((self.f)()?.into_iter()))
    }
}
