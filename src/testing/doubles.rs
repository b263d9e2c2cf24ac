//! Test doubles: failing functions, failing sources and call counters.
//!
//! All doubles are cheap clones over shared atomics, so one copy can move into
//! a stage closure while the test keeps another to inspect afterwards.

use crate::source::SourceAdapter;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Counts how often a stage function runs.
///
/// ```
/// use chainflow::*;
/// use chainflow::testing::CallCounter;
///
/// let counter = CallCounter::new();
/// let c = counter.clone();
/// let doubled = from_vec(vec![1, 2, 3]).map(move |x: &i32| {
///     c.hit();
///     x * 2
/// });
/// assert_eq!(counter.count(), 0);
/// doubled.collect().unwrap();
/// assert_eq!(counter.count(), 3);
/// ```
#[derive(Clone, Debug, Default)]
pub struct CallCounter {
    hits: Arc<AtomicUsize>,
}

impl CallCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hit(&self) {
        self.hits.fetch_add(1, Ordering::SeqCst);
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// A function that fails its first `n` calls, then passes values through.
#[derive(Clone, Debug)]
pub struct Flaky {
    failures: usize,
    calls: Arc<AtomicUsize>,
}

impl Flaky {
    #[must_use]
    pub fn failing_times(failures: usize) -> Self {
        Self {
            failures,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// # Errors
    ///
    /// While fewer than `failures` calls have been made.
    pub fn call<T>(&self, value: T) -> anyhow::Result<T> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            anyhow::bail!("flaky failure {call} of {}", self.failures);
        }
        Ok(value)
    }

    /// Calls made so far, failed or not.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Fail with `message` whenever `predicate` holds, otherwise pass `value` on.
///
/// # Errors
///
/// When `predicate(&value)` is true.
pub fn fail_when<T>(value: T, predicate: impl Fn(&T) -> bool, message: &str) -> anyhow::Result<T> {
    if predicate(&value) {
        anyhow::bail!("{message}");
    }
    Ok(value)
}

/// A source that can never be opened. Counts its open attempts.
#[derive(Clone, Debug)]
pub struct FailingSource {
    name: String,
    opens: CallCounter,
}

impl FailingSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            opens: CallCounter::new(),
        }
    }

    #[must_use]
    pub fn opens(&self) -> usize {
        self.opens.count()
    }
}

impl<T: Send + 'static> SourceAdapter<T> for FailingSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self) -> anyhow::Result<Box<dyn Iterator<Item = T> + Send>> {
        self.opens.hit();
        anyhow::bail!("connection to `{}` refused", self.name)
    }
}
