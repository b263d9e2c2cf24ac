//! Execution statistics shared by every handle derived from one source.
//!
//! [`ExecutionStats`] is a cheap-to-clone handle over atomic counters. The
//! engines bump the counters as a side effect of running stages; nothing in the
//! crate reads them to make decisions.
//!
//! # Example
//!
//! ```no_run
//! use chainflow::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let squares = from_vec(vec![1, 2, 3, 4, 5, 6])
//!     .parallel(ParallelConfig::new().chunk_size(2))?
//!     .map(|x: &i32| x * x);
//! squares.collect()?;
//!
//! let stats = squares.stats().snapshot();
//! assert_eq!(stats.processed_items, 6);
//!
//! // With the `metrics` feature:
//! squares.stats().print();
//! squares.stats().save_to_file("stats.json")?;
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Clone, Default)]
pub struct ExecutionStats {
    inner: Arc<StatsInner>,
}

#[derive(Default)]
struct StatsInner {
    processed_items: AtomicU64,
    failed_items: AtomicU64,
    error_count: AtomicU64,
    execution_nanos: AtomicU64,
}

/// A point-in-time copy of [`ExecutionStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub processed_items: u64,
    pub failed_items: u64,
    pub error_count: u64,
    pub execution_time: Duration,
}

impl ExecutionStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_processed(&self, n: usize) {
        self.inner
            .processed_items
            .fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Set `processed_items` to `n` unless it is already higher.
    pub(crate) fn raise_processed_to(&self, n: usize) {
        self.inner
            .processed_items
            .fetch_max(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn add_failed(&self, n: usize) {
        self.inner.failed_items.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.inner.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_execution_time(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.inner
            .execution_nanos
            .fetch_add(nanos, Ordering::Relaxed);
    }

    #[must_use]
    pub fn processed_items(&self) -> u64 {
        self.inner.processed_items.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn failed_items(&self) -> u64 {
        self.inner.failed_items.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn error_count(&self) -> u64 {
        self.inner.error_count.load(Ordering::Relaxed)
    }

    /// Total wall time spent inside terminal calls that actually executed.
    #[must_use]
    pub fn execution_time(&self) -> Duration {
        Duration::from_nanos(self.inner.execution_nanos.load(Ordering::Relaxed))
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            processed_items: self.processed_items(),
            failed_items: self.failed_items(),
            error_count: self.error_count(),
            execution_time: self.execution_time(),
        }
    }

    /// `true` when both handles count into the same counters.
    #[must_use]
    pub fn shares_with(&self, other: &ExecutionStats) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(feature = "metrics")]
impl ExecutionStats {
    /// All counters as a JSON object; execution time in milliseconds.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let s = self.snapshot();
        serde_json::json!({
            "processed_items": s.processed_items,
            "failed_items": s.failed_items,
            "error_count": s.error_count,
            "execution_time_ms": s.execution_time.as_millis(),
        })
    }

    /// Print the counters to stdout in a human-readable format.
    pub fn print(&self) {
        let s = self.snapshot();
        println!("\n========== Execution Stats ==========");
        println!(
            "Execution Time: {:.3}s ({} ms)",
            s.execution_time.as_secs_f64(),
            s.execution_time.as_millis()
        );
        println!("-------------------------------------");
        println!("processed_items: {}", s.processed_items);
        println!("failed_items: {}", s.failed_items);
        println!("error_count: {}", s.error_count);
        println!("=====================================\n");
    }

    /// Write [`to_json`](Self::to_json) to `path`, pretty-printed.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be created or written.
    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> anyhow::Result<()> {
        let formatted = serde_json::to_string_pretty(&self.to_json())?;
        std::fs::write(path, formatted)?;
        Ok(())
    }
}
