//! Configuration for parallel execution.
//!
//! [`ParallelConfig`] is the only knob surface the engines read. It is built
//! with chained setters (or deserialized, missing fields take their defaults)
//! and validated when a stream switches to parallel mode, so a bad value is
//! reported at build time instead of at execution time.
//!
//! ```
//! use chainflow::ParallelConfig;
//! use std::time::Duration;
//!
//! let config = ParallelConfig::new()
//!     .num_workers(4)
//!     .chunk_size(500)
//!     .timeout(Duration::from_secs(10))
//!     .retry_count(1);
//! assert!(config.validate().is_ok());
//! ```

use crate::error::{Result, StreamError};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_NUM_WORKERS: usize = 1;
pub const DEFAULT_RETRY_COUNT: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// How a parallel reduce combines the per-chunk results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReduceMode {
    /// Combine in chunk order. Deterministic whenever `f` is associative.
    Ordered,
    /// Combine in completion order. Deterministic only if `f` is also
    /// commutative.
    #[default]
    Unordered,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    pub chunk_size: usize,
    pub num_workers: usize,
    pub timeout: Option<Duration>,
    pub retry_count: u32,
    pub retry_delay: Duration,
    pub reduce_mode: ReduceMode,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            num_workers: DEFAULT_NUM_WORKERS,
            timeout: None,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_delay: DEFAULT_RETRY_DELAY,
            reduce_mode: ReduceMode::default(),
        }
    }
}

impl ParallelConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults, with one worker per logical CPU.
    #[must_use]
    pub fn auto() -> Self {
        Self::default().num_workers(num_cpus::get().max(1))
    }

    #[must_use]
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    #[must_use]
    pub fn num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    #[must_use]
    pub fn retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    #[must_use]
    pub fn reduce_mode(mut self, reduce_mode: ReduceMode) -> Self {
        self.reduce_mode = reduce_mode;
        self
    }

    /// # Errors
    ///
    /// [`StreamError::InvalidConfig`] for a zero `chunk_size`, zero
    /// `num_workers`, or a zero `timeout`.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(StreamError::invalid_config("chunk_size", "must be at least 1"));
        }
        if self.num_workers == 0 {
            return Err(StreamError::invalid_config("num_workers", "must be at least 1"));
        }
        if self.timeout == Some(Duration::ZERO) {
            return Err(StreamError::invalid_config("timeout", "must be greater than zero"));
        }
        Ok(())
    }

    pub(crate) fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_count, self.retry_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = ParallelConfig::default();
        assert_eq!(c.chunk_size, 1000);
        assert_eq!(c.num_workers, 1);
        assert_eq!(c.timeout, None);
        assert_eq!(c.retry_count, 3);
        assert_eq!(c.retry_delay, Duration::from_secs(1));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn zero_workers_rejected() {
        let err = ParallelConfig::new().num_workers(0).validate().unwrap_err();
        assert!(matches!(err, StreamError::InvalidConfig { field: "num_workers", .. }));
    }

    #[test]
    fn missing_fields_take_defaults() {
        let c: ParallelConfig =
            serde_json::from_str(r#"{"num_workers": 8, "reduce_mode": "ordered"}"#).unwrap();
        assert_eq!(c.num_workers, 8);
        assert_eq!(c.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(c.reduce_mode, ReduceMode::Ordered);
    }
}
