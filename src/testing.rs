//! Testing utilities for chainflow pipelines.
//!
//! - **Assertions**: compare collected output with expected results
//! - **Test doubles**: functions that fail a set number of times, sources that
//!   never open, and call counters for checking laziness and caching
//!
//! # Quick Start
//!
//! ```no_run
//! use chainflow::*;
//! use chainflow::testing::*;
//!
//! #[test]
//! fn doubles_every_element() -> anyhow::Result<()> {
//!     let result = from_vec(vec![1, 2, 3])
//!         .map(|x: &i32| x * 2)
//!         .collect()?;
//!
//!     assert_collections_equal(&result, &[2, 4, 6]);
//!     Ok(())
//! }
//! ```
//!
//! Retries are easiest to exercise with a [`Flaky`] double:
//!
//! ```no_run
//! use chainflow::*;
//! use chainflow::testing::*;
//! use std::time::Duration;
//!
//! # fn main() -> anyhow::Result<()> {
//! let flaky = Flaky::failing_times(2);
//! let config = ParallelConfig::new()
//!     .retry_count(2)
//!     .retry_delay(Duration::ZERO);
//!
//! let out = from_vec(vec![1, 2, 3])
//!     .parallel(config)?
//!     .try_map(move |x: &i32| flaky.call(*x))
//!     .collect()?;
//! assert_collections_equal(&out, &[1, 2, 3]);
//! # Ok(())
//! # }
//! ```

pub mod assertions;
pub mod doubles;

pub use assertions::*;
pub use doubles::*;
