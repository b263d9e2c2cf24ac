//! # Chainflow
//!
//! Lazy, composable record pipelines with chunked parallel execution.
//!
//! A chain starts from a source of ordered records, queues transformations
//! (`map`, `filter`, `flat_map`, `group_by`) without running them, and executes
//! everything on a terminal call (`collect`, `collect_async`, `reduce`,
//! `reduce_async`). Any point of the chain can switch to parallel mode, after
//! which `map` and `filter` run chunked on a bounded worker pool and
//! `reduce_async` reduces chunks concurrently.
//!
//! ## Quick Start
//!
//! ```no_run
//! use chainflow::*;
//!
//! # fn main() -> chainflow::Result<()> {
//! let words = from_vec(vec![
//!     "apple".to_string(),
//!     "avocado".to_string(),
//!     "banana".to_string(),
//! ]);
//!
//! let by_letter = words
//!     .filter(|w: &String| w.len() > 5)
//!     .group_by(|w: &String| w.chars().next().unwrap_or_default());
//!
//! for (letter, group) in by_letter.collect()? {
//!     println!("{letter}: {group:?}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Streams are immutable handles
//!
//! A [`Stream<T>`] points at the last node of a chain. Builder methods append
//! a node and return a new handle; the original handle is untouched and can be
//! extended or collected on its own. Every handle derived from one source
//! shares the same [`ExecutionStats`].
//!
//! ### Laziness and caching
//!
//! Nothing runs until a terminal call. The sequential engine then pulls
//! elements one by one through the queued steps. A successful terminal call
//! caches its result, so calling `collect` again is free.
//!
//! ### Parallel mode
//!
//! [`Stream::parallel`] validates a [`ParallelConfig`] and returns a
//! [`ParallelStream<T>`]. Steps queued before the switch stay sequential;
//! `map`/`filter` queued after it are executed by splitting the materialized
//! input into chunks of `chunk_size`, running them on `num_workers` threads
//! and reassembling the output in input order. See [`parallel`] for failure,
//! retry and timeout behavior.
//!
//! ### Sources
//!
//! [`from_vec`], [`from_iter`], [`from_fn`] and [`from_source`] start chains. External data
//! (database queries, files) plugs in through [`SourceAdapter`].
//!
//! ### Errors
//!
//! All terminal calls return [`Result`] with a [`StreamError`]: no terminal
//! call ever returns a partial result.
//!
//! ## Feature Flags
//!
//! - `metrics` (default) - JSON export, printing and saving of
//!   [`ExecutionStats`]
//!
//! ## Module Overview
//!
//! - [`stream`] - `Stream`, sequential stages, source constructors
//! - [`parallel`] - `ParallelStream`, chunk dispatch, parallel reduce
//! - [`runner`] - chain execution and caching
//! - [`pipeline`] - the shared node graph
//! - [`chunk`], [`retry`], [`stats`], [`config`] - engine building blocks
//! - [`testing`] - assertions and test doubles for pipeline tests

pub mod chunk;
pub mod config;
pub mod error;
pub mod node;
pub mod node_id;
pub mod parallel;
pub mod pipeline;
pub mod retry;
pub mod runner;
pub mod source;
pub mod stats;
pub mod stream;
pub mod testing;

pub use chunk::{Chunk, Chunker};
pub use config::{ParallelConfig, ReduceMode};
pub use error::{ParallelFailure, Result, StreamError};
pub use node::{StageInfo, StageKind};
pub use node_id::NodeId;
pub use parallel::ParallelStream;
pub use pipeline::Pipeline;
pub use retry::RetryPolicy;
pub use runner::{ExecMode, Runner};
pub use source::{FnSource, SourceAdapter, VecSource};
pub use stats::{ExecutionStats, StatsSnapshot};
pub use stream::{from_fn, from_iter, from_source, from_vec, Record, Stream, Terminal};
