//! Error taxonomy for pipeline construction and execution.
//!
//! Every terminal call either returns a complete result or one [`StreamError`].
//! User functions and sources report failures as [`anyhow::Error`]; the engines
//! wrap them with the stage (or source) they came from.

use crate::node::StageInfo;
use std::time::Duration;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = StreamError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum StreamError {
    /// The source adapter failed before any stage ran.
    #[error("source `{source_name}` failed: {cause:#}")]
    Source {
        source_name: String,
        #[source]
        cause: anyhow::Error,
    },

    /// A user function failed during sequential execution.
    #[error("stage {stage} failed: {cause:#}")]
    Stage {
        stage: StageInfo,
        #[source]
        cause: anyhow::Error,
    },

    /// A chunk worker failed, panicked, or the stage timed out.
    #[error("parallel stage {stage} failed: {cause}")]
    Parallel {
        stage: StageInfo,
        #[source]
        cause: ParallelFailure,
    },

    #[error("cannot reduce an empty sequence without an initial value")]
    EmptyInput,

    #[error("invalid parallel config: `{field}` {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    /// The task running an async terminal call was cancelled.
    #[error("terminal call was cancelled before completing")]
    Cancelled,

    /// A stage received a payload of the wrong element type.
    #[error("stage {stage} expected input of type `{expected}`")]
    TypeMismatch {
        stage: StageInfo,
        expected: &'static str,
    },
}

/// Why a parallel stage gave up.
#[derive(Debug, Error)]
pub enum ParallelFailure {
    #[error("chunk {index} ({len} items) failed: {cause:#}")]
    Chunk {
        index: usize,
        len: usize,
        #[source]
        cause: anyhow::Error,
    },

    #[error("worker panicked on chunk {index}: {message}")]
    Panicked {
        index: usize,
        len: usize,
        message: String,
    },

    /// Combining the per-chunk results of a reduce failed.
    #[error("final combination failed: {0:#}")]
    Combine(#[source] anyhow::Error),

    /// The stage was abandoned before this unit of work started.
    #[error("cancelled")]
    Cancelled,

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("worker pool unavailable: {0}")]
    WorkerPool(String),
}

impl ParallelFailure {
    /// Number of input elements the failure accounts for, if known.
    pub(crate) fn failed_items(&self) -> usize {
        match self {
            ParallelFailure::Chunk { len, .. } | ParallelFailure::Panicked { len, .. } => *len,
            _ => 0,
        }
    }
}

impl StreamError {
    pub(crate) fn stage(stage: StageInfo, cause: anyhow::Error) -> Self {
        StreamError::Stage { stage, cause }
    }

    pub(crate) fn parallel(stage: StageInfo, cause: ParallelFailure) -> Self {
        StreamError::Parallel { stage, cause }
    }

    pub(crate) fn invalid_config(field: &'static str, reason: impl Into<String>) -> Self {
        StreamError::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }

    /// `true` for failures raised by a parallel stage (including timeouts).
    #[must_use]
    pub fn is_parallel(&self) -> bool {
        matches!(self, StreamError::Parallel { .. })
    }

    /// `true` when a parallel stage exceeded its timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            StreamError::Parallel {
                cause: ParallelFailure::Timeout(_),
                ..
            }
        )
    }
}
