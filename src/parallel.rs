//! Chunked parallel execution.
//!
//! [`ParallelStream`] is what [`Stream::parallel`](crate::Stream::parallel)
//! returns. Its `map` and `filter` stages materialize their input, split it
//! into [`Chunk`]s and run every chunk on a rayon pool built for that stage
//! alone; chunk outputs are stitched back together in chunk order, so the
//! output order always equals the input order.
//!
//! [`reduce_async`](ParallelStream::reduce_async) reduces each chunk on
//! tokio's blocking pool (at most `num_workers` at a time) and folds the
//! partial results locally.
//!
//! Every chunk is retried on its own according to the stage's
//! [`ParallelConfig`]. A chunk that still fails fails the whole stage: no
//! partial output is returned, `error_count` goes up by one and the failed
//! chunk's length is added to `failed_items`.
//!
//! ```no_run
//! use chainflow::*;
//! use std::time::Duration;
//!
//! # async fn demo() -> chainflow::Result<()> {
//! let config = ParallelConfig::new()
//!     .num_workers(4)
//!     .chunk_size(2)
//!     .timeout(Duration::from_secs(10));
//!
//! let total = from_vec((1..=100u64).collect())
//!     .parallel(config)?
//!     .map(|x: &u64| x * x)
//!     .reduce_async(|a, b| a + b, None)
//!     .await?;
//! assert_eq!(total, 338_350);
//! # Ok(())
//! # }
//! ```

use crate::chunk::{Chunk, Chunker};
use crate::config::{ParallelConfig, ReduceMode};
use crate::error::{ParallelFailure, Result, StreamError};
use crate::node::{Elements, StageContext, StageInfo, StageKind};
use crate::node_id::NodeId;
use crate::pipeline::Pipeline;
use crate::retry::{Abandoned, RetryPolicy};
use crate::runner::ExecMode;
use crate::stats::ExecutionStats;
use crate::stream::{filter_op, map_op, Record, Terminal};
use rayon::prelude::*;
use std::any::Any;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// A panic caught on a worker, carried through `anyhow` so retries see it.
#[derive(Debug, thiserror::Error)]
#[error("worker panicked: {0}")]
struct WorkerPanic(String);

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn chunk_failure(index: usize, len: usize, err: anyhow::Error) -> ParallelFailure {
    match err.downcast::<WorkerPanic>() {
        Ok(WorkerPanic(message)) => ParallelFailure::Panicked {
            index,
            len,
            message,
        },
        Err(cause) => ParallelFailure::Chunk { index, len, cause },
    }
}

/// Account for a failed stage and wrap the failure.
fn fail(stats: &ExecutionStats, stage: StageInfo, failure: ParallelFailure) -> StreamError {
    stats.record_error();
    stats.add_failed(failure.failed_items());
    error!(%stage, error = %failure, "parallel stage failed");
    StreamError::parallel(stage, failure)
}

/// Run one parallel map/filter stage over `input`.
///
/// `work` turns one chunk into that chunk's output; it may be invoked more
/// than once per chunk when retries are configured.
pub(crate) fn dispatch<I, O, W>(
    ctx: &StageContext<'_>,
    config: &ParallelConfig,
    input: Elements<I>,
    work: W,
) -> Result<Vec<O>>
where
    I: Send + Sync + 'static,
    O: Send + 'static,
    W: Fn(&[I]) -> anyhow::Result<Vec<O>> + Send + Sync + 'static,
{
    let stage = ctx.info;
    let data = input.collect::<Result<Vec<I>>>()?;
    let chunks = Chunker::new(config.chunk_size)?.split(data);
    if chunks.is_empty() {
        return Ok(Vec::new());
    }
    info!(
        %stage,
        num_workers = config.num_workers,
        chunks = chunks.len(),
        chunk_size = config.chunk_size,
        "dispatching parallel stage"
    );

    // Dropped when this function returns; idle workers exit, workers still
    // busy after a timeout finish their current chunk and exit.
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.num_workers)
        .thread_name(move |i| format!("chainflow-stage{}-worker{i}", stage.index))
        .panic_handler(|payload| error!(panic = %panic_message(payload.as_ref()), "worker panicked outside a chunk"))
        .build()
        .map_err(|e| fail(ctx.stats, stage, ParallelFailure::WorkerPool(e.to_string())))?;

    let cancelled = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel();
    {
        let cancelled = Arc::clone(&cancelled);
        let stats = ctx.stats.clone();
        let retry = config.retry_policy();
        pool.spawn(move || {
            let results: Vec<std::result::Result<Vec<O>, ParallelFailure>> = chunks
                .into_par_iter()
                .map(|chunk| run_chunk(&chunk, &work, &retry, &cancelled, &stats, stage))
                .collect();
            let outcome = first_failure(results);
            // The receiver is gone if the stage already timed out.
            let _ = tx.send(outcome);
        });
    }

    let received = match config.timeout {
        Some(limit) => rx.recv_timeout(limit).map_err(|e| match e {
            RecvTimeoutError::Timeout => ParallelFailure::Timeout(limit),
            RecvTimeoutError::Disconnected => {
                ParallelFailure::WorkerPool("worker pool shut down".to_string())
            }
        }),
        None => rx
            .recv()
            .map_err(|_| ParallelFailure::WorkerPool("worker pool shut down".to_string())),
    };

    match received.and_then(|outcome| outcome) {
        Ok(parts) => {
            let out: Vec<O> = parts.into_iter().flatten().collect();
            debug!(%stage, items = out.len(), "parallel stage complete");
            Ok(out)
        }
        Err(failure) => {
            cancelled.store(true, Ordering::Relaxed);
            Err(fail(ctx.stats, stage, failure))
        }
    }
}

fn run_chunk<I, O, W>(
    chunk: &Chunk<I>,
    work: &W,
    retry: &RetryPolicy,
    cancelled: &AtomicBool,
    stats: &ExecutionStats,
    stage: StageInfo,
) -> std::result::Result<Vec<O>, ParallelFailure>
where
    W: Fn(&[I]) -> anyhow::Result<Vec<O>>,
{
    let label = format!("{stage} chunk {}", chunk.index);
    let attempt = retry.run_blocking_while(
        &label,
        || !cancelled.load(Ordering::Relaxed),
        |_| {
            panic::catch_unwind(AssertUnwindSafe(|| work(chunk.items.as_slice()))).unwrap_or_else(
                |payload| Err(anyhow::Error::new(WorkerPanic(panic_message(payload.as_ref())))),
            )
        },
    );
    let out = match attempt {
        Ok(out) => out,
        Err(e) if e.is::<Abandoned>() => return Err(ParallelFailure::Cancelled),
        Err(e) => {
            // Siblings still retrying can stop; the stage has failed.
            cancelled.store(true, Ordering::Relaxed);
            return Err(chunk_failure(chunk.index, chunk.len(), e));
        }
    };
    // Output of an abandoned stage is discarded and not counted.
    if cancelled.load(Ordering::Relaxed) {
        return Err(ParallelFailure::Cancelled);
    }
    stats.add_processed(out.len());
    Ok(out)
}

/// All chunk outputs in order, or the failure that caused the stage to give
/// up. A chunk that merely saw the cancel flag never hides the real cause.
fn first_failure<O>(
    results: Vec<std::result::Result<Vec<O>, ParallelFailure>>,
) -> std::result::Result<Vec<Vec<O>>, ParallelFailure> {
    let mut parts = Vec::with_capacity(results.len());
    let mut cancelled = None;
    for result in results {
        match result {
            Ok(part) => parts.push(part),
            Err(ParallelFailure::Cancelled) => cancelled = Some(ParallelFailure::Cancelled),
            Err(failure) => return Err(failure),
        }
    }
    match cancelled {
        Some(failure) => Err(failure),
        None => Ok(parts),
    }
}

/// Fold one chunk without a seed.
fn reduce_chunk<T, F>(f: F, items: &[T]) -> anyhow::Result<T>
where
    T: Clone,
    F: Fn(T, T) -> anyhow::Result<T>,
{
    let mut it = items.iter().cloned();
    let Some(first) = it.next() else {
        anyhow::bail!("cannot reduce an empty chunk");
    };
    it.try_fold(first, f)
}

type ChunkResult<T> = std::result::Result<(usize, T), ParallelFailure>;

/// Await every chunk task; first failure wins.
async fn gather<T: 'static>(
    tasks: &mut JoinSet<ChunkResult<T>>,
    mode: ReduceMode,
) -> std::result::Result<Vec<T>, ParallelFailure> {
    let mut done = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(result) => done.push(result?),
            Err(e) => return Err(ParallelFailure::WorkerPool(e.to_string())),
        }
    }
    if mode == ReduceMode::Ordered {
        done.sort_by_key(|(index, _)| *index);
    }
    Ok(done.into_iter().map(|(_, value)| value).collect())
}

/// A stream in parallel mode.
///
/// `map`/`filter` appended here run chunked on a worker pool; steps queued
/// before the switch keep their sequential strategy. There is no way back to
/// sequential mode.
#[derive(Clone)]
pub struct ParallelStream<T> {
    pipeline: Pipeline,
    id: NodeId,
    config: ParallelConfig,
    _t: PhantomData<T>,
}

impl<T: Record> Terminal<T> for ParallelStream<T> {
    fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    fn node_id(&self) -> NodeId {
        self.id
    }
}

impl<T: Record> ParallelStream<T> {
    pub(crate) fn new(pipeline: Pipeline, id: NodeId, config: ParallelConfig) -> Self {
        ParallelStream {
            pipeline,
            id,
            config,
            _t: PhantomData,
        }
    }

    /// The configuration every stage appended to this stream runs with.
    pub fn config(&self) -> &ParallelConfig {
        &self.config
    }

    fn append<O: Record>(&self, op: Arc<dyn crate::node::DynOp>) -> ParallelStream<O> {
        let id = self.pipeline.append_stage(self.id, op);
        ParallelStream::new(self.pipeline.clone(), id, self.config.clone())
    }

    /// Apply `f` to every element, chunk by chunk on the worker pool.
    pub fn map<O, F>(&self, f: F) -> ParallelStream<O>
    where
        O: Record,
        F: Fn(&T) -> O + Send + Sync + 'static,
    {
        self.try_map(move |t| Ok(f(t)))
    }

    /// Parallel map for functions that can fail. An error in any chunk (after
    /// retries) fails the stage with [`StreamError::Parallel`].
    pub fn try_map<O, F>(&self, f: F) -> ParallelStream<O>
    where
        O: Record,
        F: Fn(&T) -> anyhow::Result<O> + Send + Sync + 'static,
    {
        self.append(map_op::<T, O, F>(f, ExecMode::Parallel(self.config.clone())))
    }

    /// Keep the elements where `pred` holds, chunk by chunk on the worker
    /// pool. Order is preserved.
    pub fn filter<P>(&self, pred: P) -> ParallelStream<T>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.try_filter(move |t| Ok(pred(t)))
    }

    /// Parallel filter for predicates that can fail.
    pub fn try_filter<P>(&self, pred: P) -> ParallelStream<T>
    where
        P: Fn(&T) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        self.append(filter_op::<T, P>(pred, ExecMode::Parallel(self.config.clone())))
    }

    /// Reduce all elements with `f`, chunk by chunk on worker tasks, then
    /// combine the partial results locally (seeded with `initial` if given).
    ///
    /// `f` must be associative; with [`ReduceMode::Unordered`] it must also be
    /// commutative for the result to be deterministic. It is a plain function
    /// pointer, so it carries no state across workers.
    ///
    /// The reduced value is not cached: only `collect*` results are. A second
    /// call reuses the cached input elements, so upstream stages do not run
    /// again, but it dispatches the reduction again. On success
    /// `processed_items` is set to the input length unless it is already
    /// higher, so repeated reductions do not inflate the counter.
    ///
    /// # Errors
    ///
    /// [`StreamError::EmptyInput`] for empty input without a seed (empty input
    /// with a seed returns the seed), [`StreamError::Parallel`] if a chunk
    /// fails or the timeout expires, or any failure from upstream stages.
    pub async fn reduce_async(&self, f: fn(T, T) -> T, initial: Option<T>) -> Result<T> {
        self.reduce_with(move |a, b| Ok(f(a, b)), initial).await
    }

    /// [`reduce_async`](Self::reduce_async) for reduction functions that can
    /// fail.
    pub async fn try_reduce_async(
        &self,
        f: fn(T, T) -> anyhow::Result<T>,
        initial: Option<T>,
    ) -> Result<T> {
        self.reduce_with(f, initial).await
    }

    async fn reduce_with<F>(&self, f: F, initial: Option<T>) -> Result<T>
    where
        F: Fn(T, T) -> anyhow::Result<T> + Copy + Send + Sync + 'static,
    {
        let data = self.collect_async().await?;
        if data.is_empty() {
            return initial.ok_or(StreamError::EmptyInput);
        }

        let stats = self.stats();
        let stage = StageInfo {
            index: self.pipeline.stage_index_of(self.id) + 1,
            kind: StageKind::Reduce,
            parallel: true,
        };
        let total = data.len();
        let chunks = Chunker::new(self.config.chunk_size)?.split(data);
        info!(
            %stage,
            num_workers = self.config.num_workers,
            chunks = chunks.len(),
            chunk_size = self.config.chunk_size,
            "dispatching parallel reduce"
        );

        let start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.config.num_workers));
        let retry = self.config.retry_policy();
        let mut tasks = JoinSet::new();
        for chunk in chunks {
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let (index, len) = (chunk.index, chunk.len());
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return Err(ParallelFailure::Cancelled);
                };
                let items = Arc::new(chunk.items);
                let label = format!("{stage} chunk {index}");
                retry
                    .run(&label, |_| {
                        let items = Arc::clone(&items);
                        async move {
                            match tokio::task::spawn_blocking(move || reduce_chunk(f, items.as_slice())).await {
                                Ok(result) => result,
                                Err(join) if join.is_panic() => {
                                    let message = panic_message(join.into_panic().as_ref());
                                    Err(anyhow::Error::new(WorkerPanic(message)))
                                }
                                Err(join) => Err(anyhow::Error::new(join)),
                            }
                        }
                    })
                    .await
                    .map(|value| (index, value))
                    .map_err(|e| chunk_failure(index, len, e))
            });
        }

        let outcome = match self.config.timeout {
            Some(limit) => tokio::time::timeout(limit, gather(&mut tasks, self.config.reduce_mode))
                .await
                .unwrap_or(Err(ParallelFailure::Timeout(limit))),
            None => gather(&mut tasks, self.config.reduce_mode).await,
        };
        tasks.abort_all();

        let reduced = outcome.and_then(|partials| {
            let mut partials = partials.into_iter();
            let seed = match initial {
                Some(seed) => seed,
                None => partials
                    .next()
                    .ok_or_else(|| ParallelFailure::Combine(anyhow::anyhow!("no chunk results")))?,
            };
            partials.try_fold(seed, f).map_err(ParallelFailure::Combine)
        });
        stats.add_execution_time(start.elapsed());

        match reduced {
            Ok(value) => {
                stats.raise_processed_to(total);
                debug!(%stage, items = total, "parallel reduce complete");
                Ok(value)
            }
            Err(failure) => Err(fail(stats, stage, failure)),
        }
    }
}
