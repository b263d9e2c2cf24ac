use crate::config::ParallelConfig;
use crate::error::{Result, StreamError};
use crate::node::{erase, restore, DynOp, Elements, OpenFn, Partition, StageContext, StageKind};
use crate::node_id::NodeId;
use crate::parallel::{self, ParallelStream};
use crate::pipeline::Pipeline;
use crate::runner::{ExecMode, Runner};
use crate::source::{FnSource, SourceAdapter, VecSource};
use crate::stats::ExecutionStats;
use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;

/// Bound for every element type flowing through a chain.
///
/// The serde bounds keep records plain, transferable data, which is what lets
/// chunks cross worker boundaries.
pub trait Record: 'static + Send + Sync + Clone + Serialize + DeserializeOwned {}
impl<T> Record for T where T: 'static + Send + Sync + Clone + Serialize + DeserializeOwned {}

/// A sequential stream: a handle on the last node of a chain.
///
/// Builder methods take `&self` and return a new handle; the receiver stays
/// valid and can be extended or collected independently.
#[derive(Clone)]
pub struct Stream<T> {
    pub(crate) pipeline: Pipeline,
    pub(crate) id: NodeId,
    _t: PhantomData<T>,
}

/// Start a chain from any [`SourceAdapter`].
pub fn from_source<T, S>(source: S) -> Stream<T>
where
    T: Record,
    S: SourceAdapter<T>,
{
    let p = Pipeline::default();
    let source = Arc::new(source);
    let name = source.name().to_string();
    let source_name = name.clone();
    let open: OpenFn = Arc::new(move || {
        let records = source.open().map_err(|cause| StreamError::Source {
            source_name: source_name.clone(),
            cause,
        })?;
        let elements: Elements<T> = Box::new(records.map(Ok));
        Ok(erase(elements))
    });
    let id = p.add_source(name, open);
    Stream::new(p, id)
}

pub fn from_vec<T: Record>(data: Vec<T>) -> Stream<T> {
    from_source(VecSource::new(data))
}

/// Start a chain from anything iterable. The items are collected up front.
pub fn from_iter<T, I>(iter: I) -> Stream<T>
where
    T: Record,
    I: IntoIterator<Item = T>,
{
    from_vec(iter.into_iter().collect())
}

/// Start a chain from a fallible closure, called once per execution.
pub fn from_fn<T, F>(name: impl Into<String>, f: F) -> Stream<T>
where
    T: Record,
    F: Fn() -> anyhow::Result<Vec<T>> + Send + Sync + 'static,
{
    from_source(FnSource::new(name, f))
}

// ---- Stage DynOps ----

struct MapOp<I, O, F> {
    f: Arc<F>,
    mode: ExecMode,
    _t: PhantomData<fn(I) -> O>,
}
impl<I, O, F> DynOp for MapOp<I, O, F>
where
    I: Record,
    O: Record,
    F: Fn(&I) -> anyhow::Result<O> + Send + Sync + 'static,
{
    fn kind(&self) -> StageKind {
        StageKind::Map
    }

    fn mode(&self) -> &ExecMode {
        &self.mode
    }

    fn apply(&self, input: Partition, ctx: &StageContext<'_>) -> Result<Partition> {
        let input = restore::<I>(ctx.info, input)?;
        let f = Arc::clone(&self.f);
        match &self.mode {
            ExecMode::Sequential => {
                let info = ctx.info;
                let out: Elements<O> = Box::new(input.map(move |item| {
                    item.and_then(|i| f(&i).map_err(|e| StreamError::stage(info, e)))
                }));
                Ok(erase(out))
            }
            ExecMode::Parallel(config) => {
                let out = parallel::dispatch(ctx, config, input, move |chunk: &[I]| {
                    chunk.iter().map(|i| f(i)).collect::<anyhow::Result<Vec<O>>>()
                })?;
                Ok(erase::<O>(Box::new(out.into_iter().map(Ok))))
            }
        }
    }
}

struct FilterOp<T, P> {
    pred: Arc<P>,
    mode: ExecMode,
    _t: PhantomData<fn(T)>,
}
impl<T, P> DynOp for FilterOp<T, P>
where
    T: Record,
    P: Fn(&T) -> anyhow::Result<bool> + Send + Sync + 'static,
{
    fn kind(&self) -> StageKind {
        StageKind::Filter
    }

    fn mode(&self) -> &ExecMode {
        &self.mode
    }

    fn apply(&self, input: Partition, ctx: &StageContext<'_>) -> Result<Partition> {
        let input = restore::<T>(ctx.info, input)?;
        let pred = Arc::clone(&self.pred);
        match &self.mode {
            ExecMode::Sequential => {
                let info = ctx.info;
                let out: Elements<T> = Box::new(input.filter_map(move |item| match item {
                    Ok(t) => match pred(&t) {
                        Ok(true) => Some(Ok(t)),
                        Ok(false) => None,
                        Err(e) => Some(Err(StreamError::stage(info, e))),
                    },
                    Err(e) => Some(Err(e)),
                }));
                Ok(erase(out))
            }
            ExecMode::Parallel(config) => {
                let out = parallel::dispatch(ctx, config, input, move |chunk: &[T]| {
                    let mut kept = Vec::new();
                    for t in chunk {
                        if pred(t)? {
                            kept.push(t.clone());
                        }
                    }
                    Ok(kept)
                })?;
                Ok(erase::<T>(Box::new(out.into_iter().map(Ok))))
            }
        }
    }
}

struct FlatMapOp<I, O, F> {
    f: Arc<F>,
    _t: PhantomData<fn(I) -> O>,
}
impl<I, O, F> DynOp for FlatMapOp<I, O, F>
where
    I: Record,
    O: Record,
    F: Fn(&I) -> Vec<O> + Send + Sync + 'static,
{
    fn kind(&self) -> StageKind {
        StageKind::FlatMap
    }

    fn apply(&self, input: Partition, ctx: &StageContext<'_>) -> Result<Partition> {
        let input = restore::<I>(ctx.info, input)?;
        let f = Arc::clone(&self.f);
        let out: Elements<O> = Box::new(input.flat_map(move |item| -> Elements<O> {
            match item {
                Ok(i) => Box::new(f(&i).into_iter().map(Ok)),
                Err(e) => Box::new(std::iter::once(Err(e))),
            }
        }));
        Ok(erase(out))
    }
}

struct GroupByOp<T, K, F> {
    key: Arc<F>,
    _t: PhantomData<fn(T) -> K>,
}
impl<T, K, F> DynOp for GroupByOp<T, K, F>
where
    T: Record,
    K: Record + Ord,
    F: Fn(&T) -> K + Send + Sync + 'static,
{
    fn kind(&self) -> StageKind {
        StageKind::GroupBy
    }

    fn apply(&self, input: Partition, ctx: &StageContext<'_>) -> Result<Partition> {
        let input = restore::<T>(ctx.info, input)?;
        let mut keyed = input
            .map(|item| item.map(|t| ((self.key)(&t), t)))
            .collect::<Result<Vec<(K, T)>>>()?;
        // Stable: members of a group keep their input order.
        keyed.sort_by(|a, b| a.0.cmp(&b.0));

        let mut groups: Vec<(K, Vec<T>)> = Vec::new();
        for (k, t) in keyed {
            match groups.last_mut() {
                Some((last, members)) if *last == k => members.push(t),
                _ => groups.push((k, vec![t])),
            }
        }
        Ok(erase::<(K, Vec<T>)>(Box::new(groups.into_iter().map(Ok))))
    }
}

struct InspectOp<T, F> {
    f: Arc<F>,
    _t: PhantomData<fn(T)>,
}
impl<T, F> DynOp for InspectOp<T, F>
where
    T: Record,
    F: Fn(&T) + Send + Sync + 'static,
{
    fn kind(&self) -> StageKind {
        StageKind::Inspect
    }

    fn apply(&self, input: Partition, ctx: &StageContext<'_>) -> Result<Partition> {
        let input = restore::<T>(ctx.info, input)?;
        let f = Arc::clone(&self.f);
        let out: Elements<T> = Box::new(input.inspect(move |item| {
            if let Ok(t) = item {
                f(t);
            }
        }));
        Ok(erase(out))
    }
}

pub(crate) fn map_op<I, O, F>(f: F, mode: ExecMode) -> Arc<dyn DynOp>
where
    I: Record,
    O: Record,
    F: Fn(&I) -> anyhow::Result<O> + Send + Sync + 'static,
{
    Arc::new(MapOp::<I, O, F> {
        f: Arc::new(f),
        mode,
        _t: PhantomData,
    })
}

pub(crate) fn filter_op<T, P>(pred: P, mode: ExecMode) -> Arc<dyn DynOp>
where
    T: Record,
    P: Fn(&T) -> anyhow::Result<bool> + Send + Sync + 'static,
{
    Arc::new(FilterOp::<T, P> {
        pred: Arc::new(pred),
        mode,
        _t: PhantomData,
    })
}

/// Terminal operations shared by [`Stream`] and [`ParallelStream`].
pub trait Terminal<T: Record> {
    fn pipeline(&self) -> &Pipeline;

    fn node_id(&self) -> NodeId;

    /// Execute every queued step and return the final elements.
    ///
    /// The result is cached; later calls on the same handle return it
    /// without running anything.
    ///
    /// # Errors
    ///
    /// The first source, stage or parallel failure. Nothing partial is
    /// returned.
    fn collect(&self) -> Result<Vec<T>> {
        Runner::default().run_collect::<T>(self.pipeline(), self.node_id())
    }

    /// [`collect`](Self::collect) on tokio's blocking pool.
    fn collect_async(&self) -> impl Future<Output = Result<Vec<T>>> + Send {
        let pipeline = self.pipeline().clone();
        let id = self.node_id();
        async move {
            Runner::default()
                .run_collect_async::<T>(&pipeline, id)
                .await
        }
    }

    /// Number of elements after every queued step.
    fn count(&self) -> Result<usize> {
        self.collect().map(|v| v.len())
    }

    /// `true` once a terminal call on this handle has succeeded.
    fn is_cached(&self) -> bool {
        self.pipeline().is_cached(self.node_id())
    }

    /// Counters shared by every handle derived from the same source.
    fn stats(&self) -> &ExecutionStats {
        self.pipeline().stats()
    }
}

impl<T: Record> Terminal<T> for Stream<T> {
    fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    fn node_id(&self) -> NodeId {
        self.id
    }
}

impl<T: Record> Stream<T> {
    pub(crate) fn new(pipeline: Pipeline, id: NodeId) -> Self {
        Stream {
            pipeline,
            id,
            _t: PhantomData,
        }
    }

    fn append<O: Record>(&self, op: Arc<dyn DynOp>) -> Stream<O> {
        let id = self.pipeline.append_stage(self.id, op);
        Stream::new(self.pipeline.clone(), id)
    }

    pub fn map<O, F>(&self, f: F) -> Stream<O>
    where
        O: Record,
        F: Fn(&T) -> O + Send + Sync + 'static,
    {
        self.try_map(move |t| Ok(f(t)))
    }

    /// Like [`map`](Self::map), for functions that can fail. A failure aborts
    /// the terminal call with [`StreamError::Stage`].
    pub fn try_map<O, F>(&self, f: F) -> Stream<O>
    where
        O: Record,
        F: Fn(&T) -> anyhow::Result<O> + Send + Sync + 'static,
    {
        self.append(map_op::<T, O, F>(f, ExecMode::Sequential))
    }

    pub fn filter<P>(&self, pred: P) -> Stream<T>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.try_filter(move |t| Ok(pred(t)))
    }

    pub fn try_filter<P>(&self, pred: P) -> Stream<T>
    where
        P: Fn(&T) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        self.append(filter_op::<T, P>(pred, ExecMode::Sequential))
    }

    pub fn flat_map<O, F>(&self, f: F) -> Stream<O>
    where
        O: Record,
        F: Fn(&T) -> Vec<O> + Send + Sync + 'static,
    {
        self.append(Arc::new(FlatMapOp::<T, O, F> {
            f: Arc::new(f),
            _t: PhantomData,
        }))
    }

    /// Group elements sharing a key.
    ///
    /// Groups come out in ascending key order, not input order; members of a
    /// group keep their relative input order.
    pub fn group_by<K, F>(&self, key: F) -> Stream<(K, Vec<T>)>
    where
        K: Record + Ord,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.append(Arc::new(GroupByOp::<T, K, F> {
            key: Arc::new(key),
            _t: PhantomData,
        }))
    }

    /// Observe each element as it passes, without changing it.
    pub fn inspect<F>(&self, f: F) -> Stream<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.append(Arc::new(InspectOp::<T, F> {
            f: Arc::new(f),
            _t: PhantomData,
        }))
    }

    /// Sequential left fold over the collected elements, seeded with
    /// `initial` when given.
    ///
    /// # Errors
    ///
    /// [`StreamError::EmptyInput`] for empty input without a seed, or any
    /// failure from executing the chain.
    pub fn reduce<F>(&self, f: F, initial: Option<T>) -> Result<T>
    where
        F: Fn(T, T) -> T,
    {
        let mut items = self.collect()?.into_iter();
        let seed = match initial {
            Some(seed) => seed,
            None => items.next().ok_or(StreamError::EmptyInput)?,
        };
        Ok(items.fold(seed, f))
    }

    /// Switch to parallel mode.
    ///
    /// Steps queued so far keep running sequentially; `map` and `filter`
    /// calls on the returned stream run chunked on a worker pool.
    ///
    /// # Errors
    ///
    /// [`StreamError::InvalidConfig`] if `config` fails validation.
    pub fn parallel(&self, config: ParallelConfig) -> Result<ParallelStream<T>> {
        config.validate()?;
        Ok(ParallelStream::new(self.pipeline.clone(), self.id, config))
    }
}
