use crate::config::ParallelConfig;
use crate::error::{Result, StreamError};
use crate::node::{restore, Node, Partition, StageContext, StageInfo, StageKind};
use crate::pipeline::{Pipeline, PipelineInner};
use crate::stats::ExecutionStats;
use crate::NodeId;
use std::time::Instant;
use tracing::{debug, error};

/// Execution strategy a stage was declared with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecMode {
    Sequential,
    Parallel(ParallelConfig),
}

impl ExecMode {
    pub fn is_parallel(&self) -> bool {
        matches!(self, ExecMode::Parallel(_))
    }
}

/// Executes the chain ending at a terminal node.
///
/// The runner snapshots the graph, walks back from the terminal node to its
/// source, opens the source and feeds the elements through every stage in
/// declaration order. Successful results are cached per node unless caching is
/// disabled.
pub struct Runner {
    pub cache: bool,
}

impl Default for Runner {
    fn default() -> Self {
        Self { cache: true }
    }
}

impl Runner {
    pub fn uncached() -> Self {
        Self { cache: false }
    }

    pub fn run_collect<T: 'static + Send + Sync + Clone>(
        &self,
        p: &Pipeline,
        terminal: NodeId,
    ) -> Result<Vec<T>> {
        if self.cache {
            if let Some(hit) = p.read_cached::<T>(terminal) {
                debug!(node = terminal.raw(), items = hit.len(), "returning cached result");
                return Ok(hit);
            }
        }

        let chain = snapshot_chain(p, terminal);
        let stats = p.stats();
        let start = Instant::now();
        let result = exec_chain::<T>(chain, stats);
        stats.add_execution_time(start.elapsed());

        match result {
            Ok(out) => {
                debug!(node = terminal.raw(), items = out.len(), "chain executed");
                if self.cache {
                    p.write_cached(terminal, out.clone());
                }
                Ok(out)
            }
            Err(e) => {
                record_failure(stats, &e);
                error!(node = terminal.raw(), error = %e, "chain execution failed");
                Err(e)
            }
        }
    }

    /// Run [`run_collect`](Self::run_collect) on tokio's blocking pool.
    pub async fn run_collect_async<T: 'static + Send + Sync + Clone>(
        &self,
        p: &Pipeline,
        terminal: NodeId,
    ) -> Result<Vec<T>> {
        if self.cache {
            if let Some(hit) = p.read_cached::<T>(terminal) {
                debug!(node = terminal.raw(), items = hit.len(), "returning cached result");
                return Ok(hit);
            }
        }
        let p = p.clone();
        let runner = Runner { cache: self.cache };
        match tokio::task::spawn_blocking(move || runner.run_collect::<T>(&p, terminal)).await {
            Ok(result) => result,
            Err(join) if join.is_panic() => std::panic::resume_unwind(join.into_panic()),
            Err(_) => Err(StreamError::Cancelled),
        }
    }
}

/// Parallel stages account for their own failures; everything else is counted
/// here.
fn record_failure(stats: &ExecutionStats, e: &StreamError) {
    match e {
        StreamError::Parallel { .. } => {}
        StreamError::Stage { .. } => {
            stats.record_error();
            stats.add_failed(1);
        }
        _ => stats.record_error(),
    }
}

/// Linear backwalk: terminal → … → source, returned source-first.
fn snapshot_chain(p: &Pipeline, terminal: NodeId) -> Vec<Node> {
    let locked: &PipelineInner = &p.lock();
    let mut chain: Vec<Node> = Vec::new();
    let mut cur = terminal;
    while let Some(n) = locked.nodes.get(&cur) {
        chain.push(n.clone());
        match locked.edges.iter().find(|(_, to)| *to == cur) {
            Some((from, _)) => cur = *from,
            None => break,
        }
    }
    chain.reverse();
    chain
}

fn exec_chain<T: 'static>(plan: Vec<Node>, stats: &ExecutionStats) -> Result<Vec<T>> {
    let mut buf: Option<Partition> = None;
    let mut last = None;

    for node in plan {
        match node {
            Node::Source { name, open } => {
                debug!(source = %name, "opening source");
                buf = Some(open()?);
            }
            Node::Stage { index, op } => {
                let info = StageInfo {
                    index,
                    kind: op.kind(),
                    parallel: op.mode().is_parallel(),
                };
                let ctx = StageContext { info, stats };
                let input = buf.take().ok_or(StreamError::TypeMismatch {
                    stage: info,
                    expected: "upstream elements",
                })?;
                buf = Some(op.apply(input, &ctx)?);
                last = Some(info);
            }
        }
    }

    let terminal = last.unwrap_or(SOURCE_STAGE);
    let out = buf.ok_or(StreamError::TypeMismatch {
        stage: terminal,
        expected: "upstream elements",
    })?;
    restore::<T>(terminal, out)?.collect()
}

/// Stand-in identity used when a chain has no stages.
const SOURCE_STAGE: StageInfo = StageInfo {
    index: 0,
    kind: StageKind::Source,
    parallel: false,
};
