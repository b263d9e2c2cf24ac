use crate::error::Result;
use crate::runner::ExecMode;
use crate::stats::ExecutionStats;
use std::any::Any;
use std::fmt::{Display, Formatter, Result as FormatResult};
use std::sync::Arc;

/// An ordered, fallible element stream flowing between stages.
pub type Elements<T> = Box<dyn Iterator<Item = Result<T>> + Send>;

/// A type-erased [`Elements`] handed from one stage to the next.
///
/// Stages downcast it back to `Elements<I>` for the input type they were built
/// with.
pub type Partition = Box<dyn Any + Send>;

pub(crate) fn erase<T: 'static>(elements: Elements<T>) -> Partition {
    Box::new(elements)
}

pub(crate) fn restore<T: 'static>(stage: StageInfo, input: Partition) -> Result<Elements<T>> {
    input
        .downcast::<Elements<T>>()
        .map(|boxed| *boxed)
        .map_err(|_| crate::StreamError::TypeMismatch {
            stage,
            expected: std::any::type_name::<T>(),
        })
}

/// What a stage does, for error messages and logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageKind {
    Source,
    Map,
    Filter,
    FlatMap,
    GroupBy,
    Inspect,
    Reduce,
}

impl Display for StageKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        let name = match self {
            StageKind::Source => "source",
            StageKind::Map => "map",
            StageKind::Filter => "filter",
            StageKind::FlatMap => "flat_map",
            StageKind::GroupBy => "group_by",
            StageKind::Inspect => "inspect",
            StageKind::Reduce => "reduce",
        };
        f.write_str(name)
    }
}

/// Identity of one stage inside its chain: position (1-based, after the
/// source), kind, and whether it was declared in parallel mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StageInfo {
    pub index: usize,
    pub kind: StageKind,
    pub parallel: bool,
}

impl Display for StageInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        if self.parallel {
            write!(f, "#{} {} (parallel)", self.index, self.kind)
        } else {
            write!(f, "#{} {}", self.index, self.kind)
        }
    }
}

/// Per-execution context handed to every stage.
pub struct StageContext<'a> {
    pub info: StageInfo,
    pub stats: &'a ExecutionStats,
}

pub trait DynOp: Send + Sync {
    fn kind(&self) -> StageKind;

    fn mode(&self) -> &ExecMode {
        &ExecMode::Sequential
    }

    /// Turn the upstream elements into this stage's output elements.
    ///
    /// Sequential stages return lazy iterators; materializing stages (group-by,
    /// parallel dispatch) drain their input here.
    fn apply(&self, input: Partition, ctx: &StageContext<'_>) -> Result<Partition>;
}

/// Opens a source and yields its records as an erased [`Elements`].
pub type OpenFn = Arc<dyn Fn() -> Result<Partition> + Send + Sync>;

#[derive(Clone)]
pub enum Node {
    Source {
        name: String,
        open: OpenFn,
    },
    Stage {
        index: usize,
        op: Arc<dyn DynOp>,
    },
}

impl Node {
    pub(crate) fn stage_index(&self) -> usize {
        match self {
            Node::Source { .. } => 0,
            Node::Stage { index, .. } => *index,
        }
    }
}
