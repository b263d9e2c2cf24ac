//! Identifier for nodes within a [`Pipeline`](crate::pipeline::Pipeline) graph.
//!
//! Every source and every appended stage gets the next sequential `NodeId`.
//! A stream handle is just a pipeline plus the id of its last node, so ids
//! double as cache keys for materialized results.

/// Unique numeric identifier for a node in a pipeline graph.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub(crate) fn new(v: u64) -> Self {
        Self(v)
    }

    /// The underlying sequence number.
    pub fn raw(&self) -> u64 {
        self.0
    }
}
