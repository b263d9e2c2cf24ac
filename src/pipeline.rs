use crate::node::{DynOp, Node, OpenFn};
use crate::node_id::NodeId;
use crate::stats::ExecutionStats;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

// -------- Pipeline + nodes --------

/// The shared graph behind every stream handle derived from one source.
///
/// Appending a stage inserts a node and an edge from its parent; existing
/// handles keep pointing at their own node, so the prefix is shared and never
/// mutated. The graph also owns the chain's [`ExecutionStats`] and the
/// per-node result cache.
pub struct Pipeline {
    pub(crate) inner: Arc<Mutex<PipelineInner>>,
    stats: ExecutionStats,
}

pub struct PipelineInner {
    pub next_id: u64,
    pub nodes: HashMap<NodeId, Node>,
    pub edges: Vec<(NodeId, NodeId)>,
    pub cache: HashMap<NodeId, Arc<dyn Any + Send + Sync>>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(PipelineInner {
                next_id: 0,
                nodes: HashMap::new(),
                edges: Vec::new(),
                cache: HashMap::new(),
            })),
            stats: ExecutionStats::new(),
        }
    }
}

/// Clones share the graph and the stats.
impl Clone for Pipeline {
    fn clone(&self) -> Self {
        Pipeline {
            inner: Arc::clone(&self.inner),
            stats: self.stats.clone(),
        }
    }
}

impl Pipeline {
    pub(crate) fn lock(&self) -> MutexGuard<'_, PipelineInner> {
        // User code never runs under this lock, so a poisoned guard still holds
        // a consistent graph.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn stats(&self) -> &ExecutionStats {
        &self.stats
    }

    /// Number of nodes (source plus stages) ever added to this graph.
    pub fn node_count(&self) -> usize {
        self.lock().nodes.len()
    }

    pub(crate) fn insert_node(&self, node: Node) -> NodeId {
        let mut g = self.lock();
        let id = NodeId::new(g.next_id);
        g.next_id += 1;
        g.nodes.insert(id, node);
        id
    }

    pub(crate) fn connect(&self, from: NodeId, to: NodeId) {
        self.lock().edges.push((from, to));
    }

    pub(crate) fn add_source(&self, name: impl Into<String>, open: OpenFn) -> NodeId {
        self.insert_node(Node::Source {
            name: name.into(),
            open,
        })
    }

    /// Append `op` after `parent` and return the new node.
    pub(crate) fn append_stage(&self, parent: NodeId, op: Arc<dyn DynOp>) -> NodeId {
        let index = self.stage_index_of(parent) + 1;
        let id = self.insert_node(Node::Stage { index, op });
        self.connect(parent, id);
        id
    }

    /// Position of `id` in its chain; the source is 0.
    pub(crate) fn stage_index_of(&self, id: NodeId) -> usize {
        self.lock().nodes.get(&id).map_or(0, Node::stage_index)
    }

    pub(crate) fn read_cached<T: 'static + Send + Sync + Clone>(&self, id: NodeId) -> Option<Vec<T>> {
        let g = self.lock();
        g.cache
            .get(&id)
            .and_then(|payload| payload.downcast_ref::<Vec<T>>())
            .cloned()
    }

    pub(crate) fn write_cached<T: 'static + Send + Sync>(&self, id: NodeId, data: Vec<T>) {
        self.lock().cache.entry(id).or_insert_with(|| Arc::new(data));
    }

    pub(crate) fn is_cached(&self, id: NodeId) -> bool {
        self.lock().cache.contains_key(&id)
    }
}
