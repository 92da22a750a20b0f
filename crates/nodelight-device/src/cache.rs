//! Latest known state per node.

use std::collections::HashMap;
use std::sync::Arc;

use nodelight_core::NodeState;
use parking_lot::RwLock;

/// Mapping from node id to its last observed state. Last write wins;
/// entries are never removed.
#[derive(Clone, Debug, Default)]
pub struct NodeStateCache {
    nodes: HashMap<String, NodeState>,
}

impl NodeStateCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `state`, returning the entry it replaced.
    pub fn upsert(&mut self, state: NodeState) -> Option<NodeState> {
        self.nodes.insert(state.node_id.clone(), state)
    }

    /// State of a single node.
    pub fn get(&self, node_id: &str) -> Option<&NodeState> {
        self.nodes.get(node_id)
    }

    /// Owned copy of every entry, in no particular order.
    pub fn snapshot(&self) -> Vec<NodeState> {
        self.nodes.values().cloned().collect()
    }

    /// Number of known nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no node has reported yet.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// A [`NodeStateCache`] behind a coarse lock, shared between the single
/// writer (read loop or spoofer) and any number of snapshot readers.
#[derive(Clone, Debug, Default)]
pub struct SharedStateCache {
    inner: Arc<RwLock<NodeStateCache>>,
}

impl SharedStateCache {
    /// Empty shared cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `state`.
    pub fn update(&self, state: NodeState) {
        let _ = self.inner.write().upsert(state);
    }

    /// Cloned state of a single node.
    pub fn get(&self, node_id: &str) -> Option<NodeState> {
        self.inner.read().get(node_id).cloned()
    }

    /// Cloned snapshot of every node.
    pub fn snapshot(&self) -> Vec<NodeState> {
        self.inner.read().snapshot()
    }

    /// Number of known nodes.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
