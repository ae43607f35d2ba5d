//! Outcome of one upload's fan-out across its candidate nodes.

use corelib::NodeId;

use crate::ConsistencyLevel;

/// Which candidates accepted a write and which did not.
///
/// `stored` keeps ring order, so the first entry is the primary whenever the
/// primary succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicaPlacement {
    pub candidates: Vec<NodeId>,
    pub stored: Vec<NodeId>,
    pub failures: Vec<(NodeId, String)>,
}

impl ReplicaPlacement {
    pub fn new(candidates: Vec<NodeId>) -> Self {
        Self {
            candidates,
            stored: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn record_success(&mut self, node: NodeId) {
        self.stored.push(node);
    }

    pub fn record_failure(&mut self, node: NodeId, reason: impl ToString) {
        self.failures.push((node, reason.to_string()));
    }

    pub fn required(&self, level: ConsistencyLevel) -> usize {
        level.required(self.candidates.len())
    }

    pub fn is_satisfied(&self, level: ConsistencyLevel) -> bool {
        level.is_satisfied(self.candidates.len(), self.stored.len())
    }
}
