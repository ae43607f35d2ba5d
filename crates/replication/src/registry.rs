//! Live storage node engines, keyed by node id.

use std::collections::HashMap;
use std::sync::Arc;

use corelib::NodeId;
use parking_lot::RwLock;
use storage::StorageNode;

use crate::{ReplicationError, Result};

/// Registry of storage engines shared by every in-flight operation.
///
/// Lookups clone the `Arc` under a brief read lock; the lock is never held
/// across an `.await`, so registration changes only wait for those clones.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: RwLock<HashMap<NodeId, Arc<StorageNode>>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `node` unless its id is already taken.
    pub fn insert(&self, node: Arc<StorageNode>) -> Result<()> {
        self.insert_with(node, |_| {})
    }

    /// Add `node` and run `on_insert` before the write lock is released.
    /// `on_insert` does not run when the id is already taken.
    pub fn insert_with<F>(&self, node: Arc<StorageNode>, on_insert: F) -> Result<()>
    where
        F: FnOnce(&NodeId),
    {
        let mut nodes = self.nodes.write();
        if nodes.contains_key(node.id()) {
            return Err(ReplicationError::AlreadyRegistered(node.id().clone()));
        }
        on_insert(node.id());
        nodes.insert(node.id().clone(), node);
        Ok(())
    }

    pub fn remove(&self, id: &NodeId) -> Option<Arc<StorageNode>> {
        self.remove_with(id, |_| {})
    }

    /// Remove `id` and run `on_remove` before the write lock is released.
    /// `on_remove` only runs when something was removed.
    pub fn remove_with<F>(&self, id: &NodeId, on_remove: F) -> Option<Arc<StorageNode>>
    where
        F: FnOnce(&NodeId),
    {
        let mut nodes = self.nodes.write();
        let removed = nodes.remove(id);
        if removed.is_some() {
            on_remove(id);
        }
        removed
    }

    pub fn get(&self, id: &NodeId) -> Option<Arc<StorageNode>> {
        self.nodes.read().get(id).cloned()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Every registered engine, sorted by id.
    pub fn snapshot(&self) -> Vec<Arc<StorageNode>> {
        let mut nodes: Vec<Arc<StorageNode>> = self.nodes.read().values().cloned().collect();
        nodes.sort_by(|a, b| a.id().cmp(b.id()));
        nodes
    }
}
