//! Virtual node abstractions.
//!
//! # Virtual Nodes (VNodes) Concept
//!
//! Virtual nodes are a technique to improve load distribution in consistent hashing.
//! Instead of each physical node having a single token on the ring, each node has
//! multiple tokens (virtual nodes). This provides:
//!
//! 1. **Better Load Distribution**: More tokens = smoother distribution of keys
//! 2. **Gradual Rebalancing**: When nodes join/leave, only a fraction of keys move
//! 3. **Fault Tolerance**: Failure of one node affects fewer keys (distributed across vnodes)
//!
//! # Performance Characteristics
//!
//! - **Memory**: O(v) where v = number of vnodes per node
//! - **Lookup**: O(log n) where n = total vnodes (not affected by vnode count per node)
//! - **Rebalancing**: O(k/v) keys move when a node joins/leaves (k = total keys, v = vnodes/node)
//!
//! The default of 150 vnodes per node keeps rebuild cost low for the handful
//! of storage nodes a single coordinator manages.

use crate::node::NodeId;
use crate::partitioner::Partitioner;
use crate::token::Token;

/// Default number of virtual nodes per physical node.
pub const DEFAULT_VIRTUAL_NODES: usize = 150;

/// A virtual node on the hash ring.
///
/// Represents a single token position owned by a physical node. A virtual
/// node has no identity outside the ring: it is fully determined by the
/// owning node id, its replica index and the partitioner.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VirtualNode<T: Token> {
    /// Token position on the ring, the hash of `"{node_id}#{index}"`.
    pub token: T,

    /// The physical node that owns this virtual node.
    pub node_id: NodeId,

    /// Replica index in `0..vnodes_per_node`.
    pub index: usize,
}

impl<T: Token> VirtualNode<T> {
    /// Create a virtual node from a node ID and vnode index, hashing
    /// `"{node_id}#{index}"` with the given partitioner.
    pub fn from_index<P>(partitioner: &P, node_id: &NodeId, index: usize) -> Self
    where
        P: Partitioner<TokenType = T>,
    {
        let token = partitioner.partition(Self::key(node_id, index).as_bytes());
        Self {
            token,
            node_id: node_id.clone(),
            index,
        }
    }

    /// The string hashed to place virtual node `index` of `node_id`.
    pub fn key(node_id: &NodeId, index: usize) -> String {
        format!("{}#{}", node_id, index)
    }

    /// Clockwise distance to another virtual node.
    #[inline]
    pub fn distance_to(&self, other: &Self) -> u64 {
        self.token.distance_to(&other.token)
    }
}

impl<T: Token + std::fmt::Display> std::fmt::Display for VirtualNode<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VNode(token={}, node={}, index={})", self.token, self.node_id, self.index)
    }
}
