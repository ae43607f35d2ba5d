//! Hash ring data structure.
//!
//! Positions live in a `BTreeMap<Token, Vec<NodeId>>` guarded by a single
//! reader/writer lock. Lookups take the read side, membership changes take
//! the write side; both are bounded by the number of virtual nodes.
//!
//! Two virtual nodes hashing to the same position do not overwrite each
//! other: the position keeps an ordered list of owners (insertion order),
//! so every virtual node stays attributable to exactly one physical node and
//! removal is exact.

use crate::node::NodeId;
use crate::partitioner::{DigestPartitioner, Partitioner};
use crate::token::Token;
use crate::vnode::{VirtualNode, DEFAULT_VIRTUAL_NODES};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, warn};

/// Default number of distinct nodes returned by [`HashRing::get_nodes`].
pub const DEFAULT_REPLICA_FACTOR: usize = 2;

struct RingState<T> {
    positions: BTreeMap<T, Vec<NodeId>>,
    members: BTreeSet<NodeId>,
    vnode_count: usize,
}

impl<T> RingState<T> {
    fn new() -> Self {
        Self {
            positions: BTreeMap::new(),
            members: BTreeSet::new(),
            vnode_count: 0,
        }
    }
}

/// Consistent hash ring mapping keys to an ordered set of physical nodes.
pub struct HashRing<P: Partitioner = DigestPartitioner> {
    partitioner: P,
    vnodes_per_node: usize,
    replica_factor: usize,
    state: RwLock<RingState<P::TokenType>>,
}

impl HashRing<DigestPartitioner> {
    /// Ring with 150 virtual nodes per node and a replica factor of 2.
    pub fn new() -> Self {
        Self::with_config(DEFAULT_VIRTUAL_NODES, DEFAULT_REPLICA_FACTOR)
    }

    /// Ring with the digest partitioner. Zero values fall back to the defaults.
    pub fn with_config(vnodes_per_node: usize, replica_factor: usize) -> Self {
        Self::with_partitioner(DigestPartitioner, vnodes_per_node, replica_factor)
    }
}

impl Default for HashRing<DigestPartitioner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Partitioner> HashRing<P> {
    /// Ring with a custom partitioner. Zero values fall back to the defaults.
    pub fn with_partitioner(partitioner: P, vnodes_per_node: usize, replica_factor: usize) -> Self {
        let vnodes_per_node = if vnodes_per_node == 0 {
            DEFAULT_VIRTUAL_NODES
        } else {
            vnodes_per_node
        };
        let replica_factor = if replica_factor == 0 {
            DEFAULT_REPLICA_FACTOR
        } else {
            replica_factor
        };

        Self {
            partitioner,
            vnodes_per_node,
            replica_factor,
            state: RwLock::new(RingState::new()),
        }
    }

    /// Place `vnodes_per_node` virtual nodes for `node_id` on the ring.
    ///
    /// Returns `false` and leaves the ring untouched if the node is already a
    /// member.
    pub fn add_node(&self, node_id: impl Into<NodeId>) -> bool {
        let node_id = node_id.into();
        // Hash outside the lock; writers should hold it as briefly as possible.
        let vnodes: Vec<VirtualNode<P::TokenType>> = (0..self.vnodes_per_node)
            .map(|index| VirtualNode::from_index(&self.partitioner, &node_id, index))
            .collect();

        let mut guard = self.state.write();
        let state = &mut *guard;

        if !state.members.insert(node_id.clone()) {
            debug!(node = %node_id, "node already on ring");
            return false;
        }

        for vnode in vnodes {
            let owners = state.positions.entry(vnode.token).or_default();
            if !owners.is_empty() {
                warn!(
                    node = %node_id,
                    index = vnode.index,
                    position = ?vnode.token,
                    existing = ?owners,
                    "virtual node position collision"
                );
            }
            owners.push(vnode.node_id);
        }
        state.vnode_count += self.vnodes_per_node;

        debug!(
            node = %node_id,
            vnodes = self.vnodes_per_node,
            total = state.vnode_count,
            "added node to ring"
        );
        true
    }

    /// Remove every virtual node of `node_id`.
    ///
    /// Returns `false` if the node was not a member.
    pub fn remove_node(&self, node_id: &NodeId) -> bool {
        let tokens: Vec<P::TokenType> = (0..self.vnodes_per_node)
            .map(|index| VirtualNode::from_index(&self.partitioner, node_id, index).token)
            .collect();

        let mut guard = self.state.write();
        let state = &mut *guard;

        if !state.members.remove(node_id) {
            return false;
        }

        for token in tokens {
            let Some(owners) = state.positions.get_mut(&token) else {
                warn!(node = %node_id, position = ?token, "virtual node missing during removal");
                continue;
            };
            if let Some(idx) = owners.iter().position(|owner| owner == node_id) {
                owners.remove(idx);
                state.vnode_count -= 1;
            }
            if owners.is_empty() {
                state.positions.remove(&token);
            }
        }

        debug!(node = %node_id, total = state.vnode_count, "removed node from ring");
        true
    }

    /// Up to `replica_factor` distinct nodes for `key`, primary first.
    ///
    /// Walks clockwise from the first position at or after the key's token,
    /// wrapping past the end of the ring. Fewer nodes come back only when
    /// fewer distinct nodes are registered; an empty ring yields an empty
    /// list.
    pub fn get_nodes(&self, key: &[u8]) -> Vec<NodeId> {
        let token = self.partitioner.partition(key);
        let state = self.state.read();

        let wanted = self.replica_factor.min(state.members.len());
        let mut nodes: Vec<NodeId> = Vec::with_capacity(wanted);
        if wanted == 0 {
            return nodes;
        }

        let clockwise = state
            .positions
            .range(token..)
            .chain(state.positions.range(..token));

        for (_, owners) in clockwise {
            for owner in owners {
                if !nodes.contains(owner) {
                    nodes.push(owner.clone());
                    if nodes.len() == wanted {
                        return nodes;
                    }
                }
            }
        }

        nodes
    }

    /// First node of [`get_nodes`](Self::get_nodes), or `None` on an empty ring.
    pub fn primary_node(&self, key: &[u8]) -> Option<NodeId> {
        self.get_nodes(key).into_iter().next()
    }

    /// Every physical node currently on the ring (sorted by id).
    pub fn all_nodes(&self) -> Vec<NodeId> {
        self.state.read().members.iter().cloned().collect()
    }

    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.state.read().members.contains(node_id)
    }

    /// Number of distinct physical nodes.
    pub fn node_count(&self) -> usize {
        self.state.read().members.len()
    }

    /// Number of virtual nodes, always `vnodes_per_node * node_count()`.
    pub fn token_count(&self) -> usize {
        self.state.read().vnode_count
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().members.is_empty()
    }

    /// All `(token, node)` pairs in ring order. Colliding owners of one
    /// position appear in insertion order.
    pub fn tokens(&self) -> Vec<(P::TokenType, NodeId)> {
        let state = self.state.read();
        state
            .positions
            .iter()
            .flat_map(|(token, owners)| owners.iter().map(move |owner| (*token, owner.clone())))
            .collect()
    }

    /// Fraction of the token space each node is primary for.
    ///
    /// A position owns the arc from the previous position (exclusive) up to
    /// itself; on a collision the arc goes to the first owner, which is the
    /// node `get_nodes` would reach first.
    pub fn ownership(&self) -> BTreeMap<NodeId, f64> {
        let state = self.state.read();
        let space = <P::TokenType as Token>::space() as f64;
        let mut owned: BTreeMap<NodeId, u64> = BTreeMap::new();

        if state.positions.len() == 1 {
            if let Some(owner) = state.positions.values().next().and_then(|o| o.first()) {
                owned.insert(owner.clone(), <P::TokenType as Token>::space());
            }
        } else if let Some((last, _)) = state.positions.iter().next_back() {
            let mut prev = *last;
            for (token, owners) in &state.positions {
                if let Some(owner) = owners.first() {
                    *owned.entry(owner.clone()).or_default() += prev.distance_to(token);
                }
                prev = *token;
            }
        }

        owned
            .into_iter()
            .map(|(node, arc)| (node, arc as f64 / space))
            .collect()
    }

    pub fn replica_factor(&self) -> usize {
        self.replica_factor
    }

    pub fn vnodes_per_node(&self) -> usize {
        self.vnodes_per_node
    }

    pub fn partitioner_name(&self) -> &'static str {
        self.partitioner.name()
    }
}

impl<P: Partitioner> fmt::Debug for HashRing<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("HashRing")
            .field("partitioner", &self.partitioner.name())
            .field("vnodes_per_node", &self.vnodes_per_node)
            .field("replica_factor", &self.replica_factor)
            .field("nodes", &state.members)
            .field("tokens", &state.vnode_count)
            .finish()
    }
}

/// Builder for [`HashRing`].
///
/// ```
/// use corelib::ring::RingBuilder;
///
/// let ring = RingBuilder::new()
///     .with_vnodes(16)
///     .with_replica_factor(3)
///     .add_node("node-1")
///     .add_node("node-2")
///     .build();
/// assert_eq!(ring.token_count(), 32);
/// ```
#[derive(Debug)]
pub struct RingBuilder<P: Partitioner = DigestPartitioner> {
    partitioner: P,
    vnodes_per_node: usize,
    replica_factor: usize,
    nodes: Vec<NodeId>,
}

impl RingBuilder<DigestPartitioner> {
    pub fn new() -> Self {
        Self {
            partitioner: DigestPartitioner,
            vnodes_per_node: DEFAULT_VIRTUAL_NODES,
            replica_factor: DEFAULT_REPLICA_FACTOR,
            nodes: Vec::new(),
        }
    }
}

impl Default for RingBuilder<DigestPartitioner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Partitioner> RingBuilder<P> {
    pub fn with_vnodes(mut self, vnodes_per_node: usize) -> Self {
        self.vnodes_per_node = vnodes_per_node;
        self
    }

    pub fn with_replica_factor(mut self, replica_factor: usize) -> Self {
        self.replica_factor = replica_factor;
        self
    }

    /// Swap the partitioner, keeping every other setting.
    pub fn with_partitioner<Q: Partitioner>(self, partitioner: Q) -> RingBuilder<Q> {
        RingBuilder {
            partitioner,
            vnodes_per_node: self.vnodes_per_node,
            replica_factor: self.replica_factor,
            nodes: self.nodes,
        }
    }

    pub fn add_node(mut self, node_id: impl Into<NodeId>) -> Self {
        self.nodes.push(node_id.into());
        self
    }

    pub fn build(self) -> HashRing<P> {
        let ring = HashRing::with_partitioner(self.partitioner, self.vnodes_per_node, self.replica_factor);
        for node in self.nodes {
            ring.add_node(node);
        }
        ring
    }
}
