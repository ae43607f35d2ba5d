//! Core library for consistent hashing implementation.
//!
//! This crate provides the fundamental abstractions for consistent hashing:
//! - Token types and implementations
//! - Partitioner algorithms
//! - Node and virtual node abstractions
//! - The hash ring with replica lookup

pub mod error;
pub mod node;
pub mod partitioner;
pub mod ring;
pub mod token;
pub mod vnode;

pub use error::{Error, Result};
pub use node::NodeId;
pub use partitioner::{DigestPartitioner, Partitioner};
pub use ring::{HashRing, RingBuilder, DEFAULT_REPLICA_FACTOR};
pub use token::{DigestToken, Token};
pub use vnode::{VirtualNode, DEFAULT_VIRTUAL_NODES};
