//! Replication coordinator for the file store.
//!
//! This crate ties the hash ring, the storage node engines and the metadata
//! store together:
//! - [`FileManager`] drives upload fan-out, failover reads and deletion
//! - [`NodeRegistry`] holds the live storage engines
//! - [`ConsistencyLevel`] sets how many replicas an upload needs
//! - [`ReplicaPlacement`] records where one upload landed

pub mod consistency;
pub mod error;
pub mod manager;
pub mod placement;
pub mod registry;

pub use consistency::ConsistencyLevel;
pub use error::{ErrorKind, ReplicationError, Result};
pub use manager::{FileManager, ManagerConfig, DEFAULT_NODE_TIMEOUT};
pub use placement::ReplicaPlacement;
pub use registry::NodeRegistry;
