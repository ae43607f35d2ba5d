//! Consistent hash ring implementation.
//!
//! The ring manages token positions and provides efficient lookup
//! operations for finding nodes responsible for keys.

#[allow(clippy::module_inception)]
pub mod ring;

pub use ring::{HashRing, RingBuilder, DEFAULT_REPLICA_FACTOR};
