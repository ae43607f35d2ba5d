//! Core token trait definitions.

use std::fmt::Debug;
use std::hash::Hash;

/// Minimal token trait for the hash ring.
///
/// Tokens are immutable, comparable positions. Implementations must be
/// thread-safe and cheap to copy, compare and hash.
pub trait Token: Copy + Ord + Hash + Send + Sync + Debug + 'static {
    /// Number of distinct positions in the token space.
    fn space() -> u64;

    /// Clockwise distance from `self` to `other` on the ring.
    ///
    /// The distance from a token to itself is zero.
    fn distance_to(&self, other: &Self) -> u64;
}
