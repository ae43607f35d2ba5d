//! Token abstraction module for consistent hashing.
//!
//! Tokens represent positions on the hash ring and must be comparable,
//! hashable, and thread-safe.

pub mod digest;
pub mod traits;

pub use digest::DigestToken;
pub use traits::Token;
