//! Digest partitioner implementation.

use crate::partitioner::traits::Partitioner;
use crate::token::digest::DigestToken;

/// Partitioner that places keys by the leading 32 bits of their BLAKE3 digest.
///
/// Only the uniform bit distribution of the digest matters here; the digest
/// itself never leaves the ring.
#[derive(Clone, Copy, Debug, Default)]
pub struct DigestPartitioner;

impl Partitioner for DigestPartitioner {
    type TokenType = DigestToken;

    fn partition(&self, key: &[u8]) -> Self::TokenType {
        DigestToken::from_bytes(key)
    }

    fn name(&self) -> &'static str {
        "DigestPartitioner"
    }
}
