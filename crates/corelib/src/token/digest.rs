//! 32-bit token derived from a cryptographic digest.

use crate::token::traits::Token;
use std::fmt;

/// Ring position in the 32-bit circular hash space.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct DigestToken(pub u32);

impl Token for DigestToken {
    fn space() -> u64 {
        1 << 32
    }

    fn distance_to(&self, other: &Self) -> u64 {
        u64::from(other.0.wrapping_sub(self.0))
    }
}

impl DigestToken {
    /// Hash `data` with BLAKE3 and take the first 4 digest bytes as a
    /// big-endian integer.
    pub fn from_bytes(data: &[u8]) -> Self {
        let digest = blake3::hash(data);
        let bytes = digest.as_bytes();
        DigestToken(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Creates a token from a string key.
    pub fn from_key(key: &str) -> Self {
        Self::from_bytes(key.as_bytes())
    }
}

impl fmt::Display for DigestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}
