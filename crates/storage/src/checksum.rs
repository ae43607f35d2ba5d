use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of `data`.
pub fn checksum(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Incremental form of [`checksum`] for payloads that arrive in pieces.
#[derive(Default)]
pub struct Checksummer {
    hasher: Sha256,
}

impl Checksummer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
    }

    pub fn finalize(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}
