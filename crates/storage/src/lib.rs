//! Storage node engine.
//!
//! Each [`StorageNode`] owns one private directory and persists payloads
//! keyed by `(file_id, version_id)`:
//!
//! ```text
//! <location>/<file_id>/<version_id>/data
//! <location>/<file_id>/<version_id>/checksum   (hex SHA-256 of data)
//! ```
//!
//! Every read recomputes the checksum and refuses to hand out bytes that no
//! longer match it.

mod checksum;
mod engine;
mod error;

pub use checksum::{checksum, Checksummer};
pub use engine::StorageNode;
pub use error::{Result, StorageError};
