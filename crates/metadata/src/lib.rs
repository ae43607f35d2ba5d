//! File metadata: records, versions and the stores that keep them.
//!
//! The coordinator only talks to the [`MetadataStore`] trait. Two backends
//! ship with the crate:
//! - [`InMemoryMetadataStore`] for tests and embedded use
//! - [`JsonFileMetadataStore`], a single JSON document on disk

pub mod error;
pub mod json;
pub mod memory;
pub mod record;
pub mod store;

pub use error::{MetadataError, Result};
pub use json::JsonFileMetadataStore;
pub use memory::InMemoryMetadataStore;
pub use record::{FileRecord, Version};
pub use store::{MetadataStore, Page};
