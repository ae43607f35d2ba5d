use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object not found: {file_id}/{version_id}")]
    NotFound { file_id: String, version_id: String },

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Raised by callers that bound a node operation with a deadline.
    #[error("Operation timed out after {0:?}")]
    TimedOut(Duration),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    pub fn is_corruption(&self) -> bool {
        matches!(self, StorageError::Corruption(_))
    }
}
