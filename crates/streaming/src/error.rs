use std::time::Duration;

use replication::{ErrorKind, ReplicationError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StreamingError>;

#[derive(Debug, Error)]
pub enum StreamingError {
    #[error(transparent)]
    Replication(#[from] ReplicationError),

    #[error("Request deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("Request deadline {requested:?} must exceed the node-call budget of {budget:?}")]
    DeadlineTooShort { requested: Duration, budget: Duration },
}

impl StreamingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StreamingError::Replication(e) => e.kind(),
            StreamingError::DeadlineExceeded(_) => ErrorKind::Unavailable,
            StreamingError::DeadlineTooShort { .. } => ErrorKind::InvalidArgument,
        }
    }
}
