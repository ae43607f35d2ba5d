use corelib::NodeId;
use metadata::MetadataError;
use storage::StorageError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReplicationError>;

/// Coarse failure category reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No such file, version or node.
    NotFound,
    /// No candidate nodes, too few successful stores, or every replica read failed.
    Unavailable,
    /// Stored bytes no longer match their checksum.
    Integrity,
    /// Metadata commit failed after some nodes stored data; those stores were undone.
    PartialWriteRolledBack,
    Io,
    InvalidArgument,
}

#[derive(Debug, Error)]
pub enum ReplicationError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Version {version_id} not found for file {file_id}")]
    VersionNotFound { file_id: String, version_id: String },

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Node already registered: {0}")]
    AlreadyRegistered(NodeId),

    #[error("No nodes available")]
    NoNodesAvailable,

    #[error("Insufficient replicas for {file_id}: needed {needed}, stored {stored}")]
    InsufficientReplicas {
        file_id: String,
        needed: usize,
        stored: usize,
    },

    #[error("Failed to retrieve {file_id} from any replica: {source}")]
    AllReplicasFailed {
        file_id: String,
        #[source]
        source: StorageError,
    },

    #[error("No registered node holds {0}")]
    NoReplicaAvailable(String),

    #[error("Metadata save failed for {file_id}, upload rolled back: {source}")]
    RolledBack {
        file_id: String,
        #[source]
        source: MetadataError,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Metadata error: {0}")]
    Metadata(MetadataError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<MetadataError> for ReplicationError {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::NotFound(file_id) => ReplicationError::FileNotFound(file_id),
            other => ReplicationError::Metadata(other),
        }
    }
}

impl ReplicationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReplicationError::FileNotFound(_)
            | ReplicationError::VersionNotFound { .. }
            | ReplicationError::NodeNotFound(_) => ErrorKind::NotFound,
            ReplicationError::NoNodesAvailable
            | ReplicationError::InsufficientReplicas { .. }
            | ReplicationError::AllReplicasFailed { .. }
            | ReplicationError::NoReplicaAvailable(_) => ErrorKind::Unavailable,
            ReplicationError::RolledBack { .. } => ErrorKind::PartialWriteRolledBack,
            ReplicationError::Storage(e) => match e {
                StorageError::NotFound { .. } => ErrorKind::NotFound,
                StorageError::Corruption(_) => ErrorKind::Integrity,
                StorageError::InvalidKey(_) => ErrorKind::InvalidArgument,
                StorageError::TimedOut(_) => ErrorKind::Unavailable,
                StorageError::Io(_) => ErrorKind::Io,
            },
            ReplicationError::Metadata(MetadataError::Closed) => ErrorKind::Unavailable,
            ReplicationError::Metadata(_) => ErrorKind::Io,
            ReplicationError::AlreadyRegistered(_) | ReplicationError::InvalidArgument(_) => {
                ErrorKind::InvalidArgument
            }
        }
    }
}
