//! Request and response shapes exchanged with clients.
//!
//! Payload-carrying types hold [`Bytes`] and are not serialized; everything
//! else is plain `serde` data so a front end can render it directly.

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::SecondsFormat;
use corelib::NodeId;
use metadata::FileRecord;
use serde::{Deserialize, Serialize};

/// One piece of a streamed upload. Only the first chunk's name and content
/// type are used.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadChunk {
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
}

/// A complete upload, after chunk assembly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadRequest {
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub file_id: String,
    pub version_id: String,
    pub size: u64,
    pub node_locations: Vec<NodeId>,
    pub success: bool,
    pub message: String,
}

impl UploadResponse {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            ..Self::default()
        }
    }
}

/// A whole downloaded version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResponse {
    pub data: Bytes,
    pub content_type: String,
    pub total_size: u64,
}

/// One transfer-sized piece of a download. `total_size` and `content_type`
/// repeat on every chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadChunk {
    pub data: Bytes,
    pub total_size: u64,
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

/// Client-facing projection of a [`FileRecord`]. Timestamps are RFC 3339.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub file_id: String,
    pub filename: String,
    pub size: u64,
    pub content_type: String,
    pub created_at: String,
    pub updated_at: String,
    pub versions: Vec<String>,
    pub replicas: Vec<NodeId>,
}

impl From<&FileRecord> for FileInfo {
    fn from(record: &FileRecord) -> Self {
        Self {
            file_id: record.file_id.clone(),
            filename: record.filename.clone(),
            size: record.size,
            content_type: record.content_type.clone(),
            created_at: record.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            updated_at: record.updated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            versions: record.versions.iter().map(|v| v.version_id.clone()).collect(),
            replicas: record.replicas.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListFilesResponse {
    pub files: Vec<FileInfo>,
    pub total_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub node_count: usize,
    pub nodes: BTreeMap<NodeId, bool>,
}

impl HealthResponse {
    pub fn all_healthy(&self) -> bool {
        self.nodes.values().all(|healthy| *healthy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metadata::Version;

    #[test]
    fn test_file_info_projection() {
        let record = FileRecord::new(
            "f1",
            "a.txt",
            "text/plain",
            Version::new("v1", 5, vec![NodeId::from("node-1")]),
        );

        let info = FileInfo::from(&record);

        assert_eq!(info.file_id, "f1");
        assert_eq!(info.versions, vec!["v1".to_string()]);
        assert_eq!(info.replicas, vec![NodeId::from("node-1")]);
        assert!(info.created_at.ends_with('Z'), "{}", info.created_at);
    }

    #[test]
    fn test_failed_upload_response() {
        let response = UploadResponse::failed("Upload failed: No nodes available");
        assert!(!response.success);
        assert!(response.file_id.is_empty());
        assert!(response.node_locations.is_empty());
    }
}
