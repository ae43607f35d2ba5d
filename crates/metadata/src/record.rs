//! Persisted file records.

use chrono::{DateTime, Utc};
use corelib::NodeId;
use serde::{Deserialize, Serialize};

/// One immutable stored payload of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub version_id: String,
    pub size: u64,
    /// Nodes holding this version, in the order they were written.
    pub nodes: Vec<NodeId>,
    pub created_at: DateTime<Utc>,
}

impl Version {
    pub fn new(version_id: impl Into<String>, size: u64, nodes: Vec<NodeId>) -> Self {
        Self {
            version_id: version_id.into(),
            size,
            nodes,
            created_at: Utc::now(),
        }
    }
}

/// Durable description of a file: identity, versions and replica placement.
///
/// `versions` is kept in creation order, so the last entry is the latest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_id: String,
    pub filename: String,
    pub size: u64,
    pub content_type: String,
    pub versions: Vec<Version>,
    pub replicas: Vec<NodeId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    /// A fresh record holding a single version. `replicas` mirrors the
    /// version's node list.
    pub fn new(
        file_id: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        version: Version,
    ) -> Self {
        let now = Utc::now();
        Self {
            file_id: file_id.into(),
            filename: filename.into(),
            size: version.size,
            content_type: content_type.into(),
            replicas: dedup(version.nodes.iter().cloned()),
            versions: vec![version],
            created_at: now,
            updated_at: now,
        }
    }

    pub fn latest_version(&self) -> Option<&Version> {
        self.versions.last()
    }

    pub fn version(&self, version_id: &str) -> Option<&Version> {
        self.versions.iter().find(|v| v.version_id == version_id)
    }

    /// Every node that holds, or ever held, data for this file: `replicas`
    /// followed by any node only named by an older version.
    pub fn all_nodes(&self) -> Vec<NodeId> {
        dedup(
            self.replicas
                .iter()
                .chain(self.versions.iter().flat_map(|v| v.nodes.iter()))
                .cloned(),
        )
    }
}

fn dedup(nodes: impl Iterator<Item = NodeId>) -> Vec<NodeId> {
    let mut out: Vec<NodeId> = Vec::new();
    for node in nodes {
        if !out.contains(&node) {
            out.push(node);
        }
    }
    out
}
