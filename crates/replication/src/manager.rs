//! The file manager: replication fan-out, failover reads and rollback.
//!
//! # Upload
//!
//! 1. Mint a fresh file id and version id
//! 2. Ask the ring for up to `replica_factor` candidate nodes
//! 3. Store on each candidate in ring order; a node failure is recorded and
//!    the loop carries on
//! 4. Check the outcome against the configured [`ConsistencyLevel`]; below
//!    it, undo the stores that did succeed and fail
//! 5. Save the [`FileRecord`]; if that fails, undo the stores and fail
//!
//! # Download
//!
//! Reads walk the node list frozen in the version record, not the current
//! ring, so placement survives membership changes. The first node that
//! returns verified bytes wins.
//!
//! # Locking
//!
//! No lock spans a fan-out. Each engine call only takes that node's lock, so
//! independent uploads proceed in parallel across nodes.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use corelib::{HashRing, NodeId, DEFAULT_REPLICA_FACTOR, DEFAULT_VIRTUAL_NODES};
use metadata::{FileRecord, MetadataStore, Page, Version};
use metrics::counter;
use storage::{StorageError, StorageNode};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{ConsistencyLevel, NodeRegistry, ReplicaPlacement, ReplicationError, Result};

/// Default bound on a single node-engine call.
pub const DEFAULT_NODE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    pub replica_factor: usize,
    pub virtual_nodes: usize,
    pub consistency: ConsistencyLevel,
    pub node_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            replica_factor: DEFAULT_REPLICA_FACTOR,
            virtual_nodes: DEFAULT_VIRTUAL_NODES,
            consistency: ConsistencyLevel::default(),
            node_timeout: DEFAULT_NODE_TIMEOUT,
        }
    }
}

/// Coordinates storage nodes, the ring and the metadata store.
pub struct FileManager {
    registry: NodeRegistry,
    ring: HashRing,
    metadata: Arc<dyn MetadataStore>,
    config: ManagerConfig,
}

impl FileManager {
    pub fn new(metadata: Arc<dyn MetadataStore>, config: ManagerConfig) -> Self {
        let ring = HashRing::with_config(config.virtual_nodes, config.replica_factor);
        info!(
            replica_factor = ring.replica_factor(),
            virtual_nodes = ring.vnodes_per_node(),
            consistency = %config.consistency,
            "file manager created"
        );
        Self {
            registry: NodeRegistry::new(),
            ring,
            metadata,
            config,
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn ring(&self) -> &HashRing {
        &self.ring
    }

    pub fn metadata(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    /// The registered engine for `id`, if any.
    pub fn node(&self, id: &NodeId) -> Option<Arc<StorageNode>> {
        self.registry.get(id)
    }

    /// Longest time one upload or download can spend in node calls: a store
    /// and a rollback delete per replica, each bounded by the node timeout.
    pub fn node_call_budget(&self) -> Duration {
        let calls = 2 * self.ring.replica_factor().max(1);
        self.config
            .node_timeout
            .saturating_mul(u32::try_from(calls).unwrap_or(u32::MAX))
    }

    /// Open a storage engine at `location` and place it on the ring.
    ///
    /// Nothing is registered if the engine cannot be opened or the id is
    /// already taken.
    pub async fn register_node(
        &self,
        id: impl Into<NodeId>,
        location: impl Into<PathBuf>,
    ) -> Result<()> {
        let id = id.into();
        if self.registry.contains(&id) {
            return Err(ReplicationError::AlreadyRegistered(id));
        }

        let node = StorageNode::open(id.clone(), location).await?;
        // The ring changes under the registry lock, so the two never disagree
        self.registry.insert_with(Arc::new(node), |id| {
            self.ring.add_node(id.clone());
        })?;

        info!(node = %id, nodes = self.registry.len(), "node registered");
        Ok(())
    }

    /// Take a node off the ring and out of the registry. Data it holds is
    /// not moved; reads fail over past it.
    pub fn unregister_node(&self, id: &NodeId) -> Result<()> {
        let removed = self.registry.remove_with(id, |id| {
            self.ring.remove_node(id);
        });
        if removed.is_none() {
            return Err(ReplicationError::NodeNotFound(id.clone()));
        }

        info!(node = %id, nodes = self.registry.len(), "node unregistered");
        Ok(())
    }

    pub async fn upload_file(
        &self,
        filename: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<FileRecord> {
        let file_id = Uuid::new_v4().to_string();
        let version_id = Uuid::new_v4().to_string();

        let candidates = self.ring.get_nodes(file_id.as_bytes());
        if candidates.is_empty() {
            counter!("filestore_upload_failures_total").increment(1);
            return Err(ReplicationError::NoNodesAvailable);
        }

        let mut placement = ReplicaPlacement::new(candidates.clone());
        for node_id in candidates {
            let Some(node) = self.registry.get(&node_id) else {
                warn!(node = %node_id, file_id = %file_id, "candidate node is not registered");
                placement.record_failure(node_id, "not registered");
                continue;
            };

            match self.bounded(node.store(&file_id, &version_id, data)).await {
                Ok(()) => {
                    debug!(node = %node_id, file_id = %file_id, "replica stored");
                    placement.record_success(node_id);
                }
                Err(e) => {
                    warn!(node = %node_id, file_id = %file_id, error = %e, "replica store failed");
                    counter!("filestore_node_store_failures_total", "node" => node_id.to_string())
                        .increment(1);
                    placement.record_failure(node_id, e);
                }
            }
        }

        if !placement.is_satisfied(self.config.consistency) {
            let needed = placement.required(self.config.consistency);
            error!(
                file_id = %file_id,
                needed,
                stored = placement.stored.len(),
                consistency = %self.config.consistency,
                "too few replicas stored, rolling back"
            );
            self.rollback(&file_id, &version_id, &placement.stored).await;
            counter!("filestore_upload_failures_total").increment(1);
            return Err(ReplicationError::InsufficientReplicas {
                file_id,
                needed,
                stored: placement.stored.len(),
            });
        }

        let version = Version::new(version_id.clone(), data.len() as u64, placement.stored.clone());
        let record = FileRecord::new(file_id.clone(), filename, content_type, version);

        if let Err(source) = self.metadata.save(&record).await {
            error!(file_id = %file_id, error = %source, "metadata save failed, rolling back");
            self.rollback(&file_id, &version_id, &placement.stored).await;
            counter!("filestore_upload_failures_total").increment(1);
            return Err(ReplicationError::RolledBack { file_id, source });
        }

        counter!("filestore_uploads_total").increment(1);
        info!(
            file_id = %file_id,
            filename,
            size = data.len(),
            stored = ?placement.stored,
            failed = placement.failures.len(),
            "file uploaded"
        );
        Ok(record)
    }

    /// Fetch a version's bytes with ordered failover across the nodes that
    /// stored it. `None` or an empty id selects the latest version.
    pub async fn download_file(
        &self,
        file_id: &str,
        version_id: Option<&str>,
    ) -> Result<(Bytes, FileRecord)> {
        let record = self.metadata.get(file_id).await?;

        let version = match version_id.filter(|v| !v.is_empty()) {
            Some(version_id) => record.version(version_id),
            None => record.latest_version(),
        }
        .cloned()
        .ok_or_else(|| ReplicationError::VersionNotFound {
            file_id: file_id.to_string(),
            version_id: version_id.unwrap_or("latest").to_string(),
        })?;

        let mut last_error: Option<StorageError> = None;
        for node_id in &version.nodes {
            let Some(node) = self.registry.get(node_id) else {
                debug!(node = %node_id, file_id, "replica node no longer registered, skipping");
                continue;
            };

            match self.bounded(node.retrieve(file_id, &version.version_id)).await {
                Ok(data) => {
                    counter!("filestore_downloads_total").increment(1);
                    debug!(node = %node_id, file_id, size = data.len(), "file downloaded");
                    return Ok((data, record));
                }
                Err(e) => {
                    warn!(node = %node_id, file_id, error = %e, "replica read failed, trying next");
                    counter!("filestore_replica_failovers_total").increment(1);
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(source) => ReplicationError::AllReplicasFailed {
                file_id: file_id.to_string(),
                source,
            },
            None => ReplicationError::NoReplicaAvailable(file_id.to_string()),
        })
    }

    pub async fn get_version(&self, file_id: &str, version_id: &str) -> Result<Bytes> {
        let (data, _) = self.download_file(file_id, Some(version_id)).await?;
        Ok(data)
    }

    /// Remove a file's data from every node that ever held a version of it,
    /// then its metadata. Per-node failures are logged and skipped.
    pub async fn delete_file(&self, file_id: &str) -> Result<()> {
        let record = self.metadata.get(file_id).await?;

        let mut failures = 0usize;
        for node_id in record.all_nodes() {
            let Some(node) = self.registry.get(&node_id) else {
                continue;
            };
            if let Err(e) = self.bounded(node.delete_all(file_id)).await {
                warn!(node = %node_id, file_id, error = %e, "replica delete failed");
                failures += 1;
            }
        }

        self.metadata.delete(file_id).await?;

        counter!("filestore_deletes_total").increment(1);
        info!(file_id, failures, "file deleted");
        Ok(())
    }

    pub async fn get_file_info(&self, file_id: &str) -> Result<FileRecord> {
        Ok(self.metadata.get(file_id).await?)
    }

    pub async fn list_files(&self, page: u32, page_size: u32) -> Result<Page> {
        Ok(self.metadata.list(page, page_size).await?)
    }

    /// A node is healthy when its storage size can be computed.
    pub async fn health_check(&self) -> BTreeMap<NodeId, bool> {
        let mut health = BTreeMap::new();
        for node in self.registry.snapshot() {
            let healthy = match self.bounded(node.storage_size()).await {
                Ok(_) => true,
                Err(e) => {
                    warn!(node = %node.id(), error = %e, "node unhealthy");
                    false
                }
            };
            health.insert(node.id().clone(), healthy);
        }
        health
    }

    pub fn node_count(&self) -> usize {
        self.registry.len()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.registry.ids()
    }

    /// Best-effort removal of a version from the nodes that stored it.
    async fn rollback(&self, file_id: &str, version_id: &str, nodes: &[NodeId]) {
        for node_id in nodes {
            let Some(node) = self.registry.get(node_id) else {
                continue;
            };
            if let Err(e) = self.bounded(node.delete(file_id, version_id)).await {
                warn!(node = %node_id, file_id, error = %e, "rollback delete failed, data left behind");
            }
        }
    }

    async fn bounded<T, F>(&self, operation: F) -> storage::Result<T>
    where
        F: Future<Output = storage::Result<T>>,
    {
        with_deadline(self.config.node_timeout, operation).await
    }
}

impl fmt::Debug for FileManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileManager")
            .field("config", &self.config)
            .field("nodes", &self.registry.ids())
            .field("ring", &self.ring)
            .finish_non_exhaustive()
    }
}

/// Run a node-engine call, giving up with [`StorageError::TimedOut`] after
/// `timeout`. The abandoned call is dropped.
async fn with_deadline<T, F>(timeout: Duration, operation: F) -> storage::Result<T>
where
    F: Future<Output = storage::Result<T>>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::TimedOut(timeout)),
    }
}
