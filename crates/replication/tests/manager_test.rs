//! End-to-end coordinator tests over real storage directories.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use corelib::NodeId;
use metadata::{
    FileRecord, InMemoryMetadataStore, MetadataError, MetadataStore, Page, Version,
};
use replication::{ConsistencyLevel, ErrorKind, FileManager, ManagerConfig, ReplicationError};
use tempfile::TempDir;
use tokio::io::DuplexStream;
use tokio::task::JoinHandle;

struct Cluster {
    dir: TempDir,
    store: Arc<InMemoryMetadataStore>,
    manager: Arc<FileManager>,
}

impl Cluster {
    async fn new(nodes: usize, replica_factor: usize, consistency: ConsistencyLevel) -> Self {
        Self::with_config(
            nodes,
            ManagerConfig {
                replica_factor,
                consistency,
                ..ManagerConfig::default()
            },
        )
        .await
    }

    async fn with_config(nodes: usize, config: ManagerConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryMetadataStore::new());
        let manager = Arc::new(FileManager::new(store.clone(), config));

        for i in 1..=nodes {
            let id = format!("node-{}", i);
            manager.register_node(id.as_str(), dir.path().join(&id)).await.unwrap();
        }

        Self { dir, store, manager }
    }

    fn node_path(&self, id: &NodeId) -> PathBuf {
        self.dir.path().join(id.as_str())
    }

    /// Replace a node's directory with a plain file so every write to it fails.
    fn break_node(&self, id: &NodeId) {
        let path = self.node_path(id);
        std::fs::remove_dir_all(&path).unwrap();
        std::fs::write(&path, b"not a directory").unwrap();
    }

    /// Hold a node's write lock with a streaming write whose source never
    /// sends anything, so every other call on that node waits. Dropping the
    /// returned writer lets the write finish.
    async fn stall_node(&self, id: &NodeId) -> (DuplexStream, JoinHandle<storage::Result<u64>>) {
        let node = self.manager.node(id).unwrap();
        let marker = self.node_path(id).join(STALLED).join("v").join("data");
        let (writer, reader) = tokio::io::duplex(64);
        let task = tokio::spawn(async move { node.replicate_from_stream(STALLED, "v", reader).await });

        while !marker.exists() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        (writer, task)
    }
}

const STALLED: &str = "stalled-write";

fn short_timeouts(replica_factor: usize, consistency: ConsistencyLevel) -> ManagerConfig {
    ManagerConfig {
        replica_factor,
        consistency,
        node_timeout: Duration::from_millis(200),
        ..ManagerConfig::default()
    }
}

fn data_path(node_dir: &Path, record: &FileRecord) -> PathBuf {
    let version = record.latest_version().unwrap();
    node_dir.join(&record.file_id).join(&version.version_id).join("data")
}

fn file_dirs(node_dir: &Path) -> usize {
    std::fs::read_dir(node_dir).unwrap().count()
}

/// Delegates to an in-memory store but refuses every save.
#[derive(Default)]
struct FailingSaveStore {
    inner: InMemoryMetadataStore,
}

#[async_trait]
impl MetadataStore for FailingSaveStore {
    async fn save(&self, _record: &FileRecord) -> metadata::Result<()> {
        Err(MetadataError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "backend unreachable",
        )))
    }

    async fn get(&self, file_id: &str) -> metadata::Result<FileRecord> {
        self.inner.get(file_id).await
    }

    async fn delete(&self, file_id: &str) -> metadata::Result<()> {
        self.inner.delete(file_id).await
    }

    async fn list(&self, page: u32, page_size: u32) -> metadata::Result<Page> {
        self.inner.list(page, page_size).await
    }

    async fn add_version(&self, file_id: &str, version: Version) -> metadata::Result<()> {
        self.inner.add_version(file_id, version).await
    }

    async fn close(&self) -> metadata::Result<()> {
        self.inner.close().await
    }
}

// ============================================================================
// Upload / Download
// ============================================================================

#[tokio::test]
async fn test_upload_then_download() {
    let cluster = Cluster::new(3, 2, ConsistencyLevel::One).await;

    let record = cluster
        .manager
        .upload_file("a.txt", b"hello", "text/plain")
        .await
        .unwrap();

    assert_eq!(record.size, 5);
    assert_eq!(record.filename, "a.txt");
    assert_eq!(record.content_type, "text/plain");
    assert_eq!(record.replicas.len(), 2);
    assert_eq!(record.versions.len(), 1);
    assert_eq!(record.versions[0].nodes, record.replicas);

    let (data, fetched) = cluster.manager.download_file(&record.file_id, None).await.unwrap();
    assert_eq!(&data[..], b"hello");
    assert_eq!(fetched.file_id, record.file_id);

    // Empty version id also means latest
    let (data, _) = cluster.manager.download_file(&record.file_id, Some("")).await.unwrap();
    assert_eq!(&data[..], b"hello");
}

#[tokio::test]
async fn test_replicas_follow_ring_order() {
    let cluster = Cluster::new(3, 2, ConsistencyLevel::One).await;

    let record = cluster.manager.upload_file("a.bin", b"xyz", "").await.unwrap();

    let expected = cluster.manager.ring().get_nodes(record.file_id.as_bytes());
    assert_eq!(record.replicas, expected);
    for node in &record.replicas {
        assert!(data_path(&cluster.node_path(node), &record).exists());
    }
}

#[tokio::test]
async fn test_upload_with_no_nodes_is_unavailable() {
    let cluster = Cluster::new(0, 2, ConsistencyLevel::One).await;

    let err = cluster
        .manager
        .upload_file("a.txt", b"hello", "text/plain")
        .await
        .unwrap_err();

    assert!(matches!(err, ReplicationError::NoNodesAvailable));
    assert_eq!(err.kind(), ErrorKind::Unavailable);
    assert!(cluster.store.is_empty());
}

#[tokio::test]
async fn test_upload_survives_one_broken_node() {
    let cluster = Cluster::new(2, 2, ConsistencyLevel::One).await;
    let broken = NodeId::from("node-1");
    cluster.break_node(&broken);

    let record = cluster.manager.upload_file("a.txt", b"hello", "text/plain").await.unwrap();

    assert_eq!(record.replicas, vec![NodeId::from("node-2")]);
    let (data, _) = cluster.manager.download_file(&record.file_id, None).await.unwrap();
    assert_eq!(&data[..], b"hello");
}

#[tokio::test]
async fn test_upload_counts_stuck_node_as_failure() {
    let cluster = Cluster::with_config(2, short_timeouts(2, ConsistencyLevel::One)).await;
    let stuck = NodeId::from("node-1");
    let (writer, stalled) = cluster.stall_node(&stuck).await;

    let record = cluster.manager.upload_file("a.txt", b"hello", "text/plain").await.unwrap();

    // The fan-out moved past the stuck node instead of waiting on it
    assert_eq!(record.replicas, vec![NodeId::from("node-2")]);
    assert!(!cluster.node_path(&stuck).join(&record.file_id).exists());

    drop(writer);
    stalled.await.unwrap().unwrap();
    let (data, _) = cluster.manager.download_file(&record.file_id, None).await.unwrap();
    assert_eq!(&data[..], b"hello");
}

#[tokio::test]
async fn test_stuck_node_below_quorum_rolls_back() {
    let cluster = Cluster::with_config(2, short_timeouts(2, ConsistencyLevel::All)).await;
    let stuck = NodeId::from("node-1");
    let (writer, stalled) = cluster.stall_node(&stuck).await;

    let err = cluster.manager.upload_file("a.txt", b"hello", "").await.unwrap_err();

    assert!(matches!(err, ReplicationError::InsufficientReplicas { needed: 2, stored: 1, .. }));
    assert_eq!(file_dirs(&cluster.node_path(&NodeId::from("node-2"))), 0);
    assert!(cluster.store.is_empty());

    drop(writer);
    stalled.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_upload_fails_when_every_node_fails() {
    let cluster = Cluster::new(2, 2, ConsistencyLevel::One).await;
    cluster.break_node(&NodeId::from("node-1"));
    cluster.break_node(&NodeId::from("node-2"));

    let err = cluster.manager.upload_file("a.txt", b"hello", "").await.unwrap_err();

    assert!(matches!(err, ReplicationError::InsufficientReplicas { stored: 0, .. }));
    assert_eq!(err.kind(), ErrorKind::Unavailable);
    assert!(cluster.store.is_empty());
}

#[tokio::test]
async fn test_metadata_failure_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let manager = FileManager::new(Arc::new(FailingSaveStore::default()), ManagerConfig::default());
    for id in ["node-1", "node-2", "node-3"] {
        manager.register_node(id, dir.path().join(id)).await.unwrap();
    }

    let err = manager.upload_file("a.txt", b"hello", "text/plain").await.unwrap_err();

    assert!(matches!(err, ReplicationError::RolledBack { .. }));
    assert_eq!(err.kind(), ErrorKind::PartialWriteRolledBack);
    for id in ["node-1", "node-2", "node-3"] {
        assert_eq!(file_dirs(&dir.path().join(id)), 0, "data left on {}", id);
    }
}

// ============================================================================
// Consistency levels
// ============================================================================

#[tokio::test]
async fn test_quorum_requires_majority() {
    let cluster = Cluster::new(3, 3, ConsistencyLevel::Quorum).await;
    cluster.break_node(&NodeId::from("node-1"));

    // Two of three is a majority
    let record = cluster.manager.upload_file("a.txt", b"hello", "").await.unwrap();
    assert_eq!(record.replicas.len(), 2);

    cluster.break_node(&NodeId::from("node-2"));
    let err = cluster.manager.upload_file("b.txt", b"world", "").await.unwrap_err();

    assert!(matches!(
        err,
        ReplicationError::InsufficientReplicas { needed: 2, stored: 1, .. }
    ));
    // The lone successful store was undone, the earlier file is untouched
    let survivor = cluster.node_path(&NodeId::from("node-3"));
    assert_eq!(file_dirs(&survivor), 1);
    assert_eq!(cluster.store.len(), 1);
}

#[tokio::test]
async fn test_all_requires_every_candidate() {
    let cluster = Cluster::new(3, 3, ConsistencyLevel::All).await;
    assert_eq!(cluster.manager.upload_file("a", b"1", "").await.unwrap().replicas.len(), 3);

    cluster.break_node(&NodeId::from("node-2"));
    let err = cluster.manager.upload_file("b", b"2", "").await.unwrap_err();
    assert!(matches!(err, ReplicationError::InsufficientReplicas { needed: 3, stored: 2, .. }));
}

// ============================================================================
// Failover
// ============================================================================

#[tokio::test]
async fn test_download_fails_over_past_stuck_node() {
    let cluster = Cluster::with_config(3, short_timeouts(2, ConsistencyLevel::One)).await;
    let record = cluster.manager.upload_file("a.txt", b"hello", "").await.unwrap();
    let version = record.latest_version().unwrap().clone();
    let (writer, stalled) = cluster.stall_node(&version.nodes[0]).await;

    let (data, _) = cluster.manager.download_file(&record.file_id, None).await.unwrap();
    assert_eq!(&data[..], b"hello");

    // With every replica stuck the timeout surfaces as the last error
    let (second_writer, second_stalled) = cluster.stall_node(&version.nodes[1]).await;
    let err = cluster.manager.download_file(&record.file_id, None).await.unwrap_err();
    assert!(matches!(
        err,
        ReplicationError::AllReplicasFailed {
            source: storage::StorageError::TimedOut(_),
            ..
        }
    ));
    assert_eq!(err.kind(), ErrorKind::Unavailable);

    drop(writer);
    drop(second_writer);
    stalled.await.unwrap().unwrap();
    second_stalled.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_download_fails_over_past_corruption() {
    let cluster = Cluster::new(3, 2, ConsistencyLevel::One).await;
    let record = cluster.manager.upload_file("a.txt", b"hello", "").await.unwrap();

    let first = &record.versions[0].nodes[0];
    std::fs::write(data_path(&cluster.node_path(first), &record), b"jello").unwrap();

    let (data, _) = cluster.manager.download_file(&record.file_id, None).await.unwrap();
    assert_eq!(&data[..], b"hello");

    let second = &record.versions[0].nodes[1];
    std::fs::write(data_path(&cluster.node_path(second), &record), b"jello").unwrap();

    let err = cluster.manager.download_file(&record.file_id, None).await.unwrap_err();
    match err {
        ReplicationError::AllReplicasFailed { ref source, .. } => assert!(source.is_corruption()),
        ref other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(err.kind(), ErrorKind::Unavailable);
}

#[tokio::test]
async fn test_download_ignores_ring_changes() {
    let cluster = Cluster::new(2, 2, ConsistencyLevel::One).await;
    let record = cluster.manager.upload_file("a.txt", b"hello", "").await.unwrap();

    for i in 3..=6 {
        let id = format!("node-{}", i);
        cluster.manager.register_node(id.as_str(), cluster.dir.path().join(&id)).await.unwrap();
    }
    cluster.manager.unregister_node(&record.replicas[0]).unwrap();

    let (data, _) = cluster.manager.download_file(&record.file_id, None).await.unwrap();
    assert_eq!(&data[..], b"hello");

    cluster.manager.unregister_node(&record.replicas[1]).unwrap();
    let err = cluster.manager.download_file(&record.file_id, None).await.unwrap_err();
    assert!(matches!(err, ReplicationError::NoReplicaAvailable(_)));
}

#[tokio::test]
async fn test_download_missing_file_and_version() {
    let cluster = Cluster::new(1, 1, ConsistencyLevel::One).await;
    let record = cluster.manager.upload_file("a.txt", b"hello", "").await.unwrap();

    let err = cluster.manager.download_file("no-such-file", None).await.unwrap_err();
    assert!(matches!(err, ReplicationError::FileNotFound(_)));
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = cluster.manager.get_version(&record.file_id, "v-missing").await.unwrap_err();
    assert!(matches!(err, ReplicationError::VersionNotFound { .. }));

    let version_id = &record.versions[0].version_id;
    assert_eq!(&cluster.manager.get_version(&record.file_id, version_id).await.unwrap()[..], b"hello");
}

#[tokio::test]
async fn test_added_version_is_latest() {
    let cluster = Cluster::new(2, 2, ConsistencyLevel::One).await;
    let record = cluster.manager.upload_file("a.txt", b"v1", "").await.unwrap();

    // Store a second version by hand and append it through the metadata store
    let node = &record.replicas[0];
    let version_dir = cluster.node_path(node).join(&record.file_id).join("v2");
    std::fs::create_dir_all(&version_dir).unwrap();
    std::fs::write(version_dir.join("data"), b"v2").unwrap();
    std::fs::write(version_dir.join("checksum"), storage::checksum(b"v2")).unwrap();
    cluster
        .store
        .add_version(&record.file_id, Version::new("v2", 2, vec![node.clone()]))
        .await
        .unwrap();

    let (latest, _) = cluster.manager.download_file(&record.file_id, None).await.unwrap();
    assert_eq!(&latest[..], b"v2");
    let first = &record.versions[0].version_id;
    assert_eq!(&cluster.manager.get_version(&record.file_id, first).await.unwrap()[..], b"v1");
}

// ============================================================================
// Deletion
// ============================================================================

#[tokio::test]
async fn test_delete_leaves_other_files() {
    let cluster = Cluster::new(3, 2, ConsistencyLevel::One).await;
    let first = cluster.manager.upload_file("a.txt", b"first", "").await.unwrap();
    let second = cluster.manager.upload_file("b.txt", b"second", "").await.unwrap();

    cluster.manager.delete_file(&first.file_id).await.unwrap();

    let err = cluster.manager.get_file_info(&first.file_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    for node in &first.replicas {
        assert!(!cluster.node_path(node).join(&first.file_id).exists());
    }

    let (data, _) = cluster.manager.download_file(&second.file_id, None).await.unwrap();
    assert_eq!(&data[..], b"second");

    let err = cluster.manager.delete_file(&first.file_id).await.unwrap_err();
    assert!(matches!(err, ReplicationError::FileNotFound(_)));
}

#[tokio::test]
async fn test_delete_covers_every_version_node() {
    let cluster = Cluster::new(3, 1, ConsistencyLevel::One).await;
    let record = cluster.manager.upload_file("a.txt", b"v1", "").await.unwrap();

    // A later version landed on a node outside the record's replica list
    let other = cluster
        .manager
        .node_ids()
        .into_iter()
        .find(|id| !record.replicas.contains(id))
        .unwrap();
    let stray = cluster.node_path(&other).join(&record.file_id).join("v2");
    std::fs::create_dir_all(&stray).unwrap();
    std::fs::write(stray.join("data"), b"v2").unwrap();
    cluster
        .store
        .add_version(&record.file_id, Version::new("v2", 2, vec![other.clone()]))
        .await
        .unwrap();

    cluster.manager.delete_file(&record.file_id).await.unwrap();

    assert!(!cluster.node_path(&other).join(&record.file_id).exists());
    assert!(!cluster.node_path(&record.replicas[0]).join(&record.file_id).exists());
}

// ============================================================================
// Registry, listing, health
// ============================================================================

#[tokio::test]
async fn test_concurrent_uploads_all_listed() {
    let cluster = Cluster::new(3, 2, ConsistencyLevel::One).await;

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..20 {
        let manager = cluster.manager.clone();
        tasks.spawn(async move {
            let body = format!("payload {}", i);
            manager
                .upload_file(&format!("file-{}.txt", i), body.as_bytes(), "text/plain")
                .await
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap().unwrap();
    }

    let page = cluster.manager.list_files(1, 100).await.unwrap();
    assert_eq!(page.total_count, 20);
    assert_eq!(page.records.len(), 20);

    let page = cluster.manager.list_files(2, 15).await.unwrap();
    assert_eq!(page.records.len(), 5);
}

#[tokio::test]
async fn test_register_and_unregister() {
    let cluster = Cluster::new(2, 2, ConsistencyLevel::One).await;
    assert_eq!(cluster.manager.node_count(), 2);
    assert_eq!(cluster.manager.ring().node_count(), 2);

    let err = cluster
        .manager
        .register_node("node-1", cluster.dir.path().join("elsewhere"))
        .await
        .unwrap_err();
    assert!(matches!(err, ReplicationError::AlreadyRegistered(_)));
    assert!(!cluster.dir.path().join("elsewhere").exists());

    cluster.manager.unregister_node(&NodeId::from("node-1")).unwrap();
    assert_eq!(cluster.manager.node_ids(), vec![NodeId::from("node-2")]);
    assert!(!cluster.manager.ring().contains(&NodeId::from("node-1")));

    let err = cluster.manager.unregister_node(&NodeId::from("node-1")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_registration_churn_keeps_ring_and_registry_aligned() {
    let cluster = Cluster::new(0, 2, ConsistencyLevel::One).await;
    let root = cluster.dir.path().to_path_buf();

    let mut tasks = tokio::task::JoinSet::new();
    for worker in 0..8 {
        let manager = cluster.manager.clone();
        let root = root.clone();
        tasks.spawn(async move {
            for round in 0..25 {
                let id = NodeId::from(format!("node-{}", (worker + round) % 4).as_str());
                if round % 2 == 0 {
                    let _ = manager.register_node(id.clone(), root.join(id.as_str())).await;
                } else {
                    let _ = manager.unregister_node(&id);
                }
                tokio::task::yield_now().await;
            }
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap();
    }

    assert_eq!(cluster.manager.ring().all_nodes(), cluster.manager.node_ids());
    for id in cluster.manager.ring().all_nodes() {
        assert!(cluster.manager.node(&id).is_some(), "{} on the ring but not registered", id);
    }
}

#[tokio::test]
async fn test_register_failure_leaves_nothing_behind() {
    let cluster = Cluster::new(1, 2, ConsistencyLevel::One).await;
    let blocked = cluster.dir.path().join("blocked");
    std::fs::write(&blocked, b"file in the way").unwrap();

    let err = cluster.manager.register_node("node-x", &blocked).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Io);
    assert_eq!(cluster.manager.node_count(), 1);
    assert!(!cluster.manager.ring().contains(&NodeId::from("node-x")));
}

#[tokio::test]
async fn test_health_check() {
    let cluster = Cluster::new(3, 2, ConsistencyLevel::One).await;
    cluster.break_node(&NodeId::from("node-2"));

    let health = cluster.manager.health_check().await;

    assert_eq!(health.len(), 3);
    assert!(health[&NodeId::from("node-1")]);
    assert!(!health[&NodeId::from("node-2")]);
    assert!(health[&NodeId::from("node-3")]);
}
