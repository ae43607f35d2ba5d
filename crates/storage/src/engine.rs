use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use corelib::NodeId;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::checksum::{checksum, Checksummer};
use crate::{Result, StorageError};

const DATA_FILE: &str = "data";
const CHECKSUM_FILE: &str = "checksum";
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Versioned blob storage on one node's private directory.
///
/// Writers (`store`, `replicate_from_stream`, `delete`, `delete_all`) hold the
/// node's lock exclusively; readers share it. Distinct nodes never contend.
/// No two engines may be opened over the same directory.
#[derive(Debug)]
pub struct StorageNode {
    id: NodeId,
    location: PathBuf,
    lock: RwLock<()>,
}

impl StorageNode {
    /// Open (creating if needed) the storage directory for node `id`.
    pub async fn open(id: NodeId, location: impl Into<PathBuf>) -> Result<Self> {
        let location = location.into();
        fs::create_dir_all(&location).await?;

        info!(node = %id, location = ?location, "storage node opened");

        Ok(Self {
            id,
            location,
            lock: RwLock::new(()),
        })
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Write `data` and its checksum for `(file_id, version_id)`.
    ///
    /// A failure between the two writes leaves a version that fails to
    /// retrieve; cleaning it up is the caller's business.
    pub async fn store(&self, file_id: &str, version_id: &str, data: &[u8]) -> Result<()> {
        let dir = self.version_dir(file_id, version_id)?;
        let _guard = self.lock.write().await;

        fs::create_dir_all(&dir).await?;
        fs::write(dir.join(DATA_FILE), data).await?;
        fs::write(dir.join(CHECKSUM_FILE), checksum(data)).await?;

        debug!(node = %self.id, file_id, version_id, size = data.len(), "stored version");
        Ok(())
    }

    /// Read a version back, verifying it against the stored checksum.
    pub async fn retrieve(&self, file_id: &str, version_id: &str) -> Result<Bytes> {
        let dir = self.version_dir(file_id, version_id)?;
        let _guard = self.lock.read().await;

        let data = match fs::read(dir.join(DATA_FILE)).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound {
                    file_id: file_id.to_string(),
                    version_id: version_id.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let stored = match fs::read_to_string(dir.join(CHECKSUM_FILE)).await {
            Ok(stored) => stored,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::Corruption(format!(
                    "missing checksum for {}/{} on node {}",
                    file_id, version_id, self.id
                )))
            }
            Err(e) => return Err(e.into()),
        };

        if stored.trim() != checksum(&data) {
            warn!(node = %self.id, file_id, version_id, "checksum mismatch");
            return Err(StorageError::Corruption(format!(
                "checksum mismatch for {}/{} on node {}",
                file_id, version_id, self.id
            )));
        }

        Ok(Bytes::from(data))
    }

    /// Like [`store`](Self::store), but consumes the payload from `source`,
    /// hashing each chunk as it is written. Returns the number of bytes stored.
    pub async fn replicate_from_stream<R>(
        &self,
        file_id: &str,
        version_id: &str,
        mut source: R,
    ) -> Result<u64>
    where
        R: AsyncRead + Unpin + Send,
    {
        let dir = self.version_dir(file_id, version_id)?;
        let _guard = self.lock.write().await;

        fs::create_dir_all(&dir).await?;
        let mut file = fs::File::create(dir.join(DATA_FILE)).await?;
        let mut summer = Checksummer::new();
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        let mut written = 0u64;

        loop {
            let n = source.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            summer.update(&buf[..n]);
            file.write_all(&buf[..n]).await?;
            written += n as u64;
        }
        file.flush().await?;
        drop(file);

        fs::write(dir.join(CHECKSUM_FILE), summer.finalize()).await?;

        debug!(node = %self.id, file_id, version_id, size = written, "replicated version from stream");
        Ok(written)
    }

    /// Remove one version; the file's directory goes too once it is empty.
    ///
    /// Deleting a version that is already gone is not an error.
    pub async fn delete(&self, file_id: &str, version_id: &str) -> Result<()> {
        let dir = self.version_dir(file_id, version_id)?;
        let file_dir = self.file_dir(file_id)?;
        let _guard = self.lock.write().await;

        remove_dir_all_if_present(&dir).await?;

        let mut entries = match fs::read_dir(&file_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if entries.next_entry().await?.is_none() {
            fs::remove_dir(&file_dir).await?;
        }

        debug!(node = %self.id, file_id, version_id, "deleted version");
        Ok(())
    }

    /// Remove every version of `file_id` at once.
    pub async fn delete_all(&self, file_id: &str) -> Result<()> {
        let file_dir = self.file_dir(file_id)?;
        let _guard = self.lock.write().await;

        remove_dir_all_if_present(&file_dir).await?;

        debug!(node = %self.id, file_id, "deleted all versions");
        Ok(())
    }

    /// Whether a data entry exists. The checksum is not verified.
    pub async fn exists(&self, file_id: &str, version_id: &str) -> bool {
        let Ok(dir) = self.version_dir(file_id, version_id) else {
            return false;
        };
        let _guard = self.lock.read().await;
        fs::metadata(dir.join(DATA_FILE)).await.is_ok()
    }

    /// Total bytes of every data and checksum entry on this node.
    ///
    /// Doubles as a health check: an error means the node is unusable.
    pub async fn storage_size(&self) -> Result<u64> {
        let _guard = self.lock.read().await;

        let mut total = 0u64;
        let mut pending = vec![self.location.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let metadata = entry.metadata().await?;
                if metadata.is_dir() {
                    pending.push(entry.path());
                } else {
                    total += metadata.len();
                }
            }
        }

        Ok(total)
    }

    /// File ids with at least one directory on this node, sorted.
    pub async fn list_file_ids(&self) -> Result<Vec<String>> {
        let _guard = self.lock.read().await;

        let mut ids = Vec::new();
        let mut entries = fs::read_dir(&self.location).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                ids.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        ids.sort();

        Ok(ids)
    }

    fn file_dir(&self, file_id: &str) -> Result<PathBuf> {
        validate_key("file id", file_id)?;
        Ok(self.location.join(file_id))
    }

    fn version_dir(&self, file_id: &str, version_id: &str) -> Result<PathBuf> {
        validate_key("version id", version_id)?;
        Ok(self.file_dir(file_id)?.join(version_id))
    }
}

/// Keys become path components, so anything that could escape the node's
/// directory is rejected.
fn validate_key(what: &str, key: &str) -> Result<()> {
    if key.is_empty() || key == "." || key == ".." {
        return Err(StorageError::InvalidKey(format!("{} {:?}", what, key)));
    }
    if key.contains(|c| matches!(c, '/' | '\\' | '\0')) {
        return Err(StorageError::InvalidKey(format!(
            "{} {:?} contains a path separator",
            what, key
        )));
    }
    Ok(())
}

async fn remove_dir_all_if_present(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
