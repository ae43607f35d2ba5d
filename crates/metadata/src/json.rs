use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::record::{FileRecord, Version};
use crate::store::{paginate, MetadataStore, Page};
use crate::{MetadataError, Result};

type Records = BTreeMap<String, FileRecord>;

#[derive(Debug)]
struct State {
    records: Records,
    closed: bool,
}

/// Metadata kept in a single JSON document on disk.
///
/// The whole document is rewritten on every mutation into a temporary file,
/// which is synced to disk before it is renamed over the old one. A crash
/// leaves either the old or the new document.
/// The in-memory view only changes once the rewrite has succeeded.
#[derive(Debug)]
pub struct JsonFileMetadataStore {
    path: PathBuf,
    state: Mutex<State>,
}

impl JsonFileMetadataStore {
    /// Open `path`, loading existing records if the file is present.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let records: Records = match fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => Records::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == ErrorKind::NotFound => Records::new(),
            Err(e) => return Err(e.into()),
        };

        info!(path = ?path, records = records.len(), "metadata store opened");

        Ok(Self {
            path,
            state: Mutex::new(State {
                records,
                closed: false,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, records: &Records) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(records)?;
        let tmp = self.path.with_extension("json.tmp");

        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp, &self.path).await?;
        sync_parent(&self.path).await?;
        debug!(path = ?self.path, records = records.len(), "metadata persisted");
        Ok(())
    }

    /// Apply `change` to a copy of the records, persist it, then commit.
    async fn mutate<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut Records) -> Result<()> + Send,
    {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(MetadataError::Closed);
        }

        let mut next = state.records.clone();
        change(&mut next)?;
        self.persist(&next).await?;
        state.records = next;
        Ok(())
    }
}

/// Make a rename inside `path`'s directory durable.
#[cfg(unix)]
async fn sync_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::File::open(parent).await?.sync_all().await?;
    }
    Ok(())
}

#[cfg(not(unix))]
async fn sync_parent(_path: &Path) -> Result<()> {
    Ok(())
}

#[async_trait]
impl MetadataStore for JsonFileMetadataStore {
    async fn save(&self, record: &FileRecord) -> Result<()> {
        let mut record = record.clone();
        record.updated_at = Utc::now();
        self.mutate(move |records| {
            records.insert(record.file_id.clone(), record);
            Ok(())
        })
        .await
    }

    async fn get(&self, file_id: &str) -> Result<FileRecord> {
        let state = self.state.lock().await;
        if state.closed {
            return Err(MetadataError::Closed);
        }
        state
            .records
            .get(file_id)
            .cloned()
            .ok_or_else(|| MetadataError::NotFound(file_id.to_string()))
    }

    async fn delete(&self, file_id: &str) -> Result<()> {
        {
            let state = self.state.lock().await;
            if state.closed {
                return Err(MetadataError::Closed);
            }
            if !state.records.contains_key(file_id) {
                return Ok(());
            }
        }
        self.mutate(|records| {
            records.remove(file_id);
            Ok(())
        })
        .await
    }

    async fn list(&self, page: u32, page_size: u32) -> Result<Page> {
        let state = self.state.lock().await;
        if state.closed {
            return Err(MetadataError::Closed);
        }
        let records = state.records.values().cloned().collect();
        Ok(paginate(records, page, page_size))
    }

    async fn add_version(&self, file_id: &str, version: Version) -> Result<()> {
        self.mutate(move |records| {
            let record = records
                .get_mut(file_id)
                .ok_or_else(|| MetadataError::NotFound(file_id.to_string()))?;
            record.versions.push(version);
            record.updated_at = Utc::now();
            Ok(())
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.closed = true;
        info!(path = ?self.path, "metadata store closed");
        Ok(())
    }
}
