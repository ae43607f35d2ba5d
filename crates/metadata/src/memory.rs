use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;

use crate::record::{FileRecord, Version};
use crate::store::{paginate, MetadataStore, Page};
use crate::{MetadataError, Result};

/// Process-local metadata store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    records: DashMap<String, FileRecord>,
    closed: AtomicBool,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(MetadataError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn save(&self, record: &FileRecord) -> Result<()> {
        self.ensure_open()?;
        let mut record = record.clone();
        record.updated_at = Utc::now();
        debug!(file_id = %record.file_id, "saving record");
        self.records.insert(record.file_id.clone(), record);
        Ok(())
    }

    async fn get(&self, file_id: &str) -> Result<FileRecord> {
        self.ensure_open()?;
        self.records
            .get(file_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| MetadataError::NotFound(file_id.to_string()))
    }

    async fn delete(&self, file_id: &str) -> Result<()> {
        self.ensure_open()?;
        self.records.remove(file_id);
        Ok(())
    }

    async fn list(&self, page: u32, page_size: u32) -> Result<Page> {
        self.ensure_open()?;
        let records = self.records.iter().map(|entry| entry.value().clone()).collect();
        Ok(paginate(records, page, page_size))
    }

    async fn add_version(&self, file_id: &str, version: Version) -> Result<()> {
        self.ensure_open()?;
        let mut entry = self
            .records
            .get_mut(file_id)
            .ok_or_else(|| MetadataError::NotFound(file_id.to_string()))?;
        entry.versions.push(version);
        entry.updated_at = Utc::now();
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
