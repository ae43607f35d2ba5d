use async_trait::async_trait;

use crate::record::{FileRecord, Version};
use crate::Result;

/// One page of records plus the unpaginated total.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub records: Vec<FileRecord>,
    pub total_count: u64,
}

/// Durable home of [`FileRecord`]s.
///
/// Implementations must be safe to share across tasks; the coordinator calls
/// them concurrently from independent requests.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert or replace the record with the same `file_id`. Sets
    /// `updated_at` to now.
    async fn save(&self, record: &FileRecord) -> Result<()>;

    async fn get(&self, file_id: &str) -> Result<FileRecord>;

    /// Removing an absent record is not an error.
    async fn delete(&self, file_id: &str) -> Result<()>;

    /// Newest first. `page` is 1-indexed; 0 is read as 1.
    async fn list(&self, page: u32, page_size: u32) -> Result<Page>;

    /// Append `version` to an existing record.
    async fn add_version(&self, file_id: &str, version: Version) -> Result<()>;

    /// Release held resources. Later calls fail with
    /// [`MetadataError::Closed`](crate::MetadataError::Closed).
    async fn close(&self) -> Result<()>;
}

/// Sort newest first and cut out one page.
pub(crate) fn paginate(mut records: Vec<FileRecord>, page: u32, page_size: u32) -> Page {
    let total_count = records.len() as u64;
    records.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.file_id.cmp(&b.file_id))
    });

    let page = page.max(1) as usize;
    let page_size = page_size as usize;
    let skip = (page - 1).saturating_mul(page_size);
    let records = records.into_iter().skip(skip).take(page_size).collect();

    Page {
        records,
        total_count,
    }
}
