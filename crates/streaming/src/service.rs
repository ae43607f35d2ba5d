use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use replication::FileManager;
use tracing::{info, warn};

use crate::codec::{split_chunks, ChunkAssembler, MAX_CHUNK_SIZE};
use crate::protocol::{
    DeleteResponse, DownloadChunk, DownloadResponse, FileInfo, HealthResponse, ListFilesResponse,
    UploadChunk, UploadRequest, UploadResponse,
};
use crate::{Result, StreamingError};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Time a request gets on top of its node calls, for metadata access.
pub const REQUEST_HEADROOM: Duration = Duration::from_secs(5);

/// Page size used when a listing asks for zero.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Client-facing operations over a [`FileManager`].
///
/// Upload and delete always answer with a response carrying a success flag
/// and message; the read operations return errors.
///
/// The request deadline always exceeds the manager's
/// [node-call budget](FileManager::node_call_budget), so a stuck replica
/// times out inside the manager and the request still fails over or rolls
/// back before the deadline fires.
#[derive(Debug, Clone)]
pub struct FileStoreService {
    manager: Arc<FileManager>,
    request_timeout: Duration,
}

impl FileStoreService {
    /// Uses [`DEFAULT_REQUEST_TIMEOUT`], raised to the node-call budget plus
    /// [`REQUEST_HEADROOM`] when that is larger.
    pub fn new(manager: Arc<FileManager>) -> Self {
        let request_timeout =
            DEFAULT_REQUEST_TIMEOUT.max(manager.node_call_budget().saturating_add(REQUEST_HEADROOM));
        Self {
            manager,
            request_timeout,
        }
    }

    /// Replace the request deadline. It must be longer than the manager's
    /// node-call budget.
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Result<Self> {
        let budget = self.manager.node_call_budget();
        if request_timeout <= budget {
            return Err(StreamingError::DeadlineTooShort {
                requested: request_timeout,
                budget,
            });
        }
        self.request_timeout = request_timeout;
        Ok(self)
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn manager(&self) -> &Arc<FileManager> {
        &self.manager
    }

    pub async fn upload(&self, request: UploadRequest) -> UploadResponse {
        let result = self
            .deadline(self.manager.upload_file(
                &request.filename,
                &request.data,
                &request.content_type,
            ))
            .await;

        match result {
            Ok(record) => UploadResponse {
                version_id: record
                    .latest_version()
                    .map(|v| v.version_id.clone())
                    .unwrap_or_default(),
                file_id: record.file_id,
                size: record.size,
                node_locations: record.replicas,
                success: true,
                message: "File uploaded successfully".to_string(),
            },
            Err(e) => {
                warn!(filename = %request.filename, error = %e, "upload failed");
                UploadResponse::failed(format!("Upload failed: {}", e))
            }
        }
    }

    /// Assemble a chunked upload, then [`upload`](Self::upload) it.
    pub async fn upload_stream<I>(&self, chunks: I) -> UploadResponse
    where
        I: IntoIterator<Item = UploadChunk>,
    {
        let mut assembler = ChunkAssembler::new();
        for chunk in chunks {
            assembler.push(chunk);
        }
        info!(chunks = assembler.chunks(), size = assembler.len(), "upload assembled");
        self.upload(assembler.finish()).await
    }

    pub async fn download(
        &self,
        file_id: &str,
        version_id: Option<&str>,
    ) -> Result<DownloadResponse> {
        let (data, record) = self
            .deadline(self.manager.download_file(file_id, version_id))
            .await?;

        Ok(DownloadResponse {
            total_size: data.len() as u64,
            content_type: record.content_type,
            data,
        })
    }

    /// [`download`](Self::download), split into chunks of at most 1 MiB.
    pub async fn download_chunks(
        &self,
        file_id: &str,
        version_id: Option<&str>,
    ) -> Result<Vec<DownloadChunk>> {
        let response = self.download(file_id, version_id).await?;
        Ok(split_chunks(&response.data, &response.content_type, MAX_CHUNK_SIZE))
    }

    /// Chunks of one specific version. Chunks carry no content type.
    pub async fn get_version(&self, file_id: &str, version_id: &str) -> Result<Vec<DownloadChunk>> {
        let data = self
            .deadline(self.manager.get_version(file_id, version_id))
            .await?;
        Ok(split_chunks(&data, "", MAX_CHUNK_SIZE))
    }

    pub async fn delete(&self, file_id: &str) -> DeleteResponse {
        match self.deadline(self.manager.delete_file(file_id)).await {
            Ok(()) => DeleteResponse {
                success: true,
                message: "File deleted successfully".to_string(),
            },
            Err(e) => {
                warn!(file_id, error = %e, "delete failed");
                DeleteResponse {
                    success: false,
                    message: format!("Delete failed: {}", e),
                }
            }
        }
    }

    pub async fn file_info(&self, file_id: &str) -> Result<FileInfo> {
        let record = self.deadline(self.manager.get_file_info(file_id)).await?;
        Ok(FileInfo::from(&record))
    }

    /// Page 0 reads as 1 and page size 0 as [`DEFAULT_PAGE_SIZE`].
    pub async fn list_files(&self, page: u32, page_size: u32) -> Result<ListFilesResponse> {
        let page = page.max(1);
        let page_size = if page_size == 0 { DEFAULT_PAGE_SIZE } else { page_size };

        let listing = self
            .deadline(self.manager.list_files(page, page_size))
            .await?;

        Ok(ListFilesResponse {
            files: listing.records.iter().map(FileInfo::from).collect(),
            total_count: listing.total_count,
        })
    }

    pub async fn health(&self) -> HealthResponse {
        HealthResponse {
            node_count: self.manager.node_count(),
            nodes: self.manager.health_check().await,
        }
    }

    async fn deadline<T, F>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = replication::Result<T>>,
    {
        match tokio::time::timeout(self.request_timeout, operation).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(StreamingError::DeadlineExceeded(self.request_timeout)),
        }
    }
}
