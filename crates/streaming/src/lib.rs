//! Client-facing boundary of the file store.
//!
//! This crate provides:
//! - Request/response projections of the coordinator's operations
//! - Chunk assembly for uploads and chunk splitting for downloads
//! - Per-request deadlines

pub mod codec;
pub mod error;
pub mod protocol;
pub mod service;

pub use codec::{split_chunks, ChunkAssembler, MAX_CHUNK_SIZE};
pub use error::{Result, StreamingError};
pub use protocol::{
    DeleteResponse, DownloadChunk, DownloadResponse, FileInfo, HealthResponse, ListFilesResponse,
    UploadChunk, UploadRequest, UploadResponse,
};
pub use service::{FileStoreService, DEFAULT_PAGE_SIZE, DEFAULT_REQUEST_TIMEOUT, REQUEST_HEADROOM};
