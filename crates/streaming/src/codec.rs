//! Conversion between whole payloads and transfer-sized chunks.

use bytes::{Bytes, BytesMut};

use crate::protocol::{DownloadChunk, UploadChunk, UploadRequest};

/// Largest chunk sent to a client.
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Collects streamed upload chunks into one [`UploadRequest`].
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    filename: Option<String>,
    content_type: String,
    buffer: BytesMut,
    chunks: usize,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. The first non-empty filename fixes the file's name and
    /// content type; later chunks only contribute bytes.
    pub fn push(&mut self, chunk: UploadChunk) {
        if self.filename.is_none() && !chunk.filename.is_empty() {
            self.filename = Some(chunk.filename);
            self.content_type = chunk.content_type;
        }
        self.buffer.extend_from_slice(&chunk.data);
        self.chunks += 1;
    }

    pub fn chunks(&self) -> usize {
        self.chunks
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn finish(self) -> UploadRequest {
        UploadRequest {
            filename: self.filename.unwrap_or_default(),
            content_type: self.content_type,
            data: self.buffer.freeze(),
        }
    }
}

/// Split `data` into chunks of at most `chunk_size` bytes without copying.
/// An empty payload yields no chunks.
pub fn split_chunks(data: &Bytes, content_type: &str, chunk_size: usize) -> Vec<DownloadChunk> {
    let chunk_size = chunk_size.max(1);
    let total_size = data.len() as u64;

    (0..data.len())
        .step_by(chunk_size)
        .map(|offset| {
            let end = (offset + chunk_size).min(data.len());
            DownloadChunk {
                data: data.slice(offset..end),
                total_size,
                content_type: content_type.to_string(),
            }
        })
        .collect()
}
