//! CLI commands and their JSON results.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use bytes::Bytes;
use clap::Subcommand;
use corelib::{DigestToken, NodeId};
use serde::Serialize;
use streaming::{
    DeleteResponse, FileInfo, FileStoreService, HealthResponse, ListFilesResponse, UploadChunk,
    UploadResponse, MAX_CHUNK_SIZE,
};
use tokio::fs;
use tokio::io::AsyncReadExt;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Upload a local file
    Upload {
        path: PathBuf,
        /// Stored filename (defaults to the local file name)
        #[arg(long)]
        name: Option<String>,
        /// Content type (guessed from the extension when omitted)
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Download a file, the latest version unless one is given
    Download {
        file_id: String,
        #[arg(long)]
        version: Option<String>,
        /// Destination (defaults to the stored filename)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete a file and every stored version
    Delete { file_id: String },
    /// Show a file's metadata
    Info { file_id: String },
    /// List files, newest first
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        page_size: u32,
    },
    /// Check every storage node
    Health,
    /// Show where a key lands on the ring
    Ring { key: String },
}

#[derive(Debug, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum CommandResult {
    Upload(UploadResponse),
    Download {
        file_id: String,
        output: PathBuf,
        size: u64,
        content_type: String,
    },
    Delete(DeleteResponse),
    Info(FileInfo),
    List(ListFilesResponse),
    Health(HealthResponse),
    Ring {
        key: String,
        token: String,
        replicas: Vec<NodeId>,
        ownership: BTreeMap<NodeId, f64>,
    },
}

impl CommandResult {
    pub fn is_success(&self) -> bool {
        match self {
            CommandResult::Upload(response) => response.success,
            CommandResult::Delete(response) => response.success,
            CommandResult::Health(response) => response.all_healthy(),
            _ => true,
        }
    }
}

impl Command {
    pub async fn execute(self, service: &FileStoreService) -> anyhow::Result<CommandResult> {
        match self {
            Command::Upload {
                path,
                name,
                content_type,
            } => {
                let filename = match name {
                    Some(name) => name,
                    None => file_name(&path).context("upload path has no file name")?,
                };
                let content_type =
                    content_type.unwrap_or_else(|| guess_content_type(&path).to_string());
                let chunks = read_chunks(&path, &filename, &content_type).await?;
                Ok(CommandResult::Upload(service.upload_stream(chunks).await))
            }
            Command::Download {
                file_id,
                version,
                output,
            } => {
                let chunks = service.download_chunks(&file_id, version.as_deref()).await?;
                let output = match output {
                    Some(output) => output,
                    None => {
                        let info = service.file_info(&file_id).await?;
                        PathBuf::from(file_name(Path::new(&info.filename)).unwrap_or(file_id.clone()))
                    }
                };

                let mut data = Vec::new();
                for chunk in &chunks {
                    data.extend_from_slice(&chunk.data);
                }
                fs::write(&output, &data)
                    .await
                    .with_context(|| format!("failed to write {}", output.display()))?;

                Ok(CommandResult::Download {
                    file_id,
                    output,
                    size: data.len() as u64,
                    content_type: chunks
                        .first()
                        .map(|c| c.content_type.clone())
                        .unwrap_or_default(),
                })
            }
            Command::Delete { file_id } => Ok(CommandResult::Delete(service.delete(&file_id).await)),
            Command::Info { file_id } => Ok(CommandResult::Info(service.file_info(&file_id).await?)),
            Command::List { page, page_size } => {
                Ok(CommandResult::List(service.list_files(page, page_size).await?))
            }
            Command::Health => Ok(CommandResult::Health(service.health().await)),
            Command::Ring { key } => {
                let ring = service.manager().ring();
                Ok(CommandResult::Ring {
                    token: DigestToken::from_key(&key).to_string(),
                    replicas: ring.get_nodes(key.as_bytes()),
                    ownership: ring.ownership(),
                    key,
                })
            }
        }
    }
}

/// Read `path` in transfer-sized chunks, each tagged with the upload's name.
async fn read_chunks(
    path: &Path,
    filename: &str,
    content_type: &str,
) -> anyhow::Result<Vec<UploadChunk>> {
    let mut file = fs::File::open(path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut chunks = Vec::new();
    loop {
        let mut buf = Vec::with_capacity(MAX_CHUNK_SIZE);
        let n = (&mut file)
            .take(MAX_CHUNK_SIZE as u64)
            .read_to_end(&mut buf)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        if n == 0 {
            break;
        }
        chunks.push(UploadChunk {
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            data: Bytes::from(buf),
        });
    }

    // An empty file still names the upload
    if chunks.is_empty() {
        chunks.push(UploadChunk {
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            data: Bytes::new(),
        });
    }
    Ok(chunks)
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|name| name.to_string_lossy().into_owned())
}

/// Content type from the file extension.
pub fn guess_content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "txt" | "log" => "text/plain",
        "md" => "text/markdown",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type(Path::new("notes.txt")), "text/plain");
        assert_eq!(guess_content_type(Path::new("photo.JPG")), "image/jpeg");
        assert_eq!(guess_content_type(Path::new("archive.tar.gz")), "application/gzip");
        assert_eq!(guess_content_type(Path::new("Makefile")), DEFAULT_CONTENT_TYPE);
        assert_eq!(guess_content_type(Path::new("blob.xyz")), DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn test_result_json_is_tagged() {
        let result = CommandResult::Delete(DeleteResponse {
            success: true,
            message: "File deleted successfully".to_string(),
        });
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["command"], "delete");
        assert_eq!(json["success"], true);
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn test_read_chunks_splits_large_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        std::fs::write(&path, vec![3u8; MAX_CHUNK_SIZE + 5]).unwrap();

        let chunks = read_chunks(&path, "big.bin", DEFAULT_CONTENT_TYPE).await.unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].data.len(), MAX_CHUNK_SIZE);
        assert_eq!(chunks[1].data.len(), 5);
        assert!(chunks.iter().all(|c| c.filename == "big.bin"));
    }

    #[tokio::test]
    async fn test_read_chunks_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        std::fs::write(&path, b"").unwrap();

        let chunks = read_chunks(&path, "empty.txt", "text/plain").await.unwrap();

        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].data.is_empty());
    }
}
