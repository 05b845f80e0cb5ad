//! File-based blob storage

use crate::error::{WardenError, WardenResult};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::super::types::ContentHash;
use super::compression::{compress, decompress};
use super::{BlobStore, StoreStats};

/// File-based blob store
///
/// Layout:
/// ```text
/// base_path/
///   {sha256-hex}        gzip-compressed content
///   .tmp-{uuid}         in-flight writes, renamed into place
/// ```
pub struct FileBlobStore {
    base_path: PathBuf,
}

impl FileBlobStore {
    /// Create a store rooted at `base_path` (created lazily on first write)
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn blob_path(&self, hash: &ContentHash) -> PathBuf {
        self.base_path.join(hash.as_str())
    }

    async fn ensure_dir(&self) -> WardenResult<()> {
        fs::create_dir_all(&self.base_path).await.map_err(|e| {
            WardenError::storage_io(
                format!("Failed to create blob directory: {}", e),
                &self.base_path,
            )
        })
    }

    /// Write through a temp file so a crash never leaves a truncated blob under a valid name
    async fn write_atomic(&self, target: &Path, data: &[u8]) -> WardenResult<()> {
        let tmp = self
            .base_path
            .join(format!(".tmp-{}", uuid::Uuid::new_v4()));
        if let Err(e) = fs::write(&tmp, data).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(WardenError::storage_io(
                format!("Failed to write blob: {}", e),
                &tmp,
            ));
        }
        if let Err(e) = fs::rename(&tmp, target).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(WardenError::storage_io(
                format!("Failed to commit blob: {}", e),
                target,
            ));
        }
        Ok(())
    }

    async fn read_dir_hashes(&self) -> WardenResult<Vec<(ContentHash, u64)>> {
        let mut entries = match fs::read_dir(&self.base_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(WardenError::storage_io(
                    format!("Failed to read blob directory: {}", e),
                    &self.base_path,
                ));
            }
        };

        let mut hashes = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            WardenError::storage_io(
                format!("Failed to read blob directory entry: {}", e),
                &self.base_path,
            )
        })? {
            let name = entry.file_name();
            let Some(hash) = name.to_str().and_then(ContentHash::parse) else {
                continue;
            };
            let len = entry.metadata().await.map(|m| m.len()).unwrap_or(0);
            hashes.push((hash, len));
        }
        Ok(hashes)
    }
}

#[async_trait]
impl BlobStore for FileBlobStore {
    async fn store(&self, bytes: &[u8]) -> WardenResult<ContentHash> {
        let hash = ContentHash::of(bytes);
        let path = self.blob_path(&hash);

        if fs::try_exists(&path).await.unwrap_or(false) {
            tracing::trace!("Blob {} already stored", hash);
            return Ok(hash);
        }

        self.ensure_dir().await?;
        let compressed = compress(bytes)?;
        self.write_atomic(&path, &compressed).await?;

        tracing::debug!(
            "Stored blob {} ({} -> {} bytes)",
            hash,
            bytes.len(),
            compressed.len()
        );
        Ok(hash)
    }

    async fn retrieve(&self, hash: &ContentHash) -> WardenResult<Vec<u8>> {
        let path = self.blob_path(hash);
        let compressed = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(WardenError::not_found("blob", hash.as_str()));
            }
            Err(e) => {
                return Err(WardenError::storage_io(
                    format!("Failed to read blob: {}", e),
                    &path,
                ));
            }
        };

        decompress(&compressed).map_err(|e| {
            WardenError::storage_io(format!("Corrupt blob {}: {}", hash, e), &path)
        })
    }

    async fn contains(&self, hash: &ContentHash) -> WardenResult<bool> {
        Ok(fs::try_exists(self.blob_path(hash)).await.unwrap_or(false))
    }

    async fn list_hashes(&self) -> WardenResult<Vec<ContentHash>> {
        Ok(self
            .read_dir_hashes()
            .await?
            .into_iter()
            .map(|(hash, _)| hash)
            .collect())
    }

    async fn gc(&self, live: &HashSet<ContentHash>) -> WardenResult<usize> {
        let mut removed = 0;
        for (hash, _) in self.read_dir_hashes().await? {
            if live.contains(&hash) {
                continue;
            }
            let path = self.blob_path(&hash);
            fs::remove_file(&path).await.map_err(|e| {
                WardenError::storage_io(format!("Failed to remove blob: {}", e), &path)
            })?;
            removed += 1;
        }

        if removed > 0 {
            tracing::info!("Garbage collected {} unreferenced blobs", removed);
        }
        Ok(removed)
    }

    async fn stats(&self) -> WardenResult<StoreStats> {
        let hashes = self.read_dir_hashes().await?;
        Ok(StoreStats {
            blob_count: hashes.len(),
            stored_bytes: hashes.iter().map(|(_, len)| len).sum(),
        })
    }
}
