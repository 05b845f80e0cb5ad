//! In-memory blob storage

use crate::error::{WardenError, WardenResult};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use super::super::types::ContentHash;
use super::compression::{compress, decompress};
use super::{BlobStore, StoreStats};

/// In-memory blob store (for tests and throwaway sessions)
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<ContentHash, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn store(&self, bytes: &[u8]) -> WardenResult<ContentHash> {
        let hash = ContentHash::of(bytes);
        if self.blobs.read().await.contains_key(&hash) {
            return Ok(hash);
        }
        let compressed = compress(bytes)?;
        self.blobs.write().await.entry(hash.clone()).or_insert(compressed);
        Ok(hash)
    }

    async fn retrieve(&self, hash: &ContentHash) -> WardenResult<Vec<u8>> {
        let blobs = self.blobs.read().await;
        let compressed = blobs
            .get(hash)
            .ok_or_else(|| WardenError::not_found("blob", hash.as_str()))?;
        decompress(compressed)
    }

    async fn contains(&self, hash: &ContentHash) -> WardenResult<bool> {
        Ok(self.blobs.read().await.contains_key(hash))
    }

    async fn list_hashes(&self) -> WardenResult<Vec<ContentHash>> {
        Ok(self.blobs.read().await.keys().cloned().collect())
    }

    async fn gc(&self, live: &HashSet<ContentHash>) -> WardenResult<usize> {
        let mut blobs = self.blobs.write().await;
        let before = blobs.len();
        blobs.retain(|hash, _| live.contains(hash));
        Ok(before - blobs.len())
    }

    async fn stats(&self) -> WardenResult<StoreStats> {
        let blobs = self.blobs.read().await;
        Ok(StoreStats {
            blob_count: blobs.len(),
            stored_bytes: blobs.values().map(|b| b.len() as u64).sum(),
        })
    }
}
