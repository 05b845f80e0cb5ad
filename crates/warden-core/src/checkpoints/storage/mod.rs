//! Content-addressable blob storage for checkpoints
//!
//! Blobs are keyed by the SHA-256 of their uncompressed bytes and gzip-compressed
//! before persistence, so identical content is stored once no matter how many
//! files, checkpoints or sessions reference it.

mod compression;
mod file_storage;
mod memory_storage;


pub use file_storage::FileBlobStore;
pub use memory_storage::MemoryBlobStore;

use crate::error::WardenResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::types::ContentHash;

/// Aggregate numbers for a blob store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Number of distinct blobs
    pub blob_count: usize,
    /// Bytes occupied by compressed blobs
    pub stored_bytes: u64,
}

/// Content-addressable blob store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes and return their hash. Storing known content performs no write.
    async fn store(&self, bytes: &[u8]) -> WardenResult<ContentHash>;

    /// Retrieve the bytes for a hash, NotFound when absent
    async fn retrieve(&self, hash: &ContentHash) -> WardenResult<Vec<u8>>;

    /// Check whether a blob exists
    async fn contains(&self, hash: &ContentHash) -> WardenResult<bool>;

    /// Every stored hash
    async fn list_hashes(&self) -> WardenResult<Vec<ContentHash>>;

    /// Delete every blob not in `live`, returning how many were removed
    async fn gc(&self, live: &HashSet<ContentHash>) -> WardenResult<usize>;

    /// Blob count and on-disk size
    async fn stats(&self) -> WardenResult<StoreStats>;
}
