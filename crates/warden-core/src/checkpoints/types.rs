//! Checkpoint data types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Unique identifier for a checkpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointId(pub String);

impl CheckpointId {
    /// Create a new random checkpoint ID
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Create from an existing string
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the ID as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get a short version of the ID (first 8 chars)
    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl Default for CheckpointId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a session timeline
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Create a new random session ID
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Create from an existing string
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the ID as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Session ids become directory names, so only a conservative charset is accepted
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
            && self.0.len() <= 128
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// SHA-256 content hash, lowercase hex
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hash a byte slice
    pub fn of(bytes: &[u8]) -> Self {
        Self(format!("{:x}", Sha256::digest(bytes)))
    }

    /// Parse a hex digest, rejecting anything that is not 64 lowercase hex chars
    pub fn parse(s: &str) -> Option<Self> {
        let valid = s.len() == 64
            && s.bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Snapshot of one tracked file, referencing its content blob by hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSnapshot {
    /// Path relative to the project root, `/`-separated
    pub path: String,
    /// Content hash, also the blob reference
    pub hash: ContentHash,
    /// Uncompressed size in bytes
    pub size: u64,
    /// Modification time in milliseconds since the epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_ms: Option<i64>,
    /// Unix permission bits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<u32>,
}

/// What caused a checkpoint to be created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointTrigger {
    /// Explicit user or API request
    Manual,
    /// Automatic checkpoint policy
    Auto,
    /// Created while forking a session
    Fork,
}

impl fmt::Display for CheckpointTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Auto => write!(f, "auto"),
            Self::Fork => write!(f, "fork"),
        }
    }
}

/// A complete, immutable snapshot of a session's tracked files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: CheckpointId,
    /// Session that created the checkpoint
    pub session_id: SessionId,
    pub parent_id: Option<CheckpointId>,
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
    pub trigger: CheckpointTrigger,
    /// Every tracked file, ordered by path
    pub snapshots: Vec<FileSnapshot>,
    /// Length of the session message log at creation
    pub message_count: usize,
    /// Blob holding the message log prefix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages_hash: Option<ContentHash>,
}

impl Checkpoint {
    /// Total uncompressed size of all tracked files
    pub fn total_bytes(&self) -> u64 {
        self.snapshots.iter().map(|s| s.size).sum()
    }

    /// Look up the snapshot for a relative path
    pub fn snapshot(&self, path: &str) -> Option<&FileSnapshot> {
        self.snapshots
            .binary_search_by(|s| s.path.as_str().cmp(path))
            .ok()
            .map(|i| &self.snapshots[i])
    }

    /// Every blob this checkpoint keeps alive
    pub fn referenced_hashes(&self) -> impl Iterator<Item = &ContentHash> {
        self.snapshots
            .iter()
            .map(|s| &s.hash)
            .chain(self.messages_hash.iter())
    }

    pub fn summary(&self) -> CheckpointSummary {
        CheckpointSummary {
            id: self.id.clone(),
            parent_id: self.parent_id.clone(),
            label: self.label.clone(),
            created_at: self.created_at,
            trigger: self.trigger,
            file_count: self.snapshots.len(),
            total_bytes: self.total_bytes(),
            message_count: self.message_count,
        }
    }
}

/// Lightweight view of a checkpoint for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointSummary {
    pub id: CheckpointId,
    pub parent_id: Option<CheckpointId>,
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
    pub trigger: CheckpointTrigger,
    pub file_count: usize,
    pub total_bytes: u64,
    pub message_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_sha256_hex() {
        let hash = ContentHash::of(b"hello");
        assert_eq!(
            hash.as_str(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(ContentHash::parse(hash.as_str()), Some(hash));
    }

    #[test]
    fn test_content_hash_rejects_paths() {
        assert!(ContentHash::parse("../../etc/passwd").is_none());
        assert!(ContentHash::parse(&"A".repeat(64)).is_none());
        assert!(ContentHash::parse("abc").is_none());
    }

    #[test]
    fn test_session_id_validation() {
        assert!(SessionId::new().is_valid());
        assert!(SessionId::from_string("feature_branch-2").is_valid());
        assert!(!SessionId::from_string("../escape").is_valid());
        assert!(!SessionId::from_string("").is_valid());
    }

    #[test]
    fn test_checkpoint_snapshot_lookup() {
        let snapshot = |path: &str| FileSnapshot {
            path: path.to_string(),
            hash: ContentHash::of(path.as_bytes()),
            size: path.len() as u64,
            modified_ms: None,
            mode: None,
        };
        let checkpoint = Checkpoint {
            id: CheckpointId::new(),
            session_id: SessionId::new(),
            parent_id: None,
            label: None,
            created_at: Utc::now(),
            trigger: CheckpointTrigger::Manual,
            snapshots: vec![snapshot("a.txt"), snapshot("src/lib.rs")],
            message_count: 0,
            messages_hash: None,
        };

        assert!(checkpoint.snapshot("src/lib.rs").is_some());
        assert!(checkpoint.snapshot("missing").is_none());
        assert_eq!(checkpoint.total_bytes(), 15);
        assert_eq!(checkpoint.referenced_hashes().count(), 2);
    }
}
