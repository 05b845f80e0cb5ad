//! Checkpoint system for reviewing and rolling back agent changes
//!
//! A checkpoint is a complete, immutable record of every tracked file in a project.
//! File contents live in a content-addressable blob store, so unchanged files cost
//! nothing to re-snapshot. Checkpoints of a session form a branching timeline:
//! restoring an older checkpoint moves the head without discarding the newer branch.
//!
//! # Example
//!
//! ```rust,no_run
//! use warden_core::checkpoints::{CheckpointConfig, CheckpointState};
//!
//! # async fn example() -> warden_core::error::WardenResult<()> {
//! let state = CheckpointState::open(CheckpointConfig::new("/path/to/project"));
//! let session = state.create_session().await?;
//! let manager = state.manager(&session).await?;
//!
//! let before = manager.create_checkpoint(Some("before refactor".into())).await?;
//! // ... the agent edits files ...
//! manager.restore_checkpoint(&before).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod diff;
pub mod manager;
pub mod policy;
pub mod restore;
pub mod scanner;
pub mod state;
pub mod storage;
pub mod timeline;
pub mod types;

pub use config::{CheckpointConfig, STATE_DIR_NAME, default_excluded_dirs};
pub use diff::{ChangeKind, FileContent, FileDiff, TextDiff};
pub use manager::CheckpointManager;
pub use policy::{AutoCheckpointPolicy, CheckpointStrategy, ToolInvocation};
pub use restore::RestoreOutcome;
pub use state::{CheckpointState, GcReport};
pub use storage::{BlobStore, FileBlobStore, MemoryBlobStore, StoreStats};
pub use timeline::{SessionTimeline, TimelineEntry, TimelineStore};
pub use types::{
    Checkpoint, CheckpointId, CheckpointSummary, CheckpointTrigger, ContentHash, FileSnapshot,
    SessionId,
};
