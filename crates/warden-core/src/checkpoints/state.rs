//! Process-wide registry of session checkpoint managers

use crate::error::{WardenError, WardenResult};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::config::CheckpointConfig;
use super::manager::CheckpointManager;
use super::storage::{BlobStore, FileBlobStore, MemoryBlobStore};
use super::timeline::{SessionTimeline, TimelineStore};
use super::types::{CheckpointId, ContentHash, SessionId};

/// Result of a garbage collection pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcReport {
    pub sessions_scanned: usize,
    pub live_blobs: usize,
    pub removed_blobs: usize,
}

/// Owns the blob store and one manager per open session
///
/// Sessions are looked up in a sharded map, so status queries on one session never
/// wait for a create or restore on another.
pub struct CheckpointState {
    config: Arc<CheckpointConfig>,
    store: Arc<dyn BlobStore>,
    timelines: TimelineStore,
    gc_gate: Arc<RwLock<()>>,
    managers: DashMap<SessionId, Arc<CheckpointManager>>,
}

impl CheckpointState {
    /// Disk-backed state under the configured checkpoint directory
    pub fn open(config: CheckpointConfig) -> Self {
        let store = Arc::new(FileBlobStore::new(config.blobs_dir()));
        let timelines = TimelineStore::new(config.sessions_dir());
        Self::with_store(config, store, timelines)
    }

    /// Nothing is persisted; the project files are still read and restored on disk
    pub fn in_memory(config: CheckpointConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryBlobStore::new()), TimelineStore::memory())
    }

    pub fn with_store(
        config: CheckpointConfig,
        store: Arc<dyn BlobStore>,
        timelines: TimelineStore,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            timelines,
            gc_gate: Arc::new(RwLock::new(())),
            managers: DashMap::new(),
        }
    }

    pub fn config(&self) -> &CheckpointConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    /// Start a new, empty session
    pub async fn create_session(&self) -> WardenResult<SessionId> {
        let session = SessionId::new();
        let timeline = SessionTimeline::new(session.clone());
        self.timelines.save(&timeline).await?;
        self.insert(session.clone(), timeline, Vec::new());
        tracing::info!("Created session {}", session);
        Ok(session)
    }

    /// Manager for a session, opening (or creating) it on first use
    pub async fn manager(&self, session: &SessionId) -> WardenResult<Arc<CheckpointManager>> {
        if let Some(manager) = self.managers.get(session) {
            return Ok(manager.clone());
        }
        if !session.is_valid() {
            return Err(WardenError::not_found("session", session.as_str()));
        }

        let manager = Arc::new(
            CheckpointManager::open(
                session.clone(),
                self.config.clone(),
                self.store.clone(),
                self.timelines.clone(),
                self.gc_gate.clone(),
            )
            .await?,
        );
        // A concurrent open may have won the race; keep whichever landed first
        Ok(self
            .managers
            .entry(session.clone())
            .or_insert(manager)
            .clone())
    }

    /// Manager for a session that must already exist
    pub async fn existing_manager(
        &self,
        session: &SessionId,
    ) -> WardenResult<Arc<CheckpointManager>> {
        if self.managers.contains_key(session) {
            return self.manager(session).await;
        }
        if self.timelines.load(session).await?.is_none() {
            return Err(WardenError::not_found("session", session.as_str()));
        }
        self.manager(session).await
    }

    /// Copy the history up to `from` into a new, independent session
    pub async fn fork_session(
        &self,
        session: &SessionId,
        from: &CheckpointId,
    ) -> WardenResult<SessionId> {
        let source = self.existing_manager(session).await?;
        let new_session = SessionId::new();
        let (timeline, messages) = source.fork_timeline(from, new_session.clone()).await?;

        self.timelines.save(&timeline).await?;
        self.timelines
            .write_messages(&new_session, &messages)
            .await?;
        self.insert(new_session.clone(), timeline, messages);

        tracing::info!(
            "Forked session {} at {} into {}",
            session,
            from.short(),
            new_session
        );
        Ok(new_session)
    }

    fn insert(&self, session: SessionId, timeline: SessionTimeline, messages: Vec<String>) {
        let manager = CheckpointManager::from_parts(
            session.clone(),
            self.config.clone(),
            self.store.clone(),
            self.timelines.clone(),
            self.gc_gate.clone(),
            timeline,
            messages,
        );
        self.managers.insert(session, Arc::new(manager));
    }

    /// Open and persisted sessions, sorted
    pub async fn sessions(&self) -> WardenResult<Vec<SessionId>> {
        let mut sessions: BTreeSet<SessionId> =
            self.timelines.list_sessions().await?.into_iter().collect();
        sessions.extend(self.managers.iter().map(|entry| entry.key().clone()));
        Ok(sessions.into_iter().collect())
    }

    /// Delete every blob no checkpoint of any session references
    pub async fn collect_garbage(&self) -> WardenResult<GcReport> {
        // Creates hold the gate for reading while their blobs are not yet referenced
        let _gate = self.gc_gate.write().await;

        let sessions = self.sessions().await?;
        let mut live: HashSet<ContentHash> = HashSet::new();
        for session in &sessions {
            let open = self.managers.get(session).map(|m| m.clone());
            match open {
                Some(manager) => live.extend(manager.live_hashes().await),
                None => {
                    if let Some(timeline) = self.timelines.load(session).await? {
                        live.extend(timeline.referenced_hashes());
                    }
                }
            }
        }

        let removed = self.store.gc(&live).await?;
        tracing::info!(
            "Garbage collection over {} sessions: {} live blobs, {} removed",
            sessions.len(),
            live.len(),
            removed
        );
        Ok(GcReport {
            sessions_scanned: sessions.len(),
            live_blobs: live.len(),
            removed_blobs: removed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let state = CheckpointState::open(CheckpointConfig::new(temp_dir.path()));

        let err = state
            .existing_manager(&SessionId::from_string("nope"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, WardenError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_sessions_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("a.txt"), "1").unwrap();

        let (session, checkpoint) = {
            let state = CheckpointState::open(CheckpointConfig::new(temp_dir.path()));
            let session = state.create_session().await.unwrap();
            let manager = state.manager(&session).await.unwrap();
            manager.track_message("hello").await.unwrap();
            let checkpoint = manager.create_checkpoint(None).await.unwrap();
            (session, checkpoint)
        };

        let state = CheckpointState::open(CheckpointConfig::new(temp_dir.path()));
        assert_eq!(state.sessions().await.unwrap(), vec![session.clone()]);
        let manager = state.existing_manager(&session).await.unwrap();
        assert_eq!(manager.head().await, Some(checkpoint));
        assert_eq!(manager.messages().await, vec!["hello"]);
    }

    #[tokio::test]
    async fn test_gc_spares_forked_sessions() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::write(root.join("a.txt"), "v1").unwrap();
        let state = CheckpointState::open(CheckpointConfig::new(root));

        let session = state.create_session().await.unwrap();
        let manager = state.manager(&session).await.unwrap();
        let c1 = manager.create_checkpoint(None).await.unwrap();
        std::fs::write(root.join("a.txt"), "v2").unwrap();
        let c2 = manager.create_checkpoint(None).await.unwrap();

        let fork = state.fork_session(&session, &c1).await.unwrap();
        manager.restore_checkpoint(&c1).await.unwrap();
        manager.prune_branch(&c2).await.unwrap();

        let report = state.collect_garbage().await.unwrap();
        assert_eq!(report.sessions_scanned, 2);
        assert_eq!(report.removed_blobs, 1);

        let forked = state.manager(&fork).await.unwrap();
        std::fs::write(root.join("a.txt"), "scratch").unwrap();
        forked.restore_checkpoint(&c1).await.unwrap();
        assert_eq!(std::fs::read_to_string(root.join("a.txt")).unwrap(), "v1");
    }
}
