//! Core CheckpointManager struct and construction

use crate::error::WardenResult;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};

use super::super::config::CheckpointConfig;
use super::super::scanner::ProjectScanner;
use super::super::storage::BlobStore;
use super::super::timeline::{SessionTimeline, TimelineStore};
use super::super::types::{Checkpoint, CheckpointId, SessionId};

/// Mutable per-session state, guarded by the manager's operation lock
pub(super) struct SessionState {
    pub timeline: SessionTimeline,
    pub messages: Vec<String>,
    pub last_auto: Option<Instant>,
}

/// Checkpoint manager for a single session
///
/// All operations that read or move the head hold the session lock for their
/// whole duration, so create, restore, fork and prune on one session never
/// interleave. Different sessions never contend on it.
pub struct CheckpointManager {
    pub(super) session_id: SessionId,
    pub(super) config: Arc<CheckpointConfig>,
    pub(super) scanner: ProjectScanner,
    pub(super) store: Arc<dyn BlobStore>,
    pub(super) timelines: TimelineStore,
    /// Shared with garbage collection, which takes it exclusively
    pub(super) gc_gate: Arc<RwLock<()>>,
    pub(super) state: Mutex<SessionState>,
}

impl CheckpointManager {
    /// Open a session, loading its persisted timeline and message log if present
    pub async fn open(
        session_id: SessionId,
        config: Arc<CheckpointConfig>,
        store: Arc<dyn BlobStore>,
        timelines: TimelineStore,
        gc_gate: Arc<RwLock<()>>,
    ) -> WardenResult<Self> {
        let timeline = match timelines.load(&session_id).await? {
            Some(timeline) => {
                tracing::debug!(
                    "Loaded session {} with {} checkpoints",
                    session_id,
                    timeline.len()
                );
                timeline
            }
            None => SessionTimeline::new(session_id.clone()),
        };
        let messages = timelines.load_messages(&session_id).await?;

        Ok(Self::from_parts(
            session_id, config, store, timelines, gc_gate, timeline, messages,
        ))
    }

    pub(crate) fn from_parts(
        session_id: SessionId,
        config: Arc<CheckpointConfig>,
        store: Arc<dyn BlobStore>,
        timelines: TimelineStore,
        gc_gate: Arc<RwLock<()>>,
        timeline: SessionTimeline,
        messages: Vec<String>,
    ) -> Self {
        Self {
            scanner: config.scanner(),
            session_id,
            config,
            store,
            timelines,
            gc_gate,
            state: Mutex::new(SessionState {
                timeline,
                messages,
                last_auto: None,
            }),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn config(&self) -> &CheckpointConfig {
        &self.config
    }

    /// Current head checkpoint id
    pub async fn head(&self) -> Option<CheckpointId> {
        self.state.lock().await.timeline.head().cloned()
    }

    /// Get a checkpoint of this session
    pub async fn get(&self, id: &CheckpointId) -> Option<Checkpoint> {
        self.state.lock().await.timeline.get(id).cloned()
    }

    /// Copy of the whole timeline
    pub async fn timeline(&self) -> SessionTimeline {
        self.state.lock().await.timeline.clone()
    }

    /// Current message log
    pub async fn messages(&self) -> Vec<String> {
        self.state.lock().await.messages.clone()
    }

    /// Append to the running message log
    pub async fn track_message(&self, message: impl Into<String>) -> WardenResult<usize> {
        let message = message.into();
        let mut state = self.state.lock().await;
        self.timelines
            .append_message(&self.session_id, &message)
            .await?;
        state.messages.push(message);
        Ok(state.messages.len())
    }
}
