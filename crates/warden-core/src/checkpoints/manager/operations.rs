//! Checkpoint operations: create, restore, diff, prune

use crate::error::{WardenError, WardenResult};
use chrono::Utc;
use std::collections::BTreeMap;
use std::time::Instant;
use tokio::fs;

use super::super::diff::{FileContent, FileDiff, TextDiff, changed_paths};
use super::super::policy::{PolicyEvent, ToolInvocation};
use super::super::restore::{RestoreOutcome, RestorePlan, RestoreTransaction};
use super::super::scanner::TrackedFile;
use super::super::timeline::{SessionTimeline, TimelineEntry};
use super::super::types::{
    Checkpoint, CheckpointId, CheckpointTrigger, ContentHash, FileSnapshot, SessionId,
};
use super::core::{CheckpointManager, SessionState};

const RACY_WINDOW_MS: i64 = 2_000;

impl CheckpointManager {
    /// Snapshot the project as a new checkpoint under the current head
    pub async fn create_checkpoint(&self, label: Option<String>) -> WardenResult<CheckpointId> {
        // Lock order is gc gate, then session state
        let _gate = self.gc_gate.read().await;
        let mut state = self.state.lock().await;
        self.create_locked(&mut state, label, CheckpointTrigger::Manual)
            .await
    }

    pub(super) async fn create_locked(
        &self,
        state: &mut SessionState,
        label: Option<String>,
        trigger: CheckpointTrigger,
    ) -> WardenResult<CheckpointId> {
        let head = state.timeline.head_checkpoint().cloned();
        let files = self.scanner.scan().await?;
        let snapshots = self.snapshot_files(&files, head.as_ref()).await?;

        let messages_hash = if state.messages.is_empty() {
            None
        } else {
            Some(
                self.store
                    .store(&serde_json::to_vec(&state.messages)?)
                    .await?,
            )
        };

        let checkpoint = Checkpoint {
            id: CheckpointId::new(),
            session_id: self.session_id.clone(),
            parent_id: head.as_ref().map(|h| h.id.clone()),
            label,
            created_at: Utc::now(),
            trigger,
            snapshots,
            message_count: state.messages.len(),
            messages_hash,
        };
        let id = checkpoint.id.clone();
        let file_count = checkpoint.snapshots.len();

        // Swap in the new timeline only once it is durable
        let mut next = state.timeline.clone();
        next.append(checkpoint)?;
        if let Some(max) = self.config.max_checkpoints {
            let pruned = next.prune_to(max);
            if !pruned.is_empty() {
                tracing::info!(
                    "Pruned {} old checkpoints from session {}",
                    pruned.len(),
                    self.session_id
                );
            }
        }
        self.timelines.save(&next).await?;
        state.timeline = next;

        tracing::info!(
            "Created checkpoint {} in session {} with {} files",
            id.short(),
            self.session_id,
            file_count
        );
        Ok(id)
    }

    /// Hash and store every tracked file, reusing head hashes for untouched files
    async fn snapshot_files(
        &self,
        files: &BTreeMap<String, TrackedFile>,
        head: Option<&Checkpoint>,
    ) -> WardenResult<Vec<FileSnapshot>> {
        let mut snapshots = Vec::with_capacity(files.len());
        let mut stored = 0usize;

        // A file whose mtime is close to the head's creation may have changed again
        // within the same timestamp tick, so only clearly older files are trusted.
        let trusted_before = head.map(|h| h.created_at.timestamp_millis() - RACY_WINDOW_MS);

        for (path, file) in files {
            let previous = head.and_then(|h| h.snapshot(path));
            let reusable = previous.filter(|prev| {
                prev.size == file.size
                    && prev.modified_ms == file.modified_ms
                    && matches!(
                        (file.modified_ms, trusted_before),
                        (Some(mtime), Some(limit)) if mtime < limit
                    )
            });

            let hash = match reusable {
                Some(prev) => prev.hash.clone(),
                None => {
                    let bytes = fs::read(&file.abs_path).await.map_err(|e| {
                        WardenError::storage_io(
                            format!("Failed to read tracked file: {}", e),
                            &file.abs_path,
                        )
                    })?;
                    stored += 1;
                    self.store.store(&bytes).await?
                }
            };

            snapshots.push(FileSnapshot {
                path: path.clone(),
                hash,
                size: file.size,
                modified_ms: file.modified_ms,
                mode: file.mode,
            });
        }

        tracing::debug!(
            "Snapshot of {} files, {} read from disk",
            snapshots.len(),
            stored
        );
        Ok(snapshots)
    }

    /// Bring the project back to a checkpoint and move the head to it
    pub async fn restore_checkpoint(&self, id: &CheckpointId) -> WardenResult<RestoreOutcome> {
        let mut state = self.state.lock().await;
        let target = state
            .timeline
            .get(id)
            .cloned()
            .ok_or_else(|| WardenError::not_found("checkpoint", id.as_str()))?;

        let current = self.scanner.scan().await?;
        let plan = RestorePlan::build(&target, &current).await?;

        // Everything fallible that does not touch the project happens first
        let pending = plan.load_contents(self.store.as_ref()).await?;
        let messages = self.load_message_log(&target).await?;
        let mut next = state.timeline.clone();
        next.set_head(id)?;

        let tx = RestoreTransaction::apply(&self.scanner, &plan.deletes, pending).await?;

        let committed = match self.timelines.save(&next).await {
            Ok(()) => {
                self.timelines
                    .write_messages(&self.session_id, &messages)
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = committed {
            tracing::error!("Failed to persist restore of {}: {}", id, e);
            tx.rollback().await;
            // The index may already point at the target; put the old head back
            let _ = self.timelines.save(&state.timeline).await;
            return Err(e);
        }

        state.timeline = next;
        state.messages = messages;

        let outcome = plan.outcome(id.clone(), state.messages.len());
        tracing::info!(
            "Restored checkpoint {} in session {}: {} written, {} deleted, {} unchanged",
            id.short(),
            self.session_id,
            outcome.restored.len(),
            outcome.deleted.len(),
            outcome.unchanged
        );
        Ok(outcome)
    }

    /// What `restore_checkpoint` would do, without touching anything
    pub async fn preview_restore(&self, id: &CheckpointId) -> WardenResult<RestoreOutcome> {
        let state = self.state.lock().await;
        let target = state
            .timeline
            .get(id)
            .ok_or_else(|| WardenError::not_found("checkpoint", id.as_str()))?;
        let current = self.scanner.scan().await?;
        let plan = RestorePlan::build(target, &current).await?;
        Ok(plan.outcome(id.clone(), target.message_count))
    }

    pub(super) async fn load_message_log(
        &self,
        checkpoint: &Checkpoint,
    ) -> WardenResult<Vec<String>> {
        let Some(hash) = &checkpoint.messages_hash else {
            return Ok(Vec::new());
        };
        let raw = self.store.retrieve(hash).await?;
        let messages: Vec<String> = serde_json::from_slice(&raw).map_err(|e| {
            WardenError::storage(format!("Corrupt message log blob {}: {}", hash, e))
        })?;
        if messages.len() != checkpoint.message_count {
            return Err(WardenError::storage(format!(
                "Message log blob {} holds {} messages, checkpoint expects {}",
                hash,
                messages.len(),
                checkpoint.message_count
            )));
        }
        Ok(messages)
    }

    /// Depth-first listing of the session timeline
    pub async fn list_checkpoints(&self) -> Vec<TimelineEntry> {
        self.state.lock().await.timeline.entries()
    }

    /// Files that differ between two checkpoints of this session
    pub async fn diff_checkpoints(
        &self,
        from: &CheckpointId,
        to: &CheckpointId,
    ) -> WardenResult<Vec<FileDiff>> {
        let (a, b) = {
            let state = self.state.lock().await;
            let get = |id: &CheckpointId| {
                state
                    .timeline
                    .get(id)
                    .cloned()
                    .ok_or_else(|| WardenError::not_found("checkpoint", id.as_str()))
            };
            (get(from)?, get(to)?)
        };

        let mut diffs = Vec::new();
        for changed in changed_paths(&a, &b) {
            let before = self.load_side(&a, &changed.path).await?;
            let after = self.load_side(&b, &changed.path).await?;
            let unified = match (
                before.as_ref().map(FileContent::as_text),
                after.as_ref().map(FileContent::as_text),
            ) {
                // Binary on either side
                (Some(None), _) | (_, Some(None)) => None,
                (old, new) => {
                    let text = TextDiff::compute(
                        old.flatten().unwrap_or_default(),
                        new.flatten().unwrap_or_default(),
                    );
                    text.has_changes()
                        .then(|| text.format_unified(&changed.path))
                }
            };
            diffs.push(FileDiff {
                path: changed.path,
                change: changed.change,
                before,
                after,
                unified,
            });
        }
        Ok(diffs)
    }

    async fn load_side(
        &self,
        checkpoint: &Checkpoint,
        path: &str,
    ) -> WardenResult<Option<FileContent>> {
        match checkpoint.snapshot(path) {
            Some(snapshot) => {
                let bytes = self.store.retrieve(&snapshot.hash).await?;
                Ok(Some(FileContent::from_bytes(bytes)))
            }
            None => Ok(None),
        }
    }

    /// Delete a branch that the head does not depend on
    pub async fn prune_branch(&self, id: &CheckpointId) -> WardenResult<usize> {
        let mut state = self.state.lock().await;
        let mut next = state.timeline.clone();
        let removed = next.remove_subtree(id)?;
        self.timelines.save(&next).await?;
        state.timeline = next;

        tracing::info!(
            "Pruned {} checkpoints under {} from session {}",
            removed.len(),
            id.short(),
            self.session_id
        );
        Ok(removed.len())
    }

    /// Timeline and message log for a new session branching at `from`
    pub async fn fork_timeline(
        &self,
        from: &CheckpointId,
        new_session: SessionId,
    ) -> WardenResult<(SessionTimeline, Vec<String>)> {
        let state = self.state.lock().await;
        let chain: Vec<Checkpoint> = state
            .timeline
            .ancestry(from)?
            .into_iter()
            .cloned()
            .collect();
        let tip = chain
            .last()
            .cloned()
            .ok_or_else(|| WardenError::not_found("checkpoint", from.as_str()))?;
        drop(state);

        let messages = self.load_message_log(&tip).await?;
        let timeline = SessionTimeline::from_chain(new_session, chain)?;
        Ok((timeline, messages))
    }

    /// Report tool calls to the automatic policy; returns the checkpoint if one was taken
    pub async fn record_tool_use(
        &self,
        tools: &[ToolInvocation],
    ) -> WardenResult<Option<CheckpointId>> {
        self.maybe_auto_checkpoint(PolicyEvent::ToolUse(tools), "after tool use")
            .await
    }

    /// Report a user prompt to the automatic policy
    pub async fn record_user_prompt(&self) -> WardenResult<Option<CheckpointId>> {
        self.maybe_auto_checkpoint(PolicyEvent::UserPrompt, "before prompt")
            .await
    }

    async fn maybe_auto_checkpoint(
        &self,
        event: PolicyEvent<'_>,
        reason: &str,
    ) -> WardenResult<Option<CheckpointId>> {
        let _gate = self.gc_gate.read().await;
        let mut state = self.state.lock().await;
        let now = Instant::now();
        if !self.config.auto.should_checkpoint(event, state.last_auto, now) {
            return Ok(None);
        }

        let id = self
            .create_locked(
                &mut state,
                Some(format!("auto: {}", reason)),
                CheckpointTrigger::Auto,
            )
            .await?;
        state.last_auto = Some(now);
        Ok(Some(id))
    }

    /// Every blob referenced by this session's checkpoints: file snapshots and stored message logs
    pub async fn live_hashes(&self) -> std::collections::HashSet<ContentHash> {
        self.state.lock().await.timeline.referenced_hashes()
    }
}
