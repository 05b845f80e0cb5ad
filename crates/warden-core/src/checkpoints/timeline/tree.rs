//! Session timeline tree

use crate::error::{WardenError, WardenResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use super::super::types::{Checkpoint, CheckpointId, CheckpointSummary, ContentHash, SessionId};

/// Branching history of one session
///
/// Append-only: a checkpoint can only be added under a node that already exists,
/// so the parent chain can never form a cycle. The head marks where the next
/// checkpoint will be attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionTimeline {
    pub session_id: SessionId,
    root: Option<CheckpointId>,
    head: Option<CheckpointId>,
    checkpoints: BTreeMap<CheckpointId, Checkpoint>,
    children: BTreeMap<CheckpointId, Vec<CheckpointId>>,
}

/// One row of a depth-first timeline listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    #[serde(flatten)]
    pub checkpoint: CheckpointSummary,
    pub depth: usize,
    pub children: Vec<CheckpointId>,
    pub is_head: bool,
}

impl SessionTimeline {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            root: None,
            head: None,
            checkpoints: BTreeMap::new(),
            children: BTreeMap::new(),
        }
    }

    /// Build a timeline holding a root-to-tip chain, head at the tip
    pub fn from_chain(session_id: SessionId, chain: Vec<Checkpoint>) -> WardenResult<Self> {
        let mut timeline = Self::new(session_id);
        for checkpoint in chain {
            timeline.append(checkpoint)?;
        }
        Ok(timeline)
    }

    pub fn root(&self) -> Option<&CheckpointId> {
        self.root.as_ref()
    }

    pub fn head(&self) -> Option<&CheckpointId> {
        self.head.as_ref()
    }

    pub fn head_checkpoint(&self) -> Option<&Checkpoint> {
        self.head.as_ref().and_then(|id| self.checkpoints.get(id))
    }

    pub fn get(&self, id: &CheckpointId) -> Option<&Checkpoint> {
        self.checkpoints.get(id)
    }

    pub fn contains(&self, id: &CheckpointId) -> bool {
        self.checkpoints.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    pub fn children(&self, id: &CheckpointId) -> &[CheckpointId] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Add a checkpoint and move the head to it
    pub fn append(&mut self, checkpoint: Checkpoint) -> WardenResult<()> {
        if self.checkpoints.contains_key(&checkpoint.id) {
            return Err(WardenError::conflict(format!(
                "Checkpoint {} already exists in session {}",
                checkpoint.id, self.session_id
            )));
        }

        match &checkpoint.parent_id {
            Some(parent) if !self.checkpoints.contains_key(parent) => {
                return Err(WardenError::not_found("checkpoint", parent.as_str()));
            }
            Some(parent) => {
                self.children
                    .entry(parent.clone())
                    .or_default()
                    .push(checkpoint.id.clone());
            }
            None if self.root.is_some() => {
                return Err(WardenError::conflict(format!(
                    "Session {} already has a root checkpoint",
                    self.session_id
                )));
            }
            None => self.root = Some(checkpoint.id.clone()),
        }

        self.head = Some(checkpoint.id.clone());
        self.checkpoints.insert(checkpoint.id.clone(), checkpoint);
        Ok(())
    }

    /// Point the head at an existing checkpoint
    pub fn set_head(&mut self, id: &CheckpointId) -> WardenResult<()> {
        if !self.contains(id) {
            return Err(WardenError::not_found("checkpoint", id.as_str()));
        }
        self.head = Some(id.clone());
        Ok(())
    }

    /// Check the invariants `append` maintains, for an index read back from disk
    pub fn validate(&self) -> Result<(), String> {
        for (id, checkpoint) in &self.checkpoints {
            if &checkpoint.id != id {
                return Err(format!("checkpoint {} is stored under key {}", checkpoint.id, id));
            }
            match &checkpoint.parent_id {
                Some(parent) if !self.checkpoints.contains_key(parent) => {
                    return Err(format!("checkpoint {} has unknown parent {}", id, parent));
                }
                None if self.root.as_ref() != Some(id) => {
                    return Err(format!("checkpoint {} has no parent but is not the root", id));
                }
                _ => {}
            }
        }

        match &self.root {
            Some(root) if !self.contains(root) => {
                return Err(format!("root {} is not in the timeline", root));
            }
            None if !self.checkpoints.is_empty() => {
                return Err("timeline has checkpoints but no root".to_string());
            }
            _ => {}
        }
        if let Some(head) = &self.head {
            if !self.contains(head) {
                return Err(format!("head {} is not in the timeline", head));
            }
        }

        // Every parent chain must reach the root in fewer steps than there are nodes
        for id in self.checkpoints.keys() {
            let mut current = Some(id);
            let mut steps = 0;
            while let Some(cid) = current {
                steps += 1;
                if steps > self.checkpoints.len() {
                    return Err(format!("parent chain of {} has a cycle", id));
                }
                current = self.checkpoints.get(cid).and_then(|c| c.parent_id.as_ref());
            }
        }

        let mut linked = 0;
        for (parent, children) in &self.children {
            for child in children {
                match self.checkpoints.get(child) {
                    Some(c) if c.parent_id.as_ref() == Some(parent) => linked += 1,
                    _ => {
                        return Err(format!(
                            "child link {} -> {} does not match the parent chain",
                            parent, child
                        ));
                    }
                }
            }
        }
        if linked + usize::from(self.root.is_some()) != self.checkpoints.len() {
            return Err("child links do not cover every checkpoint exactly once".to_string());
        }
        Ok(())
    }

    /// Checkpoints from the root down to `id`, inclusive
    pub fn ancestry(&self, id: &CheckpointId) -> WardenResult<Vec<&Checkpoint>> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(cid) = current {
            let checkpoint = self
                .checkpoints
                .get(cid)
                .ok_or_else(|| WardenError::not_found("checkpoint", cid.as_str()))?;
            chain.push(checkpoint);
            current = checkpoint.parent_id.as_ref();
        }
        chain.reverse();
        Ok(chain)
    }

    /// Whether `ancestor` lies on the path from the root to `id`
    pub fn is_ancestor(&self, ancestor: &CheckpointId, id: &CheckpointId) -> bool {
        let mut current = Some(id);
        while let Some(cid) = current {
            if cid == ancestor {
                return true;
            }
            current = self.checkpoints.get(cid).and_then(|c| c.parent_id.as_ref());
        }
        false
    }

    /// `id` and everything below it
    pub fn subtree(&self, id: &CheckpointId) -> Vec<CheckpointId> {
        let mut out = Vec::new();
        let mut stack = vec![id.clone()];
        while let Some(cid) = stack.pop() {
            stack.extend(self.children(&cid).iter().rev().cloned());
            out.push(cid);
        }
        out
    }

    /// Depth-first listing from the root, children in creation order
    pub fn entries(&self) -> Vec<TimelineEntry> {
        let mut entries = Vec::with_capacity(self.checkpoints.len());
        let Some(root) = &self.root else {
            return entries;
        };

        let mut stack = vec![(root.clone(), 0usize)];
        while let Some((id, depth)) = stack.pop() {
            let Some(checkpoint) = self.checkpoints.get(&id) else {
                continue;
            };
            let children = self.children(&id).to_vec();
            for child in children.iter().rev() {
                stack.push((child.clone(), depth + 1));
            }
            entries.push(TimelineEntry {
                checkpoint: checkpoint.summary(),
                depth,
                children,
                is_head: self.head.as_ref() == Some(&id),
            });
        }
        entries
    }

    /// Delete a subtree that does not contain the head
    pub fn remove_subtree(&mut self, id: &CheckpointId) -> WardenResult<Vec<Checkpoint>> {
        if !self.contains(id) {
            return Err(WardenError::not_found("checkpoint", id.as_str()));
        }
        if let Some(head) = &self.head {
            if self.is_ancestor(id, head) {
                return Err(WardenError::conflict(format!(
                    "Cannot prune {}: the session head {} depends on it",
                    id, head
                )));
            }
        }

        let doomed = self.subtree(id);
        if let Some(parent) = self.checkpoints.get(id).and_then(|c| c.parent_id.clone()) {
            if let Some(siblings) = self.children.get_mut(&parent) {
                siblings.retain(|c| c != id);
            }
        }

        let mut removed = Vec::with_capacity(doomed.len());
        for cid in doomed {
            self.children.remove(&cid);
            if let Some(checkpoint) = self.checkpoints.remove(&cid) {
                removed.push(checkpoint);
            }
        }
        Ok(removed)
    }

    /// Drop the oldest leaves off the head's path until at most `max` checkpoints remain
    pub fn prune_to(&mut self, max: usize) -> Vec<Checkpoint> {
        let mut removed = Vec::new();
        while self.checkpoints.len() > max {
            let head = self.head.clone();
            let oldest_leaf = self
                .checkpoints
                .values()
                .filter(|c| self.children(&c.id).is_empty())
                .filter(|c| match &head {
                    Some(h) => !self.is_ancestor(&c.id, h),
                    None => true,
                })
                .min_by_key(|c| c.created_at)
                .map(|c| c.id.clone());

            let Some(leaf) = oldest_leaf else {
                break;
            };
            match self.remove_subtree(&leaf) {
                Ok(mut pruned) => removed.append(&mut pruned),
                Err(_) => break,
            }
        }
        removed
    }

    /// Every blob referenced by any checkpoint in this timeline
    pub fn referenced_hashes(&self) -> HashSet<ContentHash> {
        self.checkpoints
            .values()
            .flat_map(|c| c.referenced_hashes().cloned())
            .collect()
    }
}
