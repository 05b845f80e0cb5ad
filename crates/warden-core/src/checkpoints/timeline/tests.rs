//! Tests for session timelines

use super::{SessionTimeline, TimelineStore};
use crate::checkpoints::types::{
    Checkpoint, CheckpointId, CheckpointTrigger, ContentHash, FileSnapshot, SessionId,
};
use crate::error::WardenError;
use chrono::{Duration, Utc};
use tempfile::TempDir;

fn checkpoint(
    session: &SessionId,
    parent: Option<&CheckpointId>,
    content: &str,
    age_secs: i64,
) -> Checkpoint {
    Checkpoint {
        id: CheckpointId::new(),
        session_id: session.clone(),
        parent_id: parent.cloned(),
        label: Some(content.to_string()),
        created_at: Utc::now() - Duration::seconds(age_secs),
        trigger: CheckpointTrigger::Manual,
        snapshots: vec![FileSnapshot {
            path: "a.txt".to_string(),
            hash: ContentHash::of(content.as_bytes()),
            size: content.len() as u64,
            modified_ms: None,
            mode: None,
        }],
        message_count: 0,
        messages_hash: None,
    }
}

/// root -> c1 -> c2, then a branch root -> c1 -> c3 with head on c3
fn branched() -> (SessionTimeline, [CheckpointId; 4]) {
    let session = SessionId::new();
    let mut timeline = SessionTimeline::new(session.clone());
    let root = checkpoint(&session, None, "0", 40);
    let c1 = checkpoint(&session, Some(&root.id), "1", 30);
    let c2 = checkpoint(&session, Some(&c1.id), "2", 20);
    let c3 = checkpoint(&session, Some(&c1.id), "3", 10);
    let ids = [
        root.id.clone(),
        c1.id.clone(),
        c2.id.clone(),
        c3.id.clone(),
    ];
    for cp in [root, c1, c2, c3] {
        timeline.append(cp).unwrap();
    }
    (timeline, ids)
}

#[test]
fn test_append_moves_head() {
    let (timeline, [root, c1, _, c3]) = branched();

    assert_eq!(timeline.root(), Some(&root));
    assert_eq!(timeline.head(), Some(&c3));
    assert_eq!(timeline.children(&c1).len(), 2);
}

#[test]
fn test_append_rejects_unknown_parent() {
    let session = SessionId::new();
    let mut timeline = SessionTimeline::new(session.clone());
    let orphan = checkpoint(&session, Some(&CheckpointId::new()), "x", 0);

    let err = timeline.append(orphan).unwrap_err();
    assert!(matches!(err, WardenError::NotFound { .. }));
    assert!(timeline.is_empty());
}

#[test]
fn test_append_rejects_second_root() {
    let session = SessionId::new();
    let mut timeline = SessionTimeline::new(session.clone());
    timeline.append(checkpoint(&session, None, "a", 0)).unwrap();

    let err = timeline
        .append(checkpoint(&session, None, "b", 0))
        .unwrap_err();
    assert!(matches!(err, WardenError::Conflict { .. }));
}

#[test]
fn test_entries_depth_first() {
    let (timeline, [root, c1, c2, c3]) = branched();

    let entries = timeline.entries();
    let order: Vec<_> = entries.iter().map(|e| e.checkpoint.id.clone()).collect();
    let depths: Vec<_> = entries.iter().map(|e| e.depth).collect();

    assert_eq!(order, vec![root, c1, c2, c3.clone()]);
    assert_eq!(depths, vec![0, 1, 2, 2]);
    assert!(entries.iter().filter(|e| e.is_head).all(|e| e.checkpoint.id == c3));
}

#[test]
fn test_ancestry() {
    let (timeline, [root, c1, _, c3]) = branched();

    let chain: Vec<_> = timeline
        .ancestry(&c3)
        .unwrap()
        .into_iter()
        .map(|c| c.id.clone())
        .collect();

    assert_eq!(chain, vec![root.clone(), c1.clone(), c3.clone()]);
    assert!(timeline.is_ancestor(&c1, &c3));
    assert!(!timeline.is_ancestor(&c3, &c1));
}

#[test]
fn test_remove_subtree_refuses_head_path() {
    let (mut timeline, [_, c1, c2, _]) = branched();

    let err = timeline.remove_subtree(&c1).unwrap_err();
    assert!(matches!(err, WardenError::Conflict { .. }));

    let removed = timeline.remove_subtree(&c2).unwrap();
    assert_eq!(removed.len(), 1);
    assert!(!timeline.contains(&c2));
    assert_eq!(timeline.children(&c1).len(), 1);
}

#[test]
fn test_prune_to_keeps_head_path() {
    let (mut timeline, [root, c1, c2, c3]) = branched();

    let removed = timeline.prune_to(3);

    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].id, c2);
    for id in [root, c1, c3] {
        assert!(timeline.contains(&id));
    }

    // The head path alone cannot be pruned further
    assert!(timeline.prune_to(1).is_empty());
    assert_eq!(timeline.len(), 3);
}

#[test]
fn test_referenced_hashes() {
    let (timeline, _) = branched();
    assert_eq!(timeline.referenced_hashes().len(), 4);
}

#[tokio::test]
async fn test_store_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let store = TimelineStore::new(temp_dir.path());
    let (timeline, _) = branched();

    store.save(&timeline).await.unwrap();
    let loaded = store.load(&timeline.session_id).await.unwrap().unwrap();

    assert_eq!(loaded, timeline);
    assert_eq!(
        store.list_sessions().await.unwrap(),
        vec![timeline.session_id.clone()]
    );
}

#[test]
fn test_validate_accepts_built_timelines() {
    let (timeline, _) = branched();
    assert_eq!(timeline.validate(), Ok(()));
    assert_eq!(SessionTimeline::new(SessionId::new()).validate(), Ok(()));
}

#[tokio::test]
async fn test_load_rejects_parent_cycle() {
    let temp_dir = TempDir::new().unwrap();
    let store = TimelineStore::new(temp_dir.path());
    let (timeline, [_, c1, c2, _]) = branched();
    store.save(&timeline).await.unwrap();

    // c1 -> c2 -> c1
    let path = temp_dir
        .path()
        .join(timeline.session_id.as_str())
        .join("timeline.json");
    let mut raw: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    raw["checkpoints"][c1.as_str()]["parent_id"] = serde_json::json!(c2.as_str());
    std::fs::write(&path, serde_json::to_vec(&raw).unwrap()).unwrap();

    let err = store.load(&timeline.session_id).await.unwrap_err();
    assert!(matches!(err, WardenError::StorageIo { .. }));
}

#[tokio::test]
async fn test_load_rejects_dangling_head() {
    let temp_dir = TempDir::new().unwrap();
    let store = TimelineStore::new(temp_dir.path());
    let (timeline, _) = branched();
    store.save(&timeline).await.unwrap();

    let path = temp_dir
        .path()
        .join(timeline.session_id.as_str())
        .join("timeline.json");
    let mut raw: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    raw["head"] = serde_json::json!(CheckpointId::new().as_str());
    std::fs::write(&path, serde_json::to_vec(&raw).unwrap()).unwrap();

    assert!(matches!(
        store.load(&timeline.session_id).await.unwrap_err(),
        WardenError::StorageIo { .. }
    ));
}

#[tokio::test]
async fn test_store_messages() {
    let temp_dir = TempDir::new().unwrap();
    let store = TimelineStore::new(temp_dir.path());
    let session = SessionId::new();

    store.append_message(&session, "first").await.unwrap();
    store.append_message(&session, "multi\nline").await.unwrap();
    assert_eq!(
        store.load_messages(&session).await.unwrap(),
        vec!["first".to_string(), "multi\nline".to_string()]
    );

    store
        .write_messages(&session, &["only".to_string()])
        .await
        .unwrap();
    assert_eq!(store.load_messages(&session).await.unwrap(), vec!["only"]);
}

#[tokio::test]
async fn test_store_rejects_unsafe_session_id() {
    let temp_dir = TempDir::new().unwrap();
    let store = TimelineStore::new(temp_dir.path());

    let err = store
        .load(&SessionId::from_string("../outside"))
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::NotFound { .. }));
}

#[tokio::test]
async fn test_memory_store_persists_nothing() {
    let store = TimelineStore::memory();
    let (timeline, _) = branched();

    store.save(&timeline).await.unwrap();
    assert!(store.load(&timeline.session_id).await.unwrap().is_none());
    assert!(store.list_sessions().await.unwrap().is_empty());
}
