//! End-to-end checkpoint behavior through the public API

use std::fs;
use tempfile::TempDir;
use warden::sandbox::PlatformCapabilities;
use warden::{Warden, WardenConfig};

fn open(root: &std::path::Path) -> Warden {
    Warden::with_platform(root, WardenConfig::default(), PlatformCapabilities::none()).unwrap()
}

#[tokio::test]
async fn test_restore_keeps_later_checkpoint_reachable() {
    let temp_dir = TempDir::new().unwrap();
    let warden = open(temp_dir.path());
    let root = warden.project_root().to_path_buf();

    let session = warden.create_session().await.unwrap();
    fs::write(root.join("a.txt"), "1").unwrap();
    let c1 = warden.create_checkpoint(&session, None).await.unwrap();
    fs::write(root.join("a.txt"), "2").unwrap();
    let c2 = warden.create_checkpoint(&session, None).await.unwrap();

    warden.restore_checkpoint(&session, &c1).await.unwrap();
    assert_eq!(fs::read_to_string(root.join("a.txt")).unwrap(), "1");

    let entries = warden.list_checkpoints(&session).await.unwrap();
    let first = entries.iter().find(|e| e.checkpoint.id == c1).unwrap();
    let second = entries.iter().find(|e| e.checkpoint.id == c2).unwrap();
    assert!(first.is_head);
    assert_eq!(second.checkpoint.parent_id.as_ref(), Some(&c1));
    assert!(first.children.contains(&c2));
}

#[tokio::test]
async fn test_new_checkpoint_after_restore_branches() {
    let temp_dir = TempDir::new().unwrap();
    let warden = open(temp_dir.path());
    let root = warden.project_root().to_path_buf();

    let session = warden.create_session().await.unwrap();
    fs::write(root.join("a.txt"), "1").unwrap();
    let c1 = warden.create_checkpoint(&session, None).await.unwrap();
    fs::write(root.join("later.txt"), "x").unwrap();
    let c2 = warden.create_checkpoint(&session, None).await.unwrap();

    warden.restore_checkpoint(&session, &c1).await.unwrap();
    assert!(!root.join("later.txt").exists());

    fs::write(root.join("a.txt"), "3").unwrap();
    let c3 = warden.create_checkpoint(&session, None).await.unwrap();

    let entries = warden.list_checkpoints(&session).await.unwrap();
    assert_eq!(entries.len(), 3);
    let first = entries.iter().find(|e| e.checkpoint.id == c1).unwrap();
    assert_eq!(first.children.len(), 2);
    assert!(first.children.contains(&c2));
    assert!(first.children.contains(&c3));

    // the abandoned branch still restores
    warden.restore_checkpoint(&session, &c2).await.unwrap();
    assert_eq!(fs::read_to_string(root.join("later.txt")).unwrap(), "x");
    assert_eq!(fs::read_to_string(root.join("a.txt")).unwrap(), "1");
}

#[tokio::test]
async fn test_identical_content_is_stored_once() {
    let temp_dir = TempDir::new().unwrap();
    let warden = open(temp_dir.path());
    let root = warden.project_root().to_path_buf();

    fs::write(root.join("a.txt"), "same bytes").unwrap();
    fs::create_dir_all(root.join("copy")).unwrap();
    fs::write(root.join("copy/b.txt"), "same bytes").unwrap();

    let first = warden.create_session().await.unwrap();
    let second = warden.create_session().await.unwrap();
    warden.create_checkpoint(&first, None).await.unwrap();
    warden.create_checkpoint(&second, None).await.unwrap();

    let stats = warden.checkpoints().store().stats().await.unwrap();
    assert_eq!(stats.blob_count, 1);

    let report = warden.collect_garbage().await.unwrap();
    assert_eq!(report.removed_blobs, 0);
    assert_eq!(report.live_blobs, 1);
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let session;
    let checkpoint;
    {
        let warden = open(temp_dir.path());
        fs::write(warden.project_root().join("a.txt"), "kept").unwrap();
        session = warden.create_session().await.unwrap();
        checkpoint = warden.create_checkpoint(&session, None).await.unwrap();
    }

    let warden = open(temp_dir.path());
    fs::write(warden.project_root().join("a.txt"), "changed").unwrap();
    warden.restore_checkpoint(&session, &checkpoint).await.unwrap();
    assert_eq!(
        fs::read_to_string(warden.project_root().join("a.txt")).unwrap(),
        "kept"
    );
}
