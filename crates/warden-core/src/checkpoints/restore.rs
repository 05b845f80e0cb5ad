//! Transactional restoration of checkpoint file state

use crate::error::{WardenError, WardenResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::scanner::{ProjectScanner, TrackedFile};
use super::storage::BlobStore;
use super::types::{Checkpoint, CheckpointId, ContentHash, FileSnapshot};

/// What a restore changed (or would change, for a preview)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreOutcome {
    pub checkpoint_id: CheckpointId,
    /// Files rewritten from the checkpoint
    pub restored: Vec<String>,
    /// Tracked files removed because the checkpoint does not contain them
    pub deleted: Vec<String>,
    /// Files already identical to the checkpoint
    pub unchanged: usize,
    /// Message log length after the restore
    pub message_count: usize,
}

/// Work needed to bring the project to a checkpoint's state
#[derive(Debug, Clone, Default)]
pub(crate) struct RestorePlan {
    pub writes: Vec<FileSnapshot>,
    pub deletes: Vec<String>,
    pub unchanged: usize,
}

impl RestorePlan {
    /// Compare the checkpoint with the files currently on disk
    pub async fn build(
        target: &Checkpoint,
        current: &BTreeMap<String, TrackedFile>,
    ) -> WardenResult<Self> {
        let mut plan = Self::default();

        for snapshot in &target.snapshots {
            let identical = match current.get(&snapshot.path) {
                Some(file) if file.size == snapshot.size => {
                    let bytes = fs::read(&file.abs_path).await.map_err(|e| {
                        WardenError::storage_io(
                            format!("Failed to read file: {}", e),
                            &file.abs_path,
                        )
                    })?;
                    ContentHash::of(&bytes) == snapshot.hash
                        && (snapshot.mode.is_none() || snapshot.mode == file.mode)
                }
                _ => false,
            };
            if identical {
                plan.unchanged += 1;
            } else {
                plan.writes.push(snapshot.clone());
            }
        }

        plan.deletes = current
            .keys()
            .filter(|path| target.snapshot(path).is_none())
            .cloned()
            .collect();

        Ok(plan)
    }

    pub fn outcome(&self, checkpoint_id: CheckpointId, message_count: usize) -> RestoreOutcome {
        RestoreOutcome {
            checkpoint_id,
            restored: self.writes.iter().map(|s| s.path.clone()).collect(),
            deleted: self.deletes.clone(),
            unchanged: self.unchanged,
            message_count,
        }
    }

    /// Fetch every blob the plan writes, before anything on disk is touched
    pub async fn load_contents(
        &self,
        store: &dyn BlobStore,
    ) -> WardenResult<Vec<PendingWrite>> {
        let mut pending = Vec::with_capacity(self.writes.len());
        for snapshot in &self.writes {
            let bytes = store.retrieve(&snapshot.hash).await?;
            if ContentHash::of(&bytes) != snapshot.hash {
                return Err(WardenError::storage(format!(
                    "Blob {} does not match its hash",
                    snapshot.hash
                )));
            }
            pending.push(PendingWrite {
                path: snapshot.path.clone(),
                bytes,
                mode: snapshot.mode,
            });
        }
        Ok(pending)
    }
}

/// File content waiting to be written by a restore
#[derive(Debug, Clone)]
pub(crate) struct PendingWrite {
    pub path: String,
    pub bytes: Vec<u8>,
    pub mode: Option<u32>,
}

/// What occupied a path before a restore touched it
#[derive(Debug)]
enum PriorState {
    Absent,
    File { bytes: Vec<u8>, mode: Option<u32> },
    Symlink(PathBuf),
    /// An empty directory
    Dir,
}

#[derive(Debug)]
struct JournalEntry {
    path: PathBuf,
    previous: PriorState,
}

/// Applied restore that can still be undone
///
/// Every path is journaled before it is modified, so `rollback` puts the
/// project back exactly as it was. Symlinks are never followed: a link in place
/// of a restored file or directory is journaled and replaced, and every write
/// lands in a directory that resolves inside the project root.
#[derive(Debug, Default)]
pub(crate) struct RestoreTransaction {
    journal: Vec<JournalEntry>,
}

impl RestoreTransaction {
    /// Delete and write files; on failure everything already done is undone
    pub async fn apply(
        scanner: &ProjectScanner,
        deletes: &[String],
        writes: Vec<PendingWrite>,
    ) -> WardenResult<Self> {
        let mut tx = Self::default();
        if let Err(e) = tx.apply_inner(scanner, deletes, writes).await {
            tracing::error!("Restore failed, rolling back {} paths: {}", tx.journal.len(), e);
            tx.rollback().await;
            return Err(e);
        }
        Ok(tx)
    }

    async fn apply_inner(
        &mut self,
        scanner: &ProjectScanner,
        deletes: &[String],
        writes: Vec<PendingWrite>,
    ) -> WardenResult<()> {
        let root = scanner.root();
        let real_root = fs::canonicalize(root).await.map_err(|e| {
            WardenError::storage_io(format!("Failed to resolve project root: {}", e), root)
        })?;

        let mut deleted = Vec::with_capacity(deletes.len());
        for relative in deletes {
            let path = resolve_tracked(scanner, relative)?;
            if let Some(parent) = path.parent() {
                ensure_contained(&real_root, parent).await?;
            }
            self.vacate(&path).await?;
            tracing::debug!("Deleted {}", relative);
            deleted.push(path);
        }
        // A file may come back where a directory was emptied by the deletes
        for path in &deleted {
            self.prune_empty_parents(root, path).await;
        }

        for write in writes {
            let path = resolve_tracked(scanner, &write.path)?;
            if let Some(parent) = path.parent() {
                self.prepare_parents(root, parent).await?;
                ensure_contained(&real_root, parent).await?;
            }
            self.vacate(&path).await?;
            write_new(&path, &write.bytes).await?;
            set_mode(&path, write.mode).await?;
            tracing::debug!("Restored {} ({} bytes)", write.path, write.bytes.len());
        }
        Ok(())
    }

    /// Journal whatever occupies `path` and remove it
    ///
    /// Files and symlinks are unlinked (a link's target is left alone); a
    /// directory is removed only when empty.
    async fn vacate(&mut self, path: &Path) -> WardenResult<()> {
        let metadata = match fs::symlink_metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.journal.push(JournalEntry {
                    path: path.to_path_buf(),
                    previous: PriorState::Absent,
                });
                return Ok(());
            }
            Err(e) => {
                return Err(WardenError::storage_io(
                    format!("Failed to inspect path before restore: {}", e),
                    path,
                ));
            }
        };

        let file_type = metadata.file_type();
        let previous = if file_type.is_symlink() {
            let target = fs::read_link(path).await.map_err(|e| {
                WardenError::storage_io(format!("Failed to read symlink before restore: {}", e), path)
            })?;
            PriorState::Symlink(target)
        } else if file_type.is_dir() {
            PriorState::Dir
        } else if file_type.is_file() {
            let bytes = fs::read(path).await.map_err(|e| {
                WardenError::storage_io(format!("Failed to read file before restore: {}", e), path)
            })?;
            PriorState::File {
                bytes,
                mode: mode_of(&metadata),
            }
        } else {
            return Err(WardenError::storage_io(
                "Restore target is not a regular file, directory or symlink",
                path,
            ));
        };

        let removed = if file_type.is_dir() {
            fs::remove_dir(path).await
        } else {
            fs::remove_file(path).await
        };
        removed.map_err(|e| {
            WardenError::storage_io(format!("Failed to clear path before restore: {}", e), path)
        })?;
        self.journal.push(JournalEntry {
            path: path.to_path_buf(),
            previous,
        });
        Ok(())
    }

    /// Make every component between the root and `dir` a real directory
    async fn prepare_parents(&mut self, root: &Path, dir: &Path) -> WardenResult<()> {
        let relative = dir.strip_prefix(root).map_err(|_| {
            WardenError::storage_io("Restore target is outside the project root", dir)
        })?;

        let mut current = root.to_path_buf();
        for component in relative.components() {
            current.push(component);
            match fs::symlink_metadata(&current).await {
                Ok(metadata) if metadata.file_type().is_dir() => continue,
                Ok(metadata) if metadata.file_type().is_symlink() => {
                    tracing::warn!("Replacing symlinked directory {:?} during restore", current);
                    self.vacate(&current).await?;
                }
                Ok(_) => {
                    return Err(WardenError::storage_io(
                        "A file is in the way of a restored directory",
                        &current,
                    ));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(WardenError::storage_io(
                        format!("Failed to inspect directory: {}", e),
                        &current,
                    ));
                }
            }
            fs::create_dir(&current).await.map_err(|e| {
                WardenError::storage_io(format!("Failed to create directory: {}", e), &current)
            })?;
            self.journal.push(JournalEntry {
                path: current.clone(),
                previous: PriorState::Absent,
            });
        }
        Ok(())
    }

    async fn prune_empty_parents(&mut self, root: &Path, path: &Path) {
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir == root || !dir.starts_with(root) {
                break;
            }
            // remove_dir only succeeds on empty directories
            if fs::remove_dir(dir).await.is_err() {
                break;
            }
            self.journal.push(JournalEntry {
                path: dir.to_path_buf(),
                previous: PriorState::Dir,
            });
            current = dir.parent();
        }
    }

    /// Undo every journaled change, newest first
    pub async fn rollback(self) {
        for entry in self.journal.into_iter().rev() {
            if let Err(e) = undo(&entry).await {
                tracing::error!("Rollback of {:?} failed: {}", entry.path, e);
            }
        }
    }
}

async fn undo(entry: &JournalEntry) -> std::io::Result<()> {
    clear(&entry.path).await?;
    match &entry.previous {
        PriorState::Absent => Ok(()),
        PriorState::File { bytes, mode } => {
            fs::write(&entry.path, bytes).await?;
            apply_mode(&entry.path, *mode).await
        }
        PriorState::Symlink(target) => make_symlink(target, &entry.path).await,
        PriorState::Dir => fs::create_dir(&entry.path).await,
    }
}

/// Remove what a restore left at `path`
async fn clear(path: &Path) -> std::io::Result<()> {
    match fs::symlink_metadata(path).await {
        Ok(metadata) if metadata.file_type().is_dir() => fs::remove_dir(path).await,
        Ok(_) => fs::remove_file(path).await,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Absolute path for a tracked key, rejecting keys that could leave the root
fn resolve_tracked(scanner: &ProjectScanner, relative: &str) -> WardenResult<PathBuf> {
    let valid = !relative.is_empty()
        && relative
            .split('/')
            .all(|part| !part.is_empty() && part != "." && part != "..");
    if !valid {
        return Err(WardenError::storage_io(
            format!("Invalid tracked path '{}' in checkpoint", relative),
            scanner.root(),
        ));
    }
    Ok(scanner.resolve(relative))
}

async fn ensure_contained(real_root: &Path, dir: &Path) -> WardenResult<()> {
    let resolved = fs::canonicalize(dir).await.map_err(|e| {
        WardenError::storage_io(format!("Failed to resolve directory: {}", e), dir)
    })?;
    if !resolved.starts_with(real_root) {
        return Err(WardenError::storage_io(
            format!("Directory resolves outside the project to {}", resolved.display()),
            dir,
        ));
    }
    Ok(())
}

/// Create a fresh file; never opens an existing path or follows a link
async fn write_new(path: &Path, bytes: &[u8]) -> WardenResult<()> {
    use tokio::io::AsyncWriteExt;

    let to_error =
        |e: std::io::Error| WardenError::storage_io(format!("Failed to restore file: {}", e), path);
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .map_err(to_error)?;
    file.write_all(bytes).await.map_err(to_error)?;
    file.flush().await.map_err(to_error)
}

#[cfg(unix)]
async fn make_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    fs::symlink(target, link).await
}

#[cfg(not(unix))]
async fn make_symlink(_target: &Path, _link: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "symlinks are only recreated on unix",
    ))
}

#[cfg(unix)]
fn mode_of(metadata: &std::fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(metadata.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn mode_of(_metadata: &std::fs::Metadata) -> Option<u32> {
    None
}

#[cfg(unix)]
async fn apply_mode(path: &Path, mode: Option<u32>) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    match mode {
        Some(mode) => fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await,
        None => Ok(()),
    }
}

#[cfg(not(unix))]
async fn apply_mode(_path: &Path, _mode: Option<u32>) -> std::io::Result<()> {
    Ok(())
}

async fn set_mode(path: &Path, mode: Option<u32>) -> WardenResult<()> {
    apply_mode(path, mode)
        .await
        .map_err(|e| WardenError::storage_io(format!("Failed to set permissions: {}", e), path))
}
