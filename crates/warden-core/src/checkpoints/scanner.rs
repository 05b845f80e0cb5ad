//! Tracked file discovery

use crate::error::{WardenError, WardenResult};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Metadata of a tracked file found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedFile {
    pub abs_path: PathBuf,
    pub size: u64,
    pub modified_ms: Option<i64>,
    pub mode: Option<u32>,
}

/// Walks a project root and lists every tracked file
///
/// Regular files only; symlinks are skipped and excluded directory names are
/// pruned wherever they occur in the tree.
#[derive(Debug, Clone)]
pub struct ProjectScanner {
    root: PathBuf,
    excluded_dirs: HashSet<String>,
    excluded_paths: Vec<PathBuf>,
}

impl ProjectScanner {
    pub fn new(root: impl Into<PathBuf>, excluded_dirs: impl IntoIterator<Item = String>) -> Self {
        Self {
            root: root.into(),
            excluded_dirs: excluded_dirs.into_iter().collect(),
            excluded_paths: Vec::new(),
        }
    }

    /// Exclude an absolute path (e.g. a checkpoint directory that lives inside the project)
    pub fn with_excluded_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.excluded_paths.push(path.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scan the project, keyed by `/`-separated relative path
    pub async fn scan(&self) -> WardenResult<BTreeMap<String, TrackedFile>> {
        let mut files = BTreeMap::new();
        self.scan_recursive(&self.root, &mut files).await?;
        Ok(files)
    }

    /// Resolve a relative key back to an absolute path
    pub fn resolve(&self, relative: &str) -> PathBuf {
        relative
            .split('/')
            .fold(self.root.clone(), |path, part| path.join(part))
    }

    async fn scan_recursive(
        &self,
        dir: &Path,
        files: &mut BTreeMap<String, TrackedFile>,
    ) -> WardenResult<()> {
        let mut entries = fs::read_dir(dir).await.map_err(|e| {
            WardenError::storage_io(format!("Failed to read directory: {}", e), dir)
        })?;

        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            WardenError::storage_io(format!("Failed to read directory entry: {}", e), dir)
        })? {
            let path = entry.path();
            let file_type = entry.file_type().await.map_err(|e| {
                WardenError::storage_io(format!("Failed to read file type: {}", e), &path)
            })?;

            if file_type.is_dir() {
                let name = entry.file_name();
                if self.excluded_dirs.contains(name.to_string_lossy().as_ref())
                    || self.excluded_paths.iter().any(|p| p == &path)
                {
                    tracing::trace!("Skipping excluded directory {:?}", path);
                    continue;
                }
                Box::pin(self.scan_recursive(&path, files)).await?;
            } else if file_type.is_file() {
                let Some(key) = self.relative_key(&path) else {
                    continue;
                };
                let metadata = entry.metadata().await.map_err(|e| {
                    WardenError::storage_io(format!("Failed to read metadata: {}", e), &path)
                })?;
                files.insert(
                    key,
                    TrackedFile {
                        abs_path: path,
                        size: metadata.len(),
                        modified_ms: modified_ms(&metadata),
                        mode: file_mode(&metadata),
                    },
                );
            }
        }

        Ok(())
    }

    fn relative_key(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Option<Vec<&str>> = relative.iter().map(|p| p.to_str()).collect();
        match parts {
            Some(parts) if !parts.is_empty() => Some(parts.join("/")),
            _ => {
                tracing::warn!("Skipping non UTF-8 path {:?}", path);
                None
            }
        }
    }
}

fn modified_ms(metadata: &std::fs::Metadata) -> Option<i64> {
    let modified = metadata.modified().ok()?;
    let duration = modified.duration_since(std::time::UNIX_EPOCH).ok()?;
    i64::try_from(duration.as_millis()).ok()
}

#[cfg(unix)]
fn file_mode(metadata: &std::fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(metadata.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn file_mode(_metadata: &std::fs::Metadata) -> Option<u32> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn scanner(root: &Path) -> ProjectScanner {
        ProjectScanner::new(root, [".git".to_string(), "node_modules".to_string()])
    }

    #[tokio::test]
    async fn test_scan_nested_files() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("src/bin")).unwrap();
        std::fs::write(temp_dir.path().join("a.txt"), "1").unwrap();
        std::fs::write(temp_dir.path().join("src/bin/main.rs"), "fn main() {}").unwrap();

        let files = scanner(temp_dir.path()).scan().await.unwrap();

        let keys: Vec<_> = files.keys().cloned().collect();
        assert_eq!(keys, vec!["a.txt", "src/bin/main.rs"]);
        assert_eq!(files["src/bin/main.rs"].size, 12);
    }

    #[tokio::test]
    async fn test_scan_skips_excluded_dirs_anywhere() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(temp_dir.path().join(".git")).unwrap();
        std::fs::create_dir_all(temp_dir.path().join("web/node_modules/pkg")).unwrap();
        std::fs::write(temp_dir.path().join(".git/HEAD"), "ref").unwrap();
        std::fs::write(temp_dir.path().join("web/node_modules/pkg/index.js"), "").unwrap();
        std::fs::write(temp_dir.path().join("web/app.js"), "").unwrap();

        let files = scanner(temp_dir.path()).scan().await.unwrap();

        assert_eq!(files.keys().collect::<Vec<_>>(), vec!["web/app.js"]);
    }

    #[tokio::test]
    async fn test_scan_skips_excluded_path() {
        let temp_dir = TempDir::new().unwrap();
        let store_dir = temp_dir.path().join("state");
        std::fs::create_dir_all(&store_dir).unwrap();
        std::fs::write(store_dir.join("blob"), "x").unwrap();
        std::fs::write(temp_dir.path().join("kept.txt"), "x").unwrap();

        let files = scanner(temp_dir.path())
            .with_excluded_path(&store_dir)
            .scan()
            .await
            .unwrap();

        assert_eq!(files.len(), 1);
        assert!(files.contains_key("kept.txt"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_scan_skips_symlinks() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("real.txt"), "x").unwrap();
        std::os::unix::fs::symlink(
            temp_dir.path().join("real.txt"),
            temp_dir.path().join("link.txt"),
        )
        .unwrap();

        let files = scanner(temp_dir.path()).scan().await.unwrap();

        assert_eq!(files.keys().collect::<Vec<_>>(), vec!["real.txt"]);
    }

    #[test]
    fn test_resolve_relative_key() {
        let scanner = scanner(Path::new("/project"));
        assert_eq!(
            scanner.resolve("src/lib.rs"),
            PathBuf::from("/project/src/lib.rs")
        );
    }
}
