//! Checkpoint manager configuration

use std::path::PathBuf;

use super::policy::AutoCheckpointPolicy;
use super::scanner::ProjectScanner;

/// Directory name for Warden state inside a project
pub const STATE_DIR_NAME: &str = ".warden";

/// Directory names never tracked
pub fn default_excluded_dirs() -> Vec<String> {
    [
        ".git",
        "node_modules",
        "target",
        "__pycache__",
        ".venv",
        "venv",
        "dist",
        "build",
        ".idea",
        ".vscode",
        STATE_DIR_NAME,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Resolved configuration for the checkpoint subsystem of one project
#[derive(Debug, Clone)]
pub struct CheckpointConfig {
    /// Root of the tracked project
    pub project_root: PathBuf,
    /// Checkpoint directory holding `blobs/` and `sessions/`
    pub storage_dir: PathBuf,
    pub excluded_dirs: Vec<String>,
    /// Oldest off-head leaves are pruned beyond this many checkpoints per session
    pub max_checkpoints: Option<usize>,
    pub auto: AutoCheckpointPolicy,
}

impl CheckpointConfig {
    /// Defaults for a project: state under `<project>/.warden/checkpoints`
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        Self {
            storage_dir: project_root.join(STATE_DIR_NAME).join("checkpoints"),
            project_root,
            excluded_dirs: default_excluded_dirs(),
            max_checkpoints: None,
            auto: AutoCheckpointPolicy::default(),
        }
    }

    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = dir.into();
        self
    }

    pub fn with_max_checkpoints(mut self, max: usize) -> Self {
        self.max_checkpoints = Some(max);
        self
    }

    pub fn with_auto_policy(mut self, policy: AutoCheckpointPolicy) -> Self {
        self.auto = policy;
        self
    }

    pub fn blobs_dir(&self) -> PathBuf {
        self.storage_dir.join("blobs")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.storage_dir.join("sessions")
    }

    pub fn scanner(&self) -> ProjectScanner {
        ProjectScanner::new(&self.project_root, self.excluded_dirs.iter().cloned())
            .with_excluded_path(&self.storage_dir)
    }
}
