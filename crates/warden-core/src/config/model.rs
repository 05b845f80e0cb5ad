//! Configuration model

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::checkpoints::policy::default_mutating_tools;
use crate::checkpoints::{
    AutoCheckpointPolicy, CheckpointConfig, CheckpointStrategy, STATE_DIR_NAME,
    default_excluded_dirs,
};
use crate::process::RegistrySettings;
use crate::sandbox::{LaunchOptions, ProfileCatalog, ProfileDefinition};

/// Complete Warden configuration
///
/// Every field has a default, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub checkpoints: CheckpointSettings,
    pub sandbox: SandboxSettings,
    pub process: ProcessSettings,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointSettings {
    /// Checkpoint directory; relative paths are resolved against the project root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_dir: Option<PathBuf>,
    pub excluded_dirs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_checkpoints: Option<usize>,
    pub auto: AutoCheckpointSettings,
}

impl Default for CheckpointSettings {
    fn default() -> Self {
        Self {
            storage_dir: None,
            excluded_dirs: default_excluded_dirs(),
            max_checkpoints: None,
            auto: AutoCheckpointSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoCheckpointSettings {
    pub strategy: CheckpointStrategy,
    #[serde(with = "humantime_serde")]
    pub min_interval: Duration,
    pub mutating_tools: Vec<String>,
}

impl Default for AutoCheckpointSettings {
    fn default() -> Self {
        Self {
            strategy: CheckpointStrategy::default(),
            min_interval: Duration::from_secs(30),
            mutating_tools: default_mutating_tools(),
        }
    }
}

impl AutoCheckpointSettings {
    pub fn policy(&self) -> AutoCheckpointPolicy {
        AutoCheckpointPolicy::new(
            self.strategy,
            self.min_interval,
            self.mutating_tools.iter().cloned(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSettings {
    /// Launch with degraded isolation instead of refusing
    pub best_effort_isolation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_kill_after: Option<usize>,
    pub violation_capacity: usize,
    /// Named capability sets; a name shared with a preset replaces it
    pub profiles: BTreeMap<String, ProfileDefinition>,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            best_effort_isolation: false,
            auto_kill_after: None,
            violation_capacity: 1000,
            profiles: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessSettings {
    pub output_buffer_bytes: usize,
    #[serde(with = "humantime_serde")]
    pub cancel_grace_period: Duration,
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            output_buffer_bytes: 1024 * 1024,
            cancel_grace_period: Duration::from_secs(5),
        }
    }
}

/// Output format of the log subscriber
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level or `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl WardenConfig {
    /// Checkpoint configuration for one project
    pub fn checkpoint_config(&self, project_root: &Path) -> CheckpointConfig {
        let settings = &self.checkpoints;
        let mut config = CheckpointConfig::new(project_root);
        if let Some(dir) = &settings.storage_dir {
            config = config.with_storage_dir(if dir.is_absolute() {
                dir.clone()
            } else {
                project_root.join(dir)
            });
        }

        config.excluded_dirs = settings.excluded_dirs.clone();
        if !config.excluded_dirs.iter().any(|d| d == STATE_DIR_NAME) {
            config.excluded_dirs.push(STATE_DIR_NAME.to_string());
        }
        config.max_checkpoints = settings.max_checkpoints;
        config.with_auto_policy(settings.auto.policy())
    }

    pub fn registry_settings(&self) -> RegistrySettings {
        RegistrySettings {
            output_buffer_bytes: self.process.output_buffer_bytes,
            cancel_grace_period: self.process.cancel_grace_period,
            auto_kill_after: self.sandbox.auto_kill_after,
            violation_capacity: self.sandbox.violation_capacity,
        }
    }

    /// Launch options applied when a caller does not choose explicitly
    pub fn launch_options(&self) -> LaunchOptions {
        if self.sandbox.best_effort_isolation {
            LaunchOptions::best_effort()
        } else {
            LaunchOptions::strict()
        }
    }

    /// Built-in presets overlaid with configured profiles
    pub fn profile_catalog(&self) -> ProfileCatalog {
        ProfileCatalog::builtin().with_definitions(&self.sandbox.profiles)
    }

    /// Expand `~` in configured paths
    pub(crate) fn expand_paths(&mut self) {
        if let Some(dir) = &self.checkpoints.storage_dir {
            let raw = dir.to_string_lossy();
            let expanded = shellexpand::tilde(raw.as_ref()).into_owned();
            self.checkpoints.storage_dir = Some(PathBuf::from(expanded));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WardenConfig::default();
        assert!(!config.sandbox.best_effort_isolation);
        assert_eq!(config.process.output_buffer_bytes, 1024 * 1024);
        assert_eq!(config.process.cancel_grace_period, Duration::from_secs(5));
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.checkpoints.auto.strategy, CheckpointStrategy::Smart);
        assert_eq!(config.launch_options(), LaunchOptions::strict());
    }

    #[test]
    fn test_durations_are_humantime() {
        let config: WardenConfig = toml::from_str(
            r#"
[checkpoints.auto]
strategy = "per_tool_use"
min_interval = "45s"

[process]
cancel_grace_period = "250ms"
"#,
        )
        .unwrap();
        assert_eq!(config.checkpoints.auto.min_interval, Duration::from_secs(45));
        assert_eq!(
            config.process.cancel_grace_period,
            Duration::from_millis(250)
        );
        assert_eq!(
            config.checkpoints.auto.strategy,
            CheckpointStrategy::PerToolUse
        );
        // Untouched sections keep their defaults
        assert_eq!(config.checkpoints.excluded_dirs, default_excluded_dirs());
    }

    #[test]
    fn test_checkpoint_config_resolution() {
        let mut config = WardenConfig::default();
        config.checkpoints.storage_dir = Some(PathBuf::from("state/cp"));
        config.checkpoints.excluded_dirs = vec!["vendor".to_string()];
        config.checkpoints.max_checkpoints = Some(10);

        let resolved = config.checkpoint_config(Path::new("/work/project"));
        assert_eq!(resolved.storage_dir, PathBuf::from("/work/project/state/cp"));
        assert_eq!(resolved.excluded_dirs, vec!["vendor", STATE_DIR_NAME]);
        assert_eq!(resolved.max_checkpoints, Some(10));

        config.checkpoints.storage_dir = Some(PathBuf::from("/var/warden"));
        let resolved = config.checkpoint_config(Path::new("/work/project"));
        assert_eq!(resolved.storage_dir, PathBuf::from("/var/warden"));
    }

    #[test]
    fn test_registry_settings_follow_config() {
        let mut config = WardenConfig::default();
        config.sandbox.auto_kill_after = Some(3);
        config.process.output_buffer_bytes = 4096;
        let settings = config.registry_settings();
        assert_eq!(settings.auto_kill_after, Some(3));
        assert_eq!(settings.output_buffer_bytes, 4096);
        assert_eq!(settings.violation_capacity, 1000);
    }

    #[test]
    fn test_configured_profiles_join_catalog() {
        let config: WardenConfig = toml::from_str(
            r#"
[sandbox.profiles.reviewer]
description = "read only"
flags = ["file-read"]
"#,
        )
        .unwrap();
        let catalog = config.profile_catalog();
        assert!(catalog.names().contains(&"reviewer"));
        assert!(catalog.names().contains(&"minimal"));
    }

    #[test]
    fn test_tilde_expansion() {
        let mut config = WardenConfig::default();
        config.checkpoints.storage_dir = Some(PathBuf::from("~/warden-state"));
        config.expand_paths();
        let dir = config.checkpoints.storage_dir.unwrap();
        assert!(!dir.to_string_lossy().starts_with('~'));
        assert!(dir.ends_with("warden-state"));
    }
}
