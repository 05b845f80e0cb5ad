//! Configuration management for Warden
//!
//! Built-in defaults are overlaid by the user file, the project file and finally
//! `WARDEN_*` environment variables.

pub mod loader;
mod model;
pub mod validation;

pub use loader::{
    ConfigLoader, ConfigSource, ENV_BEST_EFFORT, ENV_LOG_LEVEL, ENV_STORAGE_DIR, load_config,
    project_config_path, user_config_path,
};
pub use model::{
    AutoCheckpointSettings, CheckpointSettings, LogFormat, LoggingConfig, ProcessSettings,
    SandboxSettings, WardenConfig,
};
