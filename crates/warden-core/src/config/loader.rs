//! Layered configuration loading

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::checkpoints::STATE_DIR_NAME;
use crate::error::{WardenError, WardenResult};

use super::model::WardenConfig;
use super::validation;

pub const ENV_LOG_LEVEL: &str = "WARDEN_LOG_LEVEL";
pub const ENV_BEST_EFFORT: &str = "WARDEN_BEST_EFFORT";
pub const ENV_STORAGE_DIR: &str = "WARDEN_STORAGE_DIR";

/// Source of configuration data
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// A TOML or JSON file; skipped when missing
    File(PathBuf),
    /// `WARDEN_*` variables of the process environment
    Environment,
    /// Variables with the same names as the environment overrides
    Variables(HashMap<String, String>),
}

/// Merges configuration layers over the built-in defaults
///
/// Tables merge key by key; any other value set by a later layer replaces the
/// earlier one wholesale.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    sources: Vec<ConfigSource>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// User file, then project file, then environment
    pub fn standard(project_root: &Path) -> Self {
        let mut loader = Self::new();
        if let Some(user) = user_config_path() {
            loader = loader.with_file(user);
        }
        loader
            .with_file(project_config_path(project_root))
            .with_env()
    }

    pub fn add_source(mut self, source: ConfigSource) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_file<P: AsRef<Path>>(self, path: P) -> Self {
        self.add_source(ConfigSource::File(path.as_ref().to_path_buf()))
    }

    pub fn with_env(self) -> Self {
        self.add_source(ConfigSource::Environment)
    }

    pub fn with_variables(self, vars: HashMap<String, String>) -> Self {
        self.add_source(ConfigSource::Variables(vars))
    }

    pub fn load(self) -> WardenResult<WardenConfig> {
        let mut merged = toml::Value::Table(toml::map::Map::new());
        for source in &self.sources {
            if let Some(layer) = load_layer(source)? {
                tracing::debug!("Merging configuration from {:?}", source);
                merge_values(&mut merged, layer);
            }
        }

        let mut config: WardenConfig = merged.try_into().map_err(|e: toml::de::Error| {
            WardenError::config_with_context(
                format!("Invalid configuration: {}", e),
                "Merging configuration layers",
            )
        })?;
        config.expand_paths();
        validation::validate(&config)?;
        Ok(config)
    }
}

/// `<config dir>/warden/config.toml`
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("warden").join("config.toml"))
}

/// `<project>/.warden/config.toml`
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(STATE_DIR_NAME).join("config.toml")
}

/// Load the standard layers for a project
pub fn load_config(project_root: &Path) -> WardenResult<WardenConfig> {
    ConfigLoader::standard(project_root).load()
}

fn load_layer(source: &ConfigSource) -> WardenResult<Option<toml::Value>> {
    match source {
        ConfigSource::File(path) => load_file(path),
        ConfigSource::Environment => {
            env_overrides(|key| std::env::var(key).ok()).map(Some)
        }
        ConfigSource::Variables(vars) => env_overrides(|key| vars.get(key).cloned()).map(Some),
    }
}

/// Parse a file by extension: `.json` as JSON, anything else as TOML
pub fn load_file(path: &Path) -> WardenResult<Option<toml::Value>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path).map_err(|e| {
        WardenError::config_with_context(
            format!("Failed to read config file: {}", e),
            format!("Reading configuration from '{}'", path.display()),
        )
    })?;

    let value = match path.extension().and_then(|s| s.to_str()) {
        Some("json") => serde_json::from_str::<toml::Value>(&content).map_err(|e| {
            WardenError::config_with_context(
                format!("Failed to parse JSON config: {}", e),
                format!("Deserializing JSON configuration from '{}'", path.display()),
            )
        })?,
        _ => toml::from_str::<toml::Value>(&content).map_err(|e| {
            WardenError::config_with_context(
                format!("Failed to parse TOML config: {}", e),
                format!("Deserializing TOML configuration from '{}'", path.display()),
            )
        })?,
    };
    Ok(Some(value))
}

fn env_overrides(lookup: impl Fn(&str) -> Option<String>) -> WardenResult<toml::Value> {
    let mut layer = toml::Value::Table(toml::map::Map::new());

    if let Some(level) = lookup(ENV_LOG_LEVEL).filter(|v| !v.is_empty()) {
        set_path(&mut layer, &["logging", "level"], toml::Value::String(level));
    }
    if let Some(raw) = lookup(ENV_BEST_EFFORT) {
        let enabled = parse_bool(&raw).ok_or_else(|| {
            WardenError::config_with_context(
                format!("Invalid {} value: {}", ENV_BEST_EFFORT, raw),
                "Expected true/false, yes/no or 1/0",
            )
        })?;
        set_path(
            &mut layer,
            &["sandbox", "best_effort_isolation"],
            toml::Value::Boolean(enabled),
        );
    }
    if let Some(dir) = lookup(ENV_STORAGE_DIR).filter(|v| !v.is_empty()) {
        set_path(
            &mut layer,
            &["checkpoints", "storage_dir"],
            toml::Value::String(dir),
        );
    }
    Ok(layer)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn set_path(root: &mut toml::Value, path: &[&str], value: toml::Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut current = root;
    for key in parents {
        let toml::Value::Table(table) = current else {
            return;
        };
        current = table
            .entry(key.to_string())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }
    if let toml::Value::Table(table) = current {
        table.insert(last.to_string(), value);
    }
}

fn merge_values(base: &mut toml::Value, layer: toml::Value) {
    match (base, layer) {
        (toml::Value::Table(base), toml::Value::Table(layer)) => {
            for (key, value) in layer {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, layer) => *base = layer,
    }
}
