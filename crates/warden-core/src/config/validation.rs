//! Configuration validation

use crate::error::{WardenError, WardenResult};

use super::model::WardenConfig;

const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// Reject settings that would make a subsystem unusable
pub fn validate(config: &WardenConfig) -> WardenResult<()> {
    if config.process.output_buffer_bytes == 0 {
        return Err(WardenError::config_with_context(
            "Output buffer must hold at least one byte",
            "process.output_buffer_bytes",
        ));
    }
    if config.sandbox.auto_kill_after == Some(0) {
        return Err(WardenError::config_with_context(
            "Auto-kill threshold must be at least 1; omit it to disable auto-kill",
            "sandbox.auto_kill_after",
        ));
    }
    if config.sandbox.violation_capacity == 0 {
        return Err(WardenError::config_with_context(
            "Violation store capacity must be at least 1",
            "sandbox.violation_capacity",
        ));
    }
    if config.checkpoints.max_checkpoints == Some(0) {
        return Err(WardenError::config_with_context(
            "max_checkpoints must be at least 1",
            "checkpoints.max_checkpoints",
        ));
    }

    for dir in &config.checkpoints.excluded_dirs {
        if dir.is_empty() || dir.contains('/') {
            return Err(WardenError::config_with_context(
                format!("Excluded directory must be a plain name: '{}'", dir),
                "checkpoints.excluded_dirs",
            ));
        }
    }

    for name in config.sandbox.profiles.keys() {
        if name.trim().is_empty() {
            return Err(WardenError::config_with_context(
                "Profile names must not be empty",
                "sandbox.profiles",
            ));
        }
    }

    validate_level(&config.logging.level)
}

fn validate_level(level: &str) -> WardenResult<()> {
    // Full filter directives are checked by the subscriber itself
    if level.contains('=') || level.contains(',') {
        return Ok(());
    }
    if LEVELS.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        Err(WardenError::config_with_context(
            format!("Unknown log level '{}'", level),
            "logging.level",
        ))
    }
}
