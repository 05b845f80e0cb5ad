//! Configuration commands

use colored::*;
use std::path::Path;
use warden_core::config::{WardenConfig, project_config_path, user_config_path};
use warden_core::error::WardenResult;

use crate::args::ConfigAction;
use crate::console::CliConsole;

pub fn run(
    action: &ConfigAction,
    config: &WardenConfig,
    project: &Path,
    console: &CliConsole,
) -> WardenResult<()> {
    match action {
        ConfigAction::Show => show(config, console),
        ConfigAction::Paths => paths(project, console),
    }
}

fn show(config: &WardenConfig, console: &CliConsole) -> WardenResult<()> {
    if console.json() {
        return console.print_json(config);
    }

    console.print_header("Configuration");
    let storage = config
        .checkpoints
        .storage_dir
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<project>/.warden/checkpoints".to_string());
    console.line(&format!("checkpoint storage:  {}", storage));
    console.line(&format!(
        "auto checkpoints:    {:?} (every {:?} at most)",
        config.checkpoints.auto.strategy, config.checkpoints.auto.min_interval
    ));
    console.line(&format!(
        "best-effort launch:  {}",
        config.sandbox.best_effort_isolation
    ));
    console.line(&format!(
        "auto-kill after:     {}",
        config
            .sandbox
            .auto_kill_after
            .map(|n| format!("{} violations", n))
            .unwrap_or_else(|| "never".to_string())
    ));
    console.line(&format!(
        "output buffer:       {} bytes",
        config.process.output_buffer_bytes
    ));
    console.line(&format!(
        "cancel grace period: {:?}",
        config.process.cancel_grace_period
    ));
    if !config.sandbox.profiles.is_empty() {
        let names: Vec<&str> = config.sandbox.profiles.keys().map(String::as_str).collect();
        console.line(&format!("configured profiles: {}", names.join(", ")));
    }
    Ok(())
}

fn paths(project: &Path, console: &CliConsole) -> WardenResult<()> {
    let user = user_config_path();
    let project = project_config_path(project);

    if console.json() {
        return console.print_json(&serde_json::json!({
            "user": user,
            "project": project,
        }));
    }

    let describe = |path: &Path| {
        if path.exists() {
            format!("{}", path.display())
        } else {
            format!("{} {}", path.display(), "(missing)".dimmed())
        }
    };
    match &user {
        Some(path) => console.line(&format!("user:    {}", describe(path))),
        None => console.line("user:    (no config directory on this system)"),
    }
    console.line(&format!("project: {}", describe(&project)));
    Ok(())
}
