//! Command routing logic for CLI

use std::path::{Path, PathBuf};

use warden_core::config::{ConfigLoader, WardenConfig, project_config_path, user_config_path};
use warden_core::error::{WardenError, WardenResult};
use warden_core::Warden;

use crate::args::{Cli, Commands};
use crate::commands;
use crate::console::CliConsole;
use crate::logging;

/// Route CLI commands to their handlers; returns the process exit code
pub async fn route(cli: Cli) -> WardenResult<i32> {
    let project = resolve_project(cli.project.as_deref())?;
    let config = load_config(&project, cli.config.as_deref())?;
    logging::init(&config.logging, cli.verbose);
    let console = CliConsole::new(cli.verbose, cli.json);

    if let Commands::Config { action } = &cli.command {
        commands::config::run(action, &config, &project, &console)?;
        return Ok(0);
    }

    let warden = Warden::open(&project, config).await?;
    match cli.command {
        Commands::Checkpoint { action } => {
            commands::checkpoint::run(&warden, action, &console).await?;
            Ok(0)
        }
        Commands::Sandbox { action } => {
            commands::sandbox::run(&warden, action, &console)?;
            Ok(0)
        }
        Commands::Run(args) => commands::run::execute(&warden, args, &console).await,
        Commands::Config { .. } => Ok(0),
    }
}

fn resolve_project(project: Option<&Path>) -> WardenResult<PathBuf> {
    match project {
        Some(path) => Ok(path.to_path_buf()),
        None => std::env::current_dir().map_err(|e| {
            WardenError::config(format!("Cannot determine the current directory: {}", e))
        }),
    }
}

/// Defaults, user file, project file, `--config` file, then environment
fn load_config(project: &Path, extra: Option<&Path>) -> WardenResult<WardenConfig> {
    let mut loader = ConfigLoader::new();
    if let Some(user) = user_config_path() {
        loader = loader.with_file(user);
    }
    loader = loader.with_file(project_config_path(project));

    if let Some(extra) = extra {
        if !extra.exists() {
            return Err(WardenError::config_with_context(
                "Configuration file not found",
                extra.display().to_string(),
            ));
        }
        loader = loader.with_file(extra);
    }
    loader.with_env().load()
}
