//! Warden CLI application
//!
//! Operator front end over the checkpoint store, the sandbox and the process
//! registry of one project.
//!
//! ```bash
//! warden checkpoint session                  # start a session
//! warden checkpoint create <session> -m "before refactor"
//! warden checkpoint restore <session> <checkpoint>
//! warden sandbox test standard file-write:/etc/passwd
//! warden run --profile standard -- cargo test
//! ```
//!
//! Every command accepts `--json` for machine-readable output on stdout; logs go
//! to stderr.

mod args;
mod commands;
mod console;
mod logging;
mod router;

use clap::Parser;
use warden_core::error::ErrorCode;

pub use args::{CheckpointAction, Cli, Commands, ConfigAction, SandboxCommand};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    let code = match router::route(cli).await {
        Ok(code) => code,
        Err(error) => {
            console::report_error(&error, json);
            tracing::debug!("Exiting with {} ({})", error.exit_code(), error.error_code());
            error.exit_code()
        }
    };
    std::process::exit(code);
}
