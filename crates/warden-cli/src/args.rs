//! CLI argument definitions using clap

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Checkpoints, sandboxing and process supervision for coding agents")]
#[command(version)]
pub struct Cli {
    /// Project root (defaults to the current directory)
    #[arg(long, short = 'C', global = true, env = "WARDEN_PROJECT")]
    pub project: Option<PathBuf>,

    /// Extra configuration file, applied after the user and project files
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print machine-readable JSON on stdout
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose output and debug logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create, restore, fork and inspect checkpoints
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },

    /// Inspect, compile and dry-run sandbox profiles
    Sandbox {
        #[command(subcommand)]
        action: SandboxCommand,
    },

    /// Run a command under a sandbox profile and stream its output
    Run(RunArgs),

    /// Show the effective configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Clone)]
pub enum CheckpointAction {
    /// Start a new session
    Session,

    /// List known sessions
    Sessions,

    /// Snapshot the project into a new checkpoint
    Create {
        session: String,
        /// Label for the checkpoint
        #[arg(long, short = 'm')]
        label: Option<String>,
    },

    /// Restore the project to a checkpoint
    Restore {
        session: String,
        /// Checkpoint id or unique prefix
        checkpoint: String,
        /// Show what would change without touching files
        #[arg(long)]
        dry_run: bool,
    },

    /// Copy the history up to a checkpoint into a new session
    Fork {
        session: String,
        checkpoint: String,
    },

    /// Show a session's checkpoint tree
    List { session: String },

    /// Show files changed between two checkpoints
    Diff {
        session: String,
        from: String,
        to: String,
        /// Print unified diffs
        #[arg(long, short)]
        patch: bool,
    },

    /// Delete a branch of the timeline that the head does not depend on
    Prune {
        session: String,
        checkpoint: String,
    },

    /// Delete blobs no checkpoint references
    Gc,
}

#[derive(Subcommand, Clone)]
pub enum SandboxCommand {
    /// List named profiles
    Profiles,

    /// Compile a named profile, or an ad-hoc capability set, and print its rules
    Compile {
        /// Named profile (ignored when --cap or --host is given)
        #[arg(default_value = "standard")]
        profile: String,
        /// Capability flag (file-read, file-write, network, process-exec, system-info)
        #[arg(long = "cap")]
        capabilities: Vec<String>,
        /// Network host to allow
        #[arg(long = "host")]
        hosts: Vec<String>,
    },

    /// Dry-run actions such as `file-write:/etc/hosts` against a profile
    Test {
        profile: String,
        #[arg(required = true)]
        actions: Vec<String>,
    },

    /// Report the isolation primitives this host provides
    Capabilities,
}

#[derive(Args, Clone)]
pub struct RunArgs {
    /// Sandbox profile to run under
    #[arg(long, short, default_value = "standard")]
    pub profile: String,

    /// Run even if some isolation primitives are unavailable
    #[arg(long)]
    pub best_effort: bool,

    /// Task description shown in listings
    #[arg(long)]
    pub task: Option<String>,

    /// Record the run as an agent run under this name
    #[arg(long)]
    pub agent: Option<String>,

    /// Treat the arguments as one shell script for `sh -c`
    #[arg(long)]
    pub shell: bool,

    /// Working directory inside the project
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Program and arguments
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

#[derive(Subcommand, Clone)]
pub enum ConfigAction {
    /// Print the merged configuration
    Show,

    /// Print the configuration file locations
    Paths,
}
