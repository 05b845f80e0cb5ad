//! Warden Core Library
//!
//! Safety and state for an AI coding agent: content-addressable checkpoints of the
//! project, sandbox profiles enforced before a command's first instruction, and a
//! registry supervising every spawned process and its output.

pub mod api;
pub mod checkpoints;
pub mod config;
pub mod error;
pub mod process;
pub mod sandbox;

// Re-export commonly used types
pub use api::{RunRequest, Warden};
pub use checkpoints::{CheckpointId, CheckpointState, SessionId};
pub use config::{ConfigLoader, WardenConfig, load_config};
pub use error::{ErrorCode, WardenError, WardenResult};
pub use process::{OutputEvent, ProcessInfo, ProcessKind, ProcessRegistry, RunId};
pub use sandbox::{Capabilities, Capability, CommandSpec, LaunchOptions, SandboxProfile};
