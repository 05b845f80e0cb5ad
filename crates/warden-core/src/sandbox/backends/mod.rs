//! Isolation backends
//!
//! A backend turns a compiled profile into a launcher command that confines the
//! target before its first instruction runs. The target never applies its own
//! confinement.

mod bubblewrap;
mod seatbelt;
mod unconfined;

pub use bubblewrap::Bubblewrap;
pub use seatbelt::Seatbelt;
pub use unconfined::Unconfined;

use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::error::WardenResult;

use super::compiler::SandboxProfile;
use super::executor::CommandSpec;
use super::platform::BackendKind;

/// Outbound network policy a backend enforces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkAccess {
    Denied,
    Unrestricted,
}

/// Everything a backend needs to build the launcher
#[derive(Debug)]
pub struct LaunchPlan<'a> {
    pub spec: &'a CommandSpec,
    pub profile: &'a SandboxProfile,
    pub network: NetworkAccess,
    pub env: Vec<(String, String)>,
}

/// Wraps a command so the OS enforces a profile from the first instruction
pub trait IsolationBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this backend confines anything at all
    fn is_confining(&self) -> bool {
        true
    }

    /// The launcher command; spawning it starts the target already confined
    fn command(&self, plan: &LaunchPlan<'_>) -> WardenResult<Command>;
}

/// Backend for a probed platform
pub fn backend_for(kind: &BackendKind) -> Box<dyn IsolationBackend> {
    match kind {
        BackendKind::Bubblewrap { proc_supported } => Box::new(Bubblewrap::new(*proc_supported)),
        BackendKind::Seatbelt => Box::new(Seatbelt::new()),
        BackendKind::None => Box::new(Unconfined),
    }
}

/// Canonicalize a path, falling back to the original if it cannot be resolved
pub(crate) fn canonicalize_or_self(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
