//! Sandbox executor
//!
//! Launches a command with its compiled profile enforced by the launcher itself.
//! If the host cannot enforce every primitive the profile needs, the launch fails
//! with `IsolationUnavailable` unless the caller opted into best-effort isolation.

mod types;


pub use types::{CommandSpec, ENV_ALLOW_LIST, LaunchOptions, LaunchedProcess};

use std::collections::BTreeSet;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{WardenError, WardenResult};

use super::backends::{IsolationBackend, LaunchPlan, NetworkAccess, backend_for};
use super::compiler::{SandboxProfile, ensure_consistent};
use super::platform::{PlatformCapabilities, Primitive, probe_capabilities};
use super::rules::{OperationClass, RuleTarget, normalize_path};

/// A launcher command ready to spawn
#[derive(Debug)]
pub struct PreparedLaunch {
    pub command: Command,
    pub backend: &'static str,
    pub network: NetworkAccess,
    pub degraded: Vec<Primitive>,
}

/// Launches processes under compiled profiles
pub struct SandboxExecutor {
    platform: PlatformCapabilities,
    backend: Box<dyn IsolationBackend>,
}

impl std::fmt::Debug for SandboxExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxExecutor")
            .field("platform", &self.platform)
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl SandboxExecutor {
    /// Executor for this host, probing it on first use
    pub async fn detect() -> Self {
        Self::new(probe_capabilities().await.clone())
    }

    pub fn new(platform: PlatformCapabilities) -> Self {
        let backend = backend_for(&platform.backend);
        Self { platform, backend }
    }

    pub fn platform(&self) -> &PlatformCapabilities {
        &self.platform
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Primitives needed to enforce a profile as written
    pub fn required_primitives(profile: &SandboxProfile) -> BTreeSet<Primitive> {
        let mut required: BTreeSet<Primitive> = [Primitive::Filesystem, Primitive::Process].into();
        match network_scope(profile) {
            NetworkScope::None => {
                required.insert(Primitive::Network);
            }
            NetworkScope::Hosts => {
                required.insert(Primitive::NetworkHostFilter);
            }
            NetworkScope::Any => {}
        }
        required
    }

    /// Validate and build the launcher without spawning it
    pub fn prepare(
        &self,
        spec: &CommandSpec,
        profile: &SandboxProfile,
        options: LaunchOptions,
    ) -> WardenResult<PreparedLaunch> {
        ensure_consistent(profile.rules())?;

        if spec.program.trim().is_empty() {
            return Err(WardenError::spawn_failure("Empty program name", ""));
        }
        let cwd = normalize_path(&spec.cwd);
        if !cwd.is_absolute() || !cwd.starts_with(profile.project_root()) {
            return Err(WardenError::conflict_with_details(
                format!(
                    "Working directory is outside the project root of profile {}",
                    profile.name()
                ),
                vec![
                    format!("cwd: {}", spec.cwd.display()),
                    format!("project root: {}", profile.project_root().display()),
                ],
            ));
        }

        let required = Self::required_primitives(profile);
        let missing = self.platform.missing(&required);
        if !missing.is_empty() {
            let names: Vec<String> = missing.iter().map(|p| p.to_string()).collect();
            if !options.best_effort {
                return Err(WardenError::isolation_unavailable(
                    format!(
                        "Cannot enforce profile {} with backend {}: missing {}",
                        profile.name(),
                        self.backend.name(),
                        names.join(", ")
                    ),
                    names,
                ));
            }
            tracing::warn!(
                "Best-effort launch of {} under profile {}: not enforcing {}",
                spec.display(),
                profile.name(),
                names.join(", ")
            );
        }

        let network = match network_scope(profile) {
            NetworkScope::None => NetworkAccess::Denied,
            // Host filtering is never enforceable, so it only gets here under best effort
            NetworkScope::Hosts | NetworkScope::Any => NetworkAccess::Unrestricted,
        };

        let mut spec = spec.clone();
        spec.cwd = cwd;
        let plan = LaunchPlan {
            spec: &spec,
            profile,
            network,
            env: spec.child_environment(),
        };
        let mut command = self.backend.command(&plan)?;
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        Ok(PreparedLaunch {
            command,
            backend: self.backend.name(),
            network,
            degraded: missing,
        })
    }

    /// Spawn a command with the profile enforced before its first instruction
    pub fn launch(
        &self,
        spec: &CommandSpec,
        profile: &SandboxProfile,
        options: LaunchOptions,
    ) -> WardenResult<LaunchedProcess> {
        let PreparedLaunch {
            mut command,
            backend,
            degraded,
            ..
        } = self.prepare(spec, profile, options)?;

        let child = command.spawn().map_err(|e| {
            WardenError::spawn_failure(
                format!("Failed to launch under {}: {}", backend, e),
                spec.program.clone(),
            )
        })?;

        tracing::info!(
            "Launched {} under profile {} ({}), pid {:?}",
            spec.display(),
            profile.name(),
            backend,
            child.id()
        );
        Ok(LaunchedProcess {
            child,
            backend,
            degraded,
        })
    }
}

enum NetworkScope {
    None,
    Hosts,
    Any,
}

fn network_scope(profile: &SandboxProfile) -> NetworkScope {
    let allows: Vec<_> = profile
        .rules_for(OperationClass::NetworkOutbound, true)
        .collect();
    let host_denies = profile
        .rules_for(OperationClass::NetworkOutbound, false)
        .any(|r| matches!(r.target, RuleTarget::Host(_)));

    if allows.is_empty() {
        NetworkScope::None
    } else if allows.iter().any(|r| r.target == RuleTarget::Any) && !host_denies {
        NetworkScope::Any
    } else {
        NetworkScope::Hosts
    }
}
