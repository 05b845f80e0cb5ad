//! Command-style API over checkpoints, sandboxing and process supervision
//!
//! [`Warden`] binds the three subsystems to one project. Every front-end command maps
//! to one method here, and every result is serde-serializable.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::checkpoints::{
    CheckpointId, CheckpointManager, CheckpointState, FileDiff, GcReport, RestoreOutcome,
    SessionId, TimelineEntry, ToolInvocation,
};
use crate::config::WardenConfig;
use crate::error::{WardenError, WardenResult};
use crate::process::{
    CancelOutcome, Drained, OutputStream, ProcessInfo, ProcessKind, ProcessRegistry, RunId,
    SpawnSpec,
};
use crate::sandbox::{
    Capabilities, CommandSpec, CustomRule, Evaluation, LaunchOptions, PlatformCapabilities,
    ProfileCatalog, ProfileContext, ProfileSummary, SandboxAction, SandboxExecutor,
    SandboxProfile, ViolationEvent, compile,
};

#[cfg(test)]
mod tests;

/// Name given to profiles compiled from an ad-hoc capability set
pub const CUSTOM_PROFILE_NAME: &str = "custom";

/// A request to run a command under a named profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub kind: ProcessKind,
    pub command: CommandSpec,
    pub profile: String,
    #[serde(default)]
    pub task: Option<String>,
    /// Overrides `sandbox.best_effort_isolation` for this launch
    #[serde(default)]
    pub best_effort: Option<bool>,
}

impl RunRequest {
    pub fn new(kind: ProcessKind, command: CommandSpec, profile: impl Into<String>) -> Self {
        Self {
            kind,
            command,
            profile: profile.into(),
            task: None,
            best_effort: None,
        }
    }

    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    pub fn with_best_effort(mut self, best_effort: bool) -> Self {
        self.best_effort = Some(best_effort);
        self
    }
}

/// Warden bound to one project
pub struct Warden {
    project_root: PathBuf,
    context: ProfileContext,
    config: WardenConfig,
    checkpoints: CheckpointState,
    catalog: ProfileCatalog,
    executor: Arc<SandboxExecutor>,
    registry: Arc<ProcessRegistry>,
}

impl Warden {
    /// Open a project with disk-backed checkpoints, probing the host for isolation
    pub async fn open(project_root: impl AsRef<Path>, config: WardenConfig) -> WardenResult<Self> {
        let executor = SandboxExecutor::detect().await;
        Self::with_executor(project_root, config, executor)
    }

    /// Open a project against a known set of platform capabilities
    pub fn with_platform(
        project_root: impl AsRef<Path>,
        config: WardenConfig,
        platform: PlatformCapabilities,
    ) -> WardenResult<Self> {
        Self::with_executor(project_root, config, SandboxExecutor::new(platform))
    }

    fn with_executor(
        project_root: impl AsRef<Path>,
        config: WardenConfig,
        executor: SandboxExecutor,
    ) -> WardenResult<Self> {
        let root = project_root.as_ref();
        let project_root = root.canonicalize().map_err(|e| {
            WardenError::storage_io(format!("Cannot open project: {}", e), root)
        })?;
        if !project_root.is_dir() {
            return Err(WardenError::storage_io(
                "Project root is not a directory",
                &project_root,
            ));
        }

        let context = ProfileContext::for_project(&project_root)?;
        let checkpoints = CheckpointState::open(config.checkpoint_config(&project_root));
        let catalog = config.profile_catalog();
        let executor = Arc::new(executor);
        let registry = Arc::new(ProcessRegistry::new(
            executor.clone(),
            config.registry_settings(),
        ));

        tracing::debug!(
            "Opened {} with isolation backend {}",
            project_root.display(),
            executor.backend_name()
        );
        Ok(Self {
            project_root,
            context,
            config,
            checkpoints,
            catalog,
            executor,
            registry,
        })
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    pub fn checkpoints(&self) -> &CheckpointState {
        &self.checkpoints
    }

    pub fn registry(&self) -> &Arc<ProcessRegistry> {
        &self.registry
    }

    // Checkpoint operations

    pub async fn create_session(&self) -> WardenResult<SessionId> {
        self.checkpoints.create_session().await
    }

    pub async fn sessions(&self) -> WardenResult<Vec<SessionId>> {
        self.checkpoints.sessions().await
    }

    async fn session(&self, session: &SessionId) -> WardenResult<Arc<CheckpointManager>> {
        self.checkpoints.existing_manager(session).await
    }

    pub async fn create_checkpoint(
        &self,
        session: &SessionId,
        label: Option<String>,
    ) -> WardenResult<CheckpointId> {
        self.session(session).await?.create_checkpoint(label).await
    }

    pub async fn restore_checkpoint(
        &self,
        session: &SessionId,
        id: &CheckpointId,
    ) -> WardenResult<RestoreOutcome> {
        self.session(session).await?.restore_checkpoint(id).await
    }

    pub async fn preview_restore(
        &self,
        session: &SessionId,
        id: &CheckpointId,
    ) -> WardenResult<RestoreOutcome> {
        self.session(session).await?.preview_restore(id).await
    }

    pub async fn fork_session(
        &self,
        session: &SessionId,
        from: &CheckpointId,
    ) -> WardenResult<SessionId> {
        self.checkpoints.fork_session(session, from).await
    }

    pub async fn list_checkpoints(&self, session: &SessionId) -> WardenResult<Vec<TimelineEntry>> {
        Ok(self.session(session).await?.list_checkpoints().await)
    }

    pub async fn diff_checkpoints(
        &self,
        session: &SessionId,
        from: &CheckpointId,
        to: &CheckpointId,
    ) -> WardenResult<Vec<FileDiff>> {
        self.session(session)
            .await?
            .diff_checkpoints(from, to)
            .await
    }

    pub async fn prune_branch(&self, session: &SessionId, id: &CheckpointId) -> WardenResult<usize> {
        self.session(session).await?.prune_branch(id).await
    }

    pub async fn collect_garbage(&self) -> WardenResult<GcReport> {
        self.checkpoints.collect_garbage().await
    }

    pub async fn track_message(
        &self,
        session: &SessionId,
        message: impl Into<String>,
    ) -> WardenResult<usize> {
        self.session(session).await?.track_message(message).await
    }

    pub async fn record_tool_use(
        &self,
        session: &SessionId,
        tools: &[ToolInvocation],
    ) -> WardenResult<Option<CheckpointId>> {
        self.session(session).await?.record_tool_use(tools).await
    }

    pub async fn record_user_prompt(&self, session: &SessionId) -> WardenResult<Option<CheckpointId>> {
        self.session(session).await?.record_user_prompt().await
    }

    // Sandbox operations

    pub fn list_profiles(&self) -> Vec<ProfileSummary> {
        self.catalog.list()
    }

    /// A named profile compiled for this project
    pub fn profile(&self, name: &str) -> WardenResult<SandboxProfile> {
        self.catalog.compile(name, &self.context)
    }

    /// Compile an ad-hoc capability set with optional extra rules
    pub fn compile_profile(
        &self,
        capabilities: &Capabilities,
        custom_rules: Vec<CustomRule>,
    ) -> WardenResult<SandboxProfile> {
        let context = self.context.clone().with_custom_rules(custom_rules);
        compile(CUSTOM_PROFILE_NAME, capabilities, &context)
    }

    /// Dry-run one action against a profile
    pub fn test_profile(&self, profile: &SandboxProfile, action: &SandboxAction) -> Evaluation {
        profile.evaluate(action)
    }

    pub fn platform_capabilities(&self) -> &PlatformCapabilities {
        self.executor.platform()
    }

    // Process operations

    /// Compile the requested profile and launch the command under it
    pub fn spawn(&self, request: RunRequest) -> WardenResult<RunId> {
        let profile = self.profile(&request.profile)?;
        let options = match request.best_effort {
            Some(true) => LaunchOptions::best_effort(),
            Some(false) => LaunchOptions::strict(),
            None => self.config.launch_options(),
        };

        let mut spec = SpawnSpec::new(request.kind, request.command, profile).with_options(options);
        if let Some(task) = request.task {
            spec = spec.with_task(task);
        }
        self.registry.spawn(spec)
    }

    pub async fn cancel(&self, run_id: RunId) -> WardenResult<CancelOutcome> {
        self.registry.cancel(run_id).await
    }

    pub fn get_run(&self, run_id: RunId) -> WardenResult<ProcessInfo> {
        self.registry.get(run_id)
    }

    pub fn list_runs(&self) -> Vec<ProcessInfo> {
        self.registry.list()
    }

    pub fn list_running(&self) -> Vec<ProcessInfo> {
        self.registry.list_running()
    }

    pub fn stream_output(&self, run_id: RunId) -> WardenResult<OutputStream> {
        self.registry.stream_output(run_id)
    }

    pub fn drain(&self, run_id: RunId) -> WardenResult<Drained> {
        self.registry.drain(run_id)
    }

    /// Violations recorded for a run, oldest first
    pub fn violations(&self, run_id: RunId) -> Vec<ViolationEvent> {
        self.registry.violations().for_run(run_id.0)
    }
}
