//! No isolation; only reachable through an explicit best-effort launch

use tokio::process::Command;

use crate::error::WardenResult;

use super::{IsolationBackend, LaunchPlan};

/// Runs the command directly with the sanitized environment
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconfined;

impl IsolationBackend for Unconfined {
    fn name(&self) -> &'static str {
        "none"
    }

    fn is_confining(&self) -> bool {
        false
    }

    fn command(&self, plan: &LaunchPlan<'_>) -> WardenResult<Command> {
        let mut cmd = Command::new(&plan.spec.program);
        cmd.args(&plan.spec.args)
            .current_dir(&plan.spec.cwd)
            .env_clear()
            .envs(plan.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        Ok(cmd)
    }
}
