//! Linux backend: bubblewrap mount, network and pid namespaces

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::error::WardenResult;
use crate::sandbox::rules::{OperationClass, SandboxRule};

use super::{IsolationBackend, LaunchPlan, NetworkAccess};

/// Confinement through `bwrap`
///
/// The sandbox root starts empty; only paths the profile allows are mounted in.
/// Later mounts override earlier ones, so denies are mounted after allows.
#[derive(Debug, Clone)]
pub struct Bubblewrap {
    proc_supported: bool,
}

impl Bubblewrap {
    pub fn new(proc_supported: bool) -> Self {
        Self { proc_supported }
    }

    /// The `bwrap` argument list for a plan
    pub fn arguments(&self, plan: &LaunchPlan<'_>) -> Vec<OsString> {
        let profile = plan.profile;
        let mut args = Args::default();

        // Private device, proc and tmp come first so binds below may land inside them
        args.push(["--dev", "/dev"]);
        if self.proc_supported {
            args.push(["--proc", "/proc"]);
        }
        args.push(["--tmpfs", "/tmp"]);

        let mut mounted: HashSet<PathBuf> = HashSet::new();
        for rule in profile.rules() {
            if !rule.is_allow()
                || !matches!(
                    rule.operation,
                    OperationClass::FileRead | OperationClass::ProcessExec
                )
            {
                continue;
            }
            if let Some(path) = host_path(rule) {
                if path.exists() && mounted.insert(path.to_path_buf()) {
                    args.bind("--ro-bind", path);
                }
            }
        }

        for rule in profile.rules_for(OperationClass::FileWrite, true) {
            if let Some(path) = host_path(rule) {
                if path.exists() {
                    args.bind("--bind", path);
                }
            }
        }

        for rule in profile.rules_for(OperationClass::FileWrite, false) {
            let Some(path) = host_path(rule) else { continue };
            if path.exists() {
                args.bind("--ro-bind", path);
            } else if is_writable(plan, path) {
                // Nothing to protect yet; an empty read-only mount keeps it from being created
                args.push(["--tmpfs".into(), path.as_os_str().to_owned()]);
                args.push(["--remount-ro".into(), path.as_os_str().to_owned()]);
            }
        }

        // A denied exec target is hidden entirely
        for rule in profile.rules() {
            if rule.is_allow()
                || !matches!(
                    rule.operation,
                    OperationClass::FileRead | OperationClass::ProcessExec
                )
            {
                continue;
            }
            let Some(path) = host_path(rule) else { continue };
            if path.is_dir() {
                args.push(["--tmpfs".into(), path.as_os_str().to_owned()]);
                args.push(["--remount-ro".into(), path.as_os_str().to_owned()]);
            } else if path.exists() {
                args.push(["--ro-bind".into(), OsString::from("/dev/null"), path.as_os_str().to_owned()]);
            }
        }

        if plan.network == NetworkAccess::Denied {
            args.push(["--unshare-net"]);
        }
        args.push(["--unshare-pid", "--die-with-parent", "--new-session"]);

        args.push(["--clearenv"]);
        for (key, value) in &plan.env {
            args.push([
                OsString::from("--setenv"),
                OsString::from(key),
                OsString::from(value),
            ]);
        }
        args.push([OsString::from("--chdir"), plan.spec.cwd.as_os_str().to_owned()]);

        args.push(["--", plan.spec.program.as_str()]);
        args.extend(plan.spec.args.iter().map(OsString::from));
        args.into_inner()
    }
}

impl IsolationBackend for Bubblewrap {
    fn name(&self) -> &'static str {
        "bubblewrap"
    }

    fn command(&self, plan: &LaunchPlan<'_>) -> WardenResult<Command> {
        let mut cmd = Command::new("bwrap");
        cmd.args(self.arguments(plan));
        Ok(cmd)
    }
}

/// Path targets outside `/dev`, which `--dev` already provides
fn host_path(rule: &SandboxRule) -> Option<&Path> {
    rule.target.path().filter(|p| !p.starts_with("/dev"))
}

fn is_writable(plan: &LaunchPlan<'_>, path: &Path) -> bool {
    plan.profile
        .rules_for(OperationClass::FileWrite, true)
        .any(|rule| rule.target.path().is_some_and(|root| path.starts_with(root)))
}

#[derive(Default)]
struct Args(Vec<OsString>);

impl Args {
    fn push<I, S>(&mut self, items: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.0.extend(items.into_iter().map(Into::into));
    }

    fn bind(&mut self, flag: &str, path: &Path) {
        self.push([
            OsString::from(flag),
            path.as_os_str().to_owned(),
            path.as_os_str().to_owned(),
        ]);
    }

    fn extend(&mut self, items: impl Iterator<Item = OsString>) {
        self.0.extend(items);
    }

    fn into_inner(self) -> Vec<OsString> {
        self.0
    }
}
