//! macOS backend: Seatbelt via `sandbox-exec`

use std::path::Path;
use tokio::process::Command;

use crate::error::WardenResult;
use crate::sandbox::platform::SANDBOX_EXEC_PATH;
use crate::sandbox::rules::{OperationClass, RuleTarget, SandboxRule};

use super::{IsolationBackend, LaunchPlan, NetworkAccess, canonicalize_or_self};

const PREAMBLE: &str = r#"(version 1)
(deny default)

(allow process-fork)
(allow signal (target same-sandbox))
(allow file-read* (literal "/"))
(allow mach-lookup (global-name "com.apple.system.opendirectoryd.libinfo"))
(allow ipc-posix-sem)
(allow pseudo-tty)
"#;

/// Confinement through an inline SBPL profile
#[derive(Debug, Clone, Default)]
pub struct Seatbelt;

impl Seatbelt {
    pub fn new() -> Self {
        Self
    }

    /// Render a plan as Sandbox Profile Language
    ///
    /// Seatbelt applies the last matching rule, so every deny follows the allows.
    pub fn render(&self, plan: &LaunchPlan<'_>) -> String {
        let mut profile = String::from(PREAMBLE);

        profile.push_str("\n; allowed by profile\n");
        for rule in plan.profile.rules().iter().filter(|r| r.is_allow()) {
            for line in sbpl_lines(rule, "allow") {
                profile.push_str(&line);
                profile.push('\n');
            }
        }

        if plan.network == NetworkAccess::Unrestricted {
            profile.push_str("(allow network-outbound)\n(allow system-socket)\n");
            profile.push_str("(allow mach-lookup (global-name \"com.apple.dnssd.service\"))\n");
        }

        profile.push_str("\n; denied by profile\n");
        for rule in plan.profile.rules().iter().filter(|r| !r.is_allow()) {
            for line in sbpl_lines(rule, "deny") {
                profile.push_str(&line);
                profile.push('\n');
            }
        }
        profile
    }
}

impl IsolationBackend for Seatbelt {
    fn name(&self) -> &'static str {
        "seatbelt"
    }

    fn command(&self, plan: &LaunchPlan<'_>) -> WardenResult<Command> {
        let mut cmd = Command::new(SANDBOX_EXEC_PATH);
        cmd.arg("-p")
            .arg(self.render(plan))
            .arg(&plan.spec.program)
            .args(&plan.spec.args)
            .current_dir(&plan.spec.cwd)
            .env_clear()
            .envs(plan.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        Ok(cmd)
    }
}

fn sbpl_lines(rule: &SandboxRule, verb: &str) -> Vec<String> {
    let filter = match &rule.target {
        RuleTarget::Subpath(path) => format!("(subpath \"{}\")", escape(path)),
        RuleTarget::Literal(path) => format!("(literal \"{}\")", escape(path)),
        // Host filtering is not expressible; network is handled as a whole
        RuleTarget::Host(_) => return Vec::new(),
        RuleTarget::Any => String::new(),
    };
    let scoped = |op: &str| {
        if filter.is_empty() {
            format!("({} {})", verb, op)
        } else {
            format!("({} {} {})", verb, op, filter)
        }
    };

    match rule.operation {
        OperationClass::FileRead => vec![scoped("file-read*")],
        OperationClass::FileWrite => vec![scoped("file-write*")],
        OperationClass::ProcessExec => vec![scoped("process-exec"), scoped("file-read*")],
        OperationClass::SystemInfo => vec![
            format!("({} sysctl-read)", verb),
            format!("({} process-info* (target same-sandbox))", verb),
        ],
        OperationClass::NetworkOutbound => vec![format!("({} network-outbound)", verb)],
    }
}

/// Escape a path for an SBPL string literal; `/tmp` resolves to `/private/tmp`
fn escape(path: &Path) -> String {
    canonicalize_or_self(path)
        .to_string_lossy()
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::compiler::SandboxProfile;
    use crate::sandbox::executor::CommandSpec;

    fn render(rules: Vec<SandboxRule>, network: NetworkAccess) -> String {
        let profile = SandboxProfile::from_rules("test", "/nonexistent/app", rules);
        let spec = CommandSpec::new("true", "/nonexistent/app");
        Seatbelt::new().render(&LaunchPlan {
            spec: &spec,
            profile: &profile,
            network,
            env: Vec::new(),
        })
    }

    #[test]
    fn test_denies_follow_allows() {
        let sbpl = render(
            vec![
                SandboxRule::deny(
                    OperationClass::FileWrite,
                    RuleTarget::Subpath("/nonexistent/app/.git".into()),
                ),
                SandboxRule::allow(
                    OperationClass::FileWrite,
                    RuleTarget::Subpath("/nonexistent/app".into()),
                ),
            ],
            NetworkAccess::Denied,
        );
        assert!(sbpl.starts_with("(version 1)\n(deny default)"));
        let allow = sbpl
            .find("(allow file-write* (subpath \"/nonexistent/app\"))")
            .unwrap();
        let deny = sbpl
            .find("(deny file-write* (subpath \"/nonexistent/app/.git\"))")
            .unwrap();
        assert!(allow < deny);
        assert!(!sbpl.contains("network-outbound"));
    }

    #[test]
    fn test_exec_and_system_info() {
        let sbpl = render(
            vec![
                SandboxRule::allow(
                    OperationClass::ProcessExec,
                    RuleTarget::Subpath("/nonexistent/bin".into()),
                ),
                SandboxRule::allow(OperationClass::SystemInfo, RuleTarget::Any),
            ],
            NetworkAccess::Unrestricted,
        );
        assert!(sbpl.contains("(allow process-exec (subpath \"/nonexistent/bin\"))"));
        assert!(sbpl.contains("(allow file-read* (subpath \"/nonexistent/bin\"))"));
        assert!(sbpl.contains("(allow sysctl-read)"));
        assert!(sbpl.contains("(allow network-outbound)"));
    }

    #[test]
    fn test_escape_quotes() {
        assert_eq!(
            escape(Path::new("/nonexistent/a \"b\"")),
            "/nonexistent/a \\\"b\\\""
        );
    }
}
