//! Sandbox rule types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use crate::error::WardenError;

/// Class of operation a rule governs
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationClass {
    FileRead,
    FileWrite,
    ProcessExec,
    NetworkOutbound,
    SystemInfo,
}

impl OperationClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationClass::FileRead => "file-read",
            OperationClass::FileWrite => "file-write",
            OperationClass::ProcessExec => "process-exec",
            OperationClass::NetworkOutbound => "network-outbound",
            OperationClass::SystemInfo => "system-info",
        }
    }

    /// Whether targets of this class are filesystem paths
    pub fn is_path_based(&self) -> bool {
        matches!(
            self,
            OperationClass::FileRead | OperationClass::FileWrite | OperationClass::ProcessExec
        )
    }
}

impl fmt::Display for OperationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationClass {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "file-read" => Ok(OperationClass::FileRead),
            "file-write" => Ok(OperationClass::FileWrite),
            "process-exec" => Ok(OperationClass::ProcessExec),
            "network-outbound" | "network" => Ok(OperationClass::NetworkOutbound),
            "system-info" => Ok(OperationClass::SystemInfo),
            other => Err(WardenError::invalid_rule(format!(
                "Unknown operation class: {}",
                other
            ))),
        }
    }
}

/// Outcome a rule prescribes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn opposite(self) -> Self {
        match self {
            Decision::Allow => Decision::Deny,
            Decision::Deny => Decision::Allow,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Allow => f.write_str("allow"),
            Decision::Deny => f.write_str("deny"),
        }
    }
}

/// What a compiled rule applies to
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum RuleTarget {
    /// A directory and everything below it
    Subpath(PathBuf),
    /// Exactly one path
    Literal(PathBuf),
    /// A host name, or `*.suffix` for every subdomain of `suffix`
    Host(String),
    /// Every target of the operation class
    Any,
}

impl RuleTarget {
    pub fn kind(&self) -> TargetKind {
        match self {
            RuleTarget::Subpath(_) => TargetKind::Subpath,
            RuleTarget::Literal(_) => TargetKind::Literal,
            RuleTarget::Host(_) => TargetKind::Host,
            RuleTarget::Any => TargetKind::Any,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            RuleTarget::Subpath(p) | RuleTarget::Literal(p) => Some(p),
            _ => None,
        }
    }

    /// Whether this target covers the given action target
    pub fn covers(&self, target: &ActionTarget) -> bool {
        match (self, target) {
            (RuleTarget::Any, _) => true,
            (RuleTarget::Subpath(root), ActionTarget::Path(path)) => {
                normalize_path(path).starts_with(root)
            }
            (RuleTarget::Literal(exact), ActionTarget::Path(path)) => {
                normalize_path(path) == *exact
            }
            (RuleTarget::Host(pattern), ActionTarget::Host(host)) => host_matches(pattern, host),
            _ => false,
        }
    }
}

impl fmt::Display for RuleTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleTarget::Subpath(p) => write!(f, "subpath {}", p.display()),
            RuleTarget::Literal(p) => write!(f, "literal {}", p.display()),
            RuleTarget::Host(h) => write!(f, "host {}", h),
            RuleTarget::Any => f.write_str("any"),
        }
    }
}

fn host_matches(pattern: &str, host: &str) -> bool {
    let host = host.trim_end_matches('.').to_lowercase();
    match pattern.strip_prefix("*.") {
        Some(suffix) => host
            .strip_suffix(suffix)
            .is_some_and(|rest| rest.ends_with('.') && rest.len() > 1),
        None => host == pattern,
    }
}

/// Target kinds accepted in declarative rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetKind {
    Subpath,
    Literal,
    Host,
    Any,
}

/// One compiled rule: an operation on a target is allowed or denied
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SandboxRule {
    pub operation: OperationClass,
    pub target: RuleTarget,
    pub decision: Decision,
}

impl SandboxRule {
    pub fn allow(operation: OperationClass, target: RuleTarget) -> Self {
        Self {
            operation,
            target,
            decision: Decision::Allow,
        }
    }

    pub fn deny(operation: OperationClass, target: RuleTarget) -> Self {
        Self {
            operation,
            target,
            decision: Decision::Deny,
        }
    }

    pub fn is_allow(&self) -> bool {
        self.decision == Decision::Allow
    }

    /// Whether this rule applies to an action
    pub fn matches(&self, action: &SandboxAction) -> bool {
        self.operation == action.operation && self.target.covers(&action.target)
    }
}

impl fmt::Display for SandboxRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.decision, self.operation, self.target)
    }
}

/// Host platforms a custom rule can be restricted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    Macos,
}

impl Platform {
    /// The platform this binary was built for, if it is one with a sandbox backend
    pub fn current() -> Option<Self> {
        if cfg!(target_os = "linux") {
            Some(Platform::Linux)
        } else if cfg!(target_os = "macos") {
            Some(Platform::Macos)
        } else {
            None
        }
    }
}

/// A declarative rule whose pattern may contain template variables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomRule {
    pub operation: OperationClass,
    pub kind: TargetKind,
    /// Path or host pattern, e.g. `{{PROJECT_ROOT}}/.git`; ignored for `any`
    #[serde(default)]
    pub pattern: String,
    pub decision: Decision,
    /// Only compiled on this platform when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

impl CustomRule {
    pub fn new(
        operation: OperationClass,
        kind: TargetKind,
        pattern: impl Into<String>,
        decision: Decision,
    ) -> Self {
        Self {
            operation,
            kind,
            pattern: pattern.into(),
            decision,
            platform: None,
        }
    }

    pub fn on_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }
}

impl fmt::Display for CustomRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {:?} {}",
            self.decision, self.operation, self.kind, self.pattern
        )
    }
}

/// What an action touches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum ActionTarget {
    Path(PathBuf),
    Host(String),
    None,
}

/// A hypothetical operation checked against a profile without running anything
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxAction {
    pub operation: OperationClass,
    pub target: ActionTarget,
}

impl SandboxAction {
    pub fn path(operation: OperationClass, path: impl Into<PathBuf>) -> Self {
        Self {
            operation,
            target: ActionTarget::Path(path.into()),
        }
    }

    pub fn host(host: impl Into<String>) -> Self {
        Self {
            operation: OperationClass::NetworkOutbound,
            target: ActionTarget::Host(host.into()),
        }
    }

    pub fn system_info() -> Self {
        Self {
            operation: OperationClass::SystemInfo,
            target: ActionTarget::None,
        }
    }
}

impl fmt::Display for SandboxAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            ActionTarget::Path(path) => write!(f, "{} {}", self.operation, path.display()),
            ActionTarget::Host(host) => write!(f, "{} {}", self.operation, host),
            ActionTarget::None => write!(f, "{}", self.operation),
        }
    }
}

/// Lexically normalize a path: drop `.` and resolve `..` without touching the filesystem
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // `..` at the root stays at the root
                if !out.pop() && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/a/./b/../c")),
            PathBuf::from("/a/c")
        );
        assert_eq!(normalize_path(Path::new("/../etc")), PathBuf::from("/etc"));
    }

    #[test]
    fn test_subpath_covers_descendants_only() {
        let target = RuleTarget::Subpath(PathBuf::from("/work/project"));
        assert!(target.covers(&ActionTarget::Path("/work/project".into())));
        assert!(target.covers(&ActionTarget::Path("/work/project/src/lib.rs".into())));
        assert!(!target.covers(&ActionTarget::Path("/work/project-other".into())));
        assert!(!target.covers(&ActionTarget::Path("/work/project/../secret".into())));
    }

    #[test]
    fn test_literal_is_exact() {
        let target = RuleTarget::Literal(PathBuf::from("/dev/null"));
        assert!(target.covers(&ActionTarget::Path("/dev/null".into())));
        assert!(!target.covers(&ActionTarget::Path("/dev/null/x".into())));
    }

    #[test]
    fn test_host_wildcard() {
        let target = RuleTarget::Host("*.crates.io".into());
        assert!(target.covers(&ActionTarget::Host("static.crates.io".into())));
        assert!(target.covers(&ActionTarget::Host("STATIC.crates.io.".into())));
        assert!(!target.covers(&ActionTarget::Host("crates.io".into())));
        assert!(!target.covers(&ActionTarget::Host("evilcrates.io".into())));

        let exact = RuleTarget::Host("github.com".into());
        assert!(exact.covers(&ActionTarget::Host("github.com".into())));
        assert!(!exact.covers(&ActionTarget::Host("api.github.com".into())));
    }

    #[test]
    fn test_operation_class_parse() {
        assert_eq!(
            "network".parse::<OperationClass>().unwrap(),
            OperationClass::NetworkOutbound
        );
        assert!("teleport".parse::<OperationClass>().is_err());
    }

    #[test]
    fn test_rule_serialization() {
        let rule = SandboxRule::deny(
            OperationClass::FileWrite,
            RuleTarget::Subpath("/work/.git".into()),
        );
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["operation"], "file-write");
        assert_eq!(json["decision"], "deny");
        assert_eq!(json["target"]["kind"], "subpath");
        assert_eq!(rule.to_string(), "deny file-write subpath /work/.git");
    }

    #[test]
    fn test_custom_rule_from_toml() {
        let rule: CustomRule = toml::from_str(
            r#"
operation = "file-write"
kind = "subpath"
pattern = "{{HOME}}/.cache"
decision = "allow"
platform = "linux"
"#,
        )
        .unwrap();
        assert_eq!(rule.kind, TargetKind::Subpath);
        assert_eq!(rule.platform, Some(Platform::Linux));
    }
}
