//! Sandbox profile compiler
//!
//! Turns a capability set and a path context into an ordered, deduplicated,
//! conflict-free list of concrete rules. The compiled profile is plain data; it is
//! recompiled for every project and never edited afterwards.

mod templates;
mod validate;

#[cfg(test)]
mod tests;

pub use templates::expand;
pub use validate::{RuleConflict, ensure_consistent, validate};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{WardenError, WardenResult};

use super::capabilities::{Capabilities, Capability};
use super::rules::{
    CustomRule, OperationClass, Platform, RuleTarget, SandboxRule, TargetKind, normalize_path,
};

const LINUX_SYSTEM_READ: &[&str] = &["/usr/lib", "/usr/lib64", "/lib", "/lib64", "/usr/share", "/etc"];

const MACOS_SYSTEM_READ: &[&str] = &[
    "/usr/lib",
    "/usr/share",
    "/System/Library",
    "/Library/Frameworks",
    "/private/etc",
    "/private/var/db",
];

const GENERIC_SYSTEM_READ: &[&str] = &["/usr/lib", "/lib", "/usr/share", "/etc"];

const SYSTEM_EXEC: &[&str] = &["/usr/bin", "/bin"];

const EXTRA_EXEC: &[&str] = &["/usr/local/bin", "/opt/homebrew/bin"];

const HOME_TOOLCHAIN_DIRS: &[&str] = &[".cargo", ".rustup", ".npm", ".nvm", ".pyenv", ".local"];

const HOME_TOOLCHAIN_BINS: &[&str] = &[".cargo/bin", ".local/bin"];

/// Paths and extra rules a profile is compiled against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileContext {
    pub project_root: PathBuf,
    pub home_dir: PathBuf,
    #[serde(default)]
    pub custom_rules: Vec<CustomRule>,
}

impl ProfileContext {
    pub fn new(project_root: impl Into<PathBuf>, home_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            home_dir: home_dir.into(),
            custom_rules: Vec::new(),
        }
    }

    /// Context for a project, using the current user's home directory
    pub fn for_project(project_root: impl Into<PathBuf>) -> WardenResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| WardenError::config("Cannot determine the home directory"))?;
        Ok(Self::new(project_root, home))
    }

    pub fn with_custom_rules(mut self, rules: impl IntoIterator<Item = CustomRule>) -> Self {
        self.custom_rules.extend(rules);
        self
    }
}

/// A compiled profile: ordered rules bound to one project root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxProfile {
    name: String,
    capabilities: Capabilities,
    project_root: PathBuf,
    rules: Vec<SandboxRule>,
}

impl SandboxProfile {
    /// A profile from hand-written rules; nothing is checked until it is validated or launched
    pub fn from_rules(
        name: impl Into<String>,
        project_root: impl Into<PathBuf>,
        rules: Vec<SandboxRule>,
    ) -> Self {
        Self {
            name: name.into(),
            capabilities: Capabilities::none(),
            project_root: normalize_path(&project_root.into()),
            rules,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn rules(&self) -> &[SandboxRule] {
        &self.rules
    }

    /// Rules for one operation class with the given decision
    pub fn rules_for(
        &self,
        operation: OperationClass,
        allow: bool,
    ) -> impl Iterator<Item = &SandboxRule> {
        self.rules
            .iter()
            .filter(move |r| r.operation == operation && r.is_allow() == allow)
    }

    /// Contradictory rule pairs in this profile
    pub fn validate(&self) -> Vec<RuleConflict> {
        validate(&self.rules)
    }
}

/// Compile for the platform this binary runs on
pub fn compile(
    name: impl Into<String>,
    capabilities: &Capabilities,
    context: &ProfileContext,
) -> WardenResult<SandboxProfile> {
    compile_for(name, capabilities, context, Platform::current())
}

/// Compile for an explicit platform; custom rules for other platforms are dropped
pub fn compile_for(
    name: impl Into<String>,
    capabilities: &Capabilities,
    context: &ProfileContext,
    platform: Option<Platform>,
) -> WardenResult<SandboxProfile> {
    let name = name.into();
    let project_root = absolute(&context.project_root, "project root")?;
    let mut rules = RuleList::default();

    // Base rules
    rules.push(SandboxRule::allow(
        OperationClass::FileRead,
        RuleTarget::Subpath(project_root.clone()),
    ));
    rules.push(SandboxRule::allow(
        OperationClass::ProcessExec,
        RuleTarget::Subpath(project_root.clone()),
    ));
    let system_read = match platform {
        Some(Platform::Linux) => LINUX_SYSTEM_READ,
        Some(Platform::Macos) => MACOS_SYSTEM_READ,
        None => GENERIC_SYSTEM_READ,
    };
    for dir in system_read {
        rules.push(SandboxRule::allow(OperationClass::FileRead, subpath(dir)));
    }
    for dir in SYSTEM_EXEC {
        rules.push(SandboxRule::allow(OperationClass::ProcessExec, subpath(dir)));
    }
    for op in [OperationClass::FileRead, OperationClass::FileWrite] {
        rules.push(SandboxRule::allow(
            op,
            RuleTarget::Literal(PathBuf::from("/dev/null")),
        ));
    }

    // Capability rules
    if capabilities.has(Capability::FileRead) {
        let home = absolute(&context.home_dir, "home directory")?;
        for dir in HOME_TOOLCHAIN_DIRS {
            rules.push(SandboxRule::allow(
                OperationClass::FileRead,
                RuleTarget::Subpath(home.join(dir)),
            ));
        }
    }
    if capabilities.has(Capability::FileWrite) {
        rules.push(SandboxRule::allow(
            OperationClass::FileWrite,
            RuleTarget::Subpath(project_root.clone()),
        ));
    }
    if capabilities.has(Capability::ProcessExec) {
        let home = absolute(&context.home_dir, "home directory")?;
        for dir in EXTRA_EXEC {
            rules.push(SandboxRule::allow(OperationClass::ProcessExec, subpath(dir)));
        }
        for dir in HOME_TOOLCHAIN_BINS {
            rules.push(SandboxRule::allow(
                OperationClass::ProcessExec,
                RuleTarget::Subpath(home.join(dir)),
            ));
        }
    }
    if capabilities.has(Capability::SystemInfo) {
        rules.push(SandboxRule::allow(OperationClass::SystemInfo, RuleTarget::Any));
    }
    if capabilities.has(Capability::Network) {
        for host in &capabilities.network_hosts {
            rules.push(SandboxRule::allow(
                OperationClass::NetworkOutbound,
                RuleTarget::Host(validate_host(host)?),
            ));
        }
    }

    // Custom rules come last
    for custom in &context.custom_rules {
        if custom.platform.is_some_and(|p| Some(p) != platform) {
            tracing::debug!("Skipping custom rule for another platform: {}", custom);
            continue;
        }
        rules.push(compile_custom(custom, context)?);
    }

    let rules = rules.into_inner();
    ensure_consistent(&rules)?;

    tracing::debug!(
        "Compiled sandbox profile {} with {} rules for {}",
        name,
        rules.len(),
        project_root.display()
    );
    Ok(SandboxProfile {
        name,
        capabilities: capabilities.clone(),
        project_root,
        rules,
    })
}

fn compile_custom(custom: &CustomRule, context: &ProfileContext) -> WardenResult<SandboxRule> {
    let rule_text = custom.to_string();
    let target = match custom.kind {
        TargetKind::Subpath | TargetKind::Literal => {
            if !custom.operation.is_path_based() {
                return Err(WardenError::invalid_rule_in(
                    format!("{} rules cannot target a path", custom.operation),
                    rule_text,
                ));
            }
            let expanded = expand(&custom.pattern, context)?;
            let path = PathBuf::from(&expanded);
            if !path.is_absolute() {
                return Err(WardenError::invalid_rule_in(
                    format!("Rule path is not absolute after expansion: {}", expanded),
                    rule_text,
                ));
            }
            let path = normalize_path(&path);
            if custom.kind == TargetKind::Subpath {
                RuleTarget::Subpath(path)
            } else {
                RuleTarget::Literal(path)
            }
        }
        TargetKind::Host => {
            if custom.operation != OperationClass::NetworkOutbound {
                return Err(WardenError::invalid_rule_in(
                    "Only network-outbound rules can target a host",
                    rule_text,
                ));
            }
            RuleTarget::Host(validate_host(&expand(&custom.pattern, context)?)?)
        }
        TargetKind::Any => {
            if custom.operation.is_path_based() {
                return Err(WardenError::invalid_rule_in(
                    format!("{} rules must name a path", custom.operation),
                    rule_text,
                ));
            }
            RuleTarget::Any
        }
    };
    if custom.operation == OperationClass::SystemInfo && target != RuleTarget::Any {
        return Err(WardenError::invalid_rule_in(
            "system-info rules only accept the any target",
            rule_text,
        ));
    }

    Ok(SandboxRule {
        operation: custom.operation,
        target,
        decision: custom.decision,
    })
}

/// Lowercased host, or `*.suffix`; no paths, whitespace or inner wildcards
pub fn validate_host(host: &str) -> WardenResult<String> {
    let host = host.trim().trim_end_matches('.').to_lowercase();
    let bare = host.strip_prefix("*.").unwrap_or(&host);
    if bare.is_empty()
        || bare.contains('/')
        || bare.contains('*')
        || bare.chars().any(char::is_whitespace)
    {
        return Err(WardenError::invalid_rule_in("Invalid host pattern", host));
    }
    Ok(host)
}

fn absolute(path: &Path, what: &str) -> WardenResult<PathBuf> {
    if path.as_os_str().is_empty() || !path.is_absolute() {
        return Err(WardenError::invalid_rule(format!(
            "The {} must be an absolute path, got {:?}",
            what, path
        )));
    }
    Ok(normalize_path(path))
}

fn subpath(dir: &str) -> RuleTarget {
    RuleTarget::Subpath(PathBuf::from(dir))
}

/// Insertion-ordered rule list that keeps the first of identical rules
#[derive(Default)]
struct RuleList {
    rules: Vec<SandboxRule>,
    seen: HashSet<SandboxRule>,
}

impl RuleList {
    fn push(&mut self, rule: SandboxRule) {
        if self.seen.insert(rule.clone()) {
            self.rules.push(rule);
        }
    }

    fn into_inner(self) -> Vec<SandboxRule> {
        self.rules
    }
}
