//! Named profiles: built-in presets plus profiles defined in configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{WardenError, WardenResult};

use super::capabilities::{Capabilities, Capability};
use super::compiler::{self, ProfileContext, SandboxProfile};
use super::rules::CustomRule;

/// Hosts the development preset may reach
pub const DEVELOPMENT_HOSTS: &[&str] = &[
    "crates.io",
    "static.crates.io",
    "index.crates.io",
    "github.com",
    "registry.npmjs.org",
    "pypi.org",
    "files.pythonhosted.org",
];

/// A named capability shorthand, as written in configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub capabilities: Capabilities,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<CustomRule>,
}

/// Listing entry for a named profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub name: String,
    pub description: Option<String>,
    pub capabilities: Capabilities,
    pub custom_rules: usize,
    pub builtin: bool,
}

#[derive(Debug, Clone)]
struct CatalogEntry {
    definition: ProfileDefinition,
    builtin: bool,
}

/// Registry of named profiles
#[derive(Debug, Clone)]
pub struct ProfileCatalog {
    profiles: BTreeMap<String, CatalogEntry>,
}

impl Default for ProfileCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ProfileCatalog {
    /// The `minimal`, `standard` and `development` presets
    pub fn builtin() -> Self {
        let standard = Capabilities::none()
            .with(Capability::FileRead)
            .with(Capability::ProcessExec)
            .with(Capability::SystemInfo);
        let development = DEVELOPMENT_HOSTS
            .iter()
            .fold(standard.clone().with(Capability::FileWrite), |caps, host| {
                caps.with_host(*host)
            });

        let mut catalog = Self {
            profiles: BTreeMap::new(),
        };
        catalog.insert_builtin(
            "minimal",
            "Read and run inside the project only",
            Capabilities::none(),
        );
        catalog.insert_builtin(
            "standard",
            "Read toolchains, run tools, query system info; no writes or network",
            standard,
        );
        catalog.insert_builtin(
            "development",
            "Standard plus project writes and package registry access",
            development,
        );
        catalog
    }

    fn insert_builtin(&mut self, name: &str, description: &str, capabilities: Capabilities) {
        self.profiles.insert(
            name.to_string(),
            CatalogEntry {
                definition: ProfileDefinition {
                    description: Some(description.to_string()),
                    capabilities,
                    rules: Vec::new(),
                },
                builtin: true,
            },
        );
    }

    /// Add configured profiles; a configured profile replaces a preset of the same name
    pub fn with_definitions(mut self, definitions: &BTreeMap<String, ProfileDefinition>) -> Self {
        for (name, definition) in definitions {
            if self.profiles.contains_key(name) {
                tracing::debug!("Configured profile {} overrides the built-in preset", name);
            }
            self.profiles.insert(
                name.clone(),
                CatalogEntry {
                    definition: definition.clone(),
                    builtin: false,
                },
            );
        }
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.profiles.keys().map(String::as_str).collect()
    }

    pub fn list(&self) -> Vec<ProfileSummary> {
        self.profiles
            .iter()
            .map(|(name, entry)| ProfileSummary {
                name: name.clone(),
                description: entry.definition.description.clone(),
                capabilities: entry.definition.capabilities.clone(),
                custom_rules: entry.definition.rules.len(),
                builtin: entry.builtin,
            })
            .collect()
    }

    pub fn get(&self, name: &str) -> WardenResult<&ProfileDefinition> {
        self.profiles
            .get(name)
            .map(|entry| &entry.definition)
            .ok_or_else(|| WardenError::not_found("profile", name))
    }

    /// Compile a named profile for a context; the profile's own rules precede the context's
    pub fn compile(&self, name: &str, context: &ProfileContext) -> WardenResult<SandboxProfile> {
        let definition = self.get(name)?;
        let mut context = context.clone();
        let mut rules = definition.rules.clone();
        rules.append(&mut context.custom_rules);
        context.custom_rules = rules;
        compiler::compile(name, &definition.capabilities, &context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::rules::{Decision, OperationClass, SandboxAction, TargetKind};

    fn context() -> ProfileContext {
        ProfileContext::new("/work/app", "/home/dev")
    }

    #[test]
    fn test_builtin_presets() {
        let catalog = ProfileCatalog::builtin();
        assert_eq!(catalog.names(), vec!["development", "minimal", "standard"]);

        let minimal = catalog.get("minimal").unwrap();
        assert!(minimal.capabilities.flags.is_empty());

        let standard = &catalog.get("standard").unwrap().capabilities;
        let development = &catalog.get("development").unwrap().capabilities;
        assert!(standard.is_subset(development));
        assert!(development.has(Capability::FileWrite));
        assert_eq!(development.network_hosts.len(), DEVELOPMENT_HOSTS.len());
    }

    #[test]
    fn test_unknown_profile() {
        let err = ProfileCatalog::builtin()
            .compile("paranoid", &context())
            .unwrap_err();
        assert!(matches!(err, WardenError::NotFound { .. }));
    }

    #[test]
    fn test_compile_development() {
        let profile = ProfileCatalog::builtin()
            .compile("development", &context())
            .unwrap();
        assert_eq!(profile.name(), "development");
        assert!(profile.allows(&SandboxAction::host("index.crates.io")));
        assert!(profile.allows(&SandboxAction::path(
            OperationClass::FileWrite,
            "/work/app/target/debug/app"
        )));
        assert!(!profile.allows(&SandboxAction::host("example.com")));
    }

    #[test]
    fn test_configured_profile_overrides_preset() {
        let configured: BTreeMap<String, ProfileDefinition> = toml::from_str(
            r#"
[standard]
description = "locked down"
flags = ["file-read"]

[ci]
flags = ["file-read", "file-write"]
rules = [{ operation = "file-write", kind = "subpath", pattern = "{{PROJECT_ROOT}}/.git", decision = "deny" }]
"#,
        )
        .unwrap();

        let catalog = ProfileCatalog::builtin().with_definitions(&configured);
        let summaries = catalog.list();
        let standard = summaries.iter().find(|s| s.name == "standard").unwrap();
        assert!(!standard.builtin);
        assert_eq!(standard.description.as_deref(), Some("locked down"));

        let ci = catalog.get("ci").unwrap();
        assert_eq!(ci.rules[0].kind, TargetKind::Subpath);
        assert_eq!(ci.rules[0].decision, Decision::Deny);

        let profile = catalog.compile("ci", &context()).unwrap();
        assert!(!profile.allows(&SandboxAction::path(
            OperationClass::FileWrite,
            "/work/app/.git/index"
        )));
        assert!(profile.allows(&SandboxAction::path(
            OperationClass::FileWrite,
            "/work/app/README.md"
        )));
    }
}
