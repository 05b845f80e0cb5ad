//! Dry-run evaluation of actions against a compiled profile

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{WardenError, WardenResult};

use super::compiler::SandboxProfile;
use super::rules::{ActionTarget, Decision, OperationClass, SandboxAction, SandboxRule};

/// Result of testing one action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub action: SandboxAction,
    pub decision: Decision,
    /// The rule that decided, or none when the default deny applied
    pub rule: Option<SandboxRule>,
}

impl Evaluation {
    pub fn is_allowed(&self) -> bool {
        self.decision == Decision::Allow
    }

    pub fn explain(&self) -> String {
        match &self.rule {
            Some(rule) => format!("{} by rule: {}", self.decision, rule),
            None => "deny by default: no rule allows it".to_string(),
        }
    }
}

impl SandboxProfile {
    /// Decide an action without running anything
    ///
    /// A matching deny wins over any allow; with no match the action is denied.
    /// Relative paths are taken from the project root.
    pub fn evaluate(&self, action: &SandboxAction) -> Evaluation {
        let action = self.resolve(action);
        let mut allow: Option<&SandboxRule> = None;
        for rule in self.rules() {
            if !rule.matches(&action) {
                continue;
            }
            if rule.decision == Decision::Deny {
                return Evaluation {
                    decision: Decision::Deny,
                    rule: Some(rule.clone()),
                    action,
                };
            }
            allow.get_or_insert(rule);
        }

        match allow {
            Some(rule) => Evaluation {
                decision: Decision::Allow,
                rule: Some(rule.clone()),
                action,
            },
            None => Evaluation {
                decision: Decision::Deny,
                rule: None,
                action,
            },
        }
    }

    pub fn allows(&self, action: &SandboxAction) -> bool {
        self.evaluate(action).is_allowed()
    }

    fn resolve(&self, action: &SandboxAction) -> SandboxAction {
        match &action.target {
            ActionTarget::Path(path) if path.is_relative() => SandboxAction {
                operation: action.operation,
                target: ActionTarget::Path(self.project_root().join(path)),
            },
            _ => action.clone(),
        }
    }
}

impl SandboxAction {
    /// Parse `operation:target`, e.g. `file-write:/tmp/x`, `network-outbound:github.com`,
    /// or a bare `system-info`
    pub fn parse(input: &str) -> WardenResult<Self> {
        let input = input.trim();
        let (op, target) = match input.split_once(':') {
            Some((op, target)) => (op.trim(), Some(target.trim())),
            None => (input, None),
        };
        let operation: OperationClass = op.parse().map_err(|_| {
            WardenError::tool_output_parse(format!("Unknown operation class '{}'", op), input)
        })?;

        let target = match (operation, target) {
            (OperationClass::SystemInfo, None | Some("")) => ActionTarget::None,
            (OperationClass::SystemInfo, Some(_)) => {
                return Err(WardenError::tool_output_parse(
                    "system-info actions take no target",
                    input,
                ));
            }
            (_, None | Some("")) => {
                return Err(WardenError::tool_output_parse(
                    format!("{} actions need a target", operation),
                    input,
                ));
            }
            (OperationClass::NetworkOutbound, Some(host)) => {
                if host.contains('/') || host.chars().any(char::is_whitespace) {
                    return Err(WardenError::tool_output_parse(
                        format!("Not a host name: {}", host),
                        input,
                    ));
                }
                ActionTarget::Host(host.to_lowercase())
            }
            (_, Some(path)) => ActionTarget::Path(PathBuf::from(path)),
        };

        Ok(Self { operation, target })
    }
}
