//! Conflict detection over compiled rules

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{WardenError, WardenResult};
use crate::sandbox::rules::{Decision, OperationClass, RuleTarget, SandboxRule};

/// Two rules on the same operation and target with opposite decisions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConflict {
    pub operation: OperationClass,
    pub target: RuleTarget,
    /// Positions of the allow and deny rule in the rule list
    pub allow_index: usize,
    pub deny_index: usize,
}

impl fmt::Display for RuleConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} is both allowed (rule {}) and denied (rule {})",
            self.operation, self.target, self.allow_index, self.deny_index
        )
    }
}

/// Every same-target, opposite-decision pair in a rule list
pub fn validate(rules: &[SandboxRule]) -> Vec<RuleConflict> {
    let mut first_seen: HashMap<(OperationClass, &RuleTarget, Decision), usize> = HashMap::new();
    let mut conflicts = Vec::new();

    for (index, rule) in rules.iter().enumerate() {
        let opposite = (rule.operation, &rule.target, rule.decision.opposite());
        if let Some(&other) = first_seen.get(&opposite) {
            let (allow_index, deny_index) = match rule.decision {
                Decision::Allow => (index, other),
                Decision::Deny => (other, index),
            };
            conflicts.push(RuleConflict {
                operation: rule.operation,
                target: rule.target.clone(),
                allow_index,
                deny_index,
            });
        }
        first_seen
            .entry((rule.operation, &rule.target, rule.decision))
            .or_insert(index);
    }
    conflicts
}

/// Fail with `Conflict` listing every conflicting pair
pub fn ensure_consistent(rules: &[SandboxRule]) -> WardenResult<()> {
    let conflicts = validate(rules);
    if conflicts.is_empty() {
        return Ok(());
    }
    Err(WardenError::conflict_with_details(
        format!("Profile has {} contradictory rule pair(s)", conflicts.len()),
        conflicts.iter().map(ToString::to_string).collect(),
    ))
}
