//! Automatic checkpoint policy

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

/// When checkpoints are taken without an explicit request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStrategy {
    /// Only explicit requests
    Manual,
    /// Before every user prompt
    PerPrompt,
    /// After every tool invocation
    PerToolUse,
    /// After tool invocations that mutate files
    #[default]
    Smart,
}

/// A tool call reported by the agent loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    #[serde(default)]
    pub input: serde_json::Value,
}

impl ToolInvocation {
    pub fn new(name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            input,
        }
    }
}

/// Events the policy reacts to
#[derive(Debug, Clone, Copy)]
pub enum PolicyEvent<'a> {
    UserPrompt,
    ToolUse(&'a [ToolInvocation]),
}

static DESTRUCTIVE_SHELL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        (^|[;&|(]\s*|\s)
        (rm|mv|cp|touch|mkdir|rmdir|ln|chmod|truncate|tee|patch|unzip|tar
         |sed\s+(-[a-zA-Z]*\s+)*-i
         |git\s+(checkout|reset|restore|apply|stash|merge|rebase|pull|clean|mv|rm)
         |npm\s+(install|i|uninstall)|cargo\s+(add|remove|fmt|new|init)|pip\s+install)
        (\s|$)
        |[^<>0-9&]>>?\s*[^&\s]",
    )
    .expect("destructive shell pattern is valid")
});

const SHELL_TOOLS: &[&str] = &["bash", "shell", "sh", "exec", "run_command"];

/// Decides whether an event warrants an automatic checkpoint
#[derive(Debug, Clone)]
pub struct AutoCheckpointPolicy {
    pub strategy: CheckpointStrategy,
    pub min_interval: Duration,
    mutating_tools: HashSet<String>,
}

impl Default for AutoCheckpointPolicy {
    fn default() -> Self {
        Self::new(
            CheckpointStrategy::default(),
            Duration::from_secs(30),
            default_mutating_tools(),
        )
    }
}

/// Tool names treated as file mutations
pub fn default_mutating_tools() -> Vec<String> {
    ["write", "edit", "multiedit", "notebookedit"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl AutoCheckpointPolicy {
    pub fn new(
        strategy: CheckpointStrategy,
        min_interval: Duration,
        mutating_tools: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            strategy,
            min_interval,
            mutating_tools: mutating_tools
                .into_iter()
                .map(|t| t.to_lowercase())
                .collect(),
        }
    }

    /// Whether a single tool call writes to the file system
    pub fn is_file_mutating(&self, tool: &ToolInvocation) -> bool {
        let name = tool.name.to_lowercase();
        if self.mutating_tools.contains(&name) {
            return true;
        }
        if SHELL_TOOLS.contains(&name.as_str()) {
            return tool
                .input
                .get("command")
                .and_then(|c| c.as_str())
                .is_some_and(|command| DESTRUCTIVE_SHELL.is_match(command));
        }
        false
    }

    /// Strategy decision, ignoring the throttle
    pub fn wants_checkpoint(&self, event: PolicyEvent<'_>) -> bool {
        match (self.strategy, event) {
            (CheckpointStrategy::Manual, _) => false,
            (CheckpointStrategy::PerPrompt, PolicyEvent::UserPrompt) => true,
            (CheckpointStrategy::PerPrompt, PolicyEvent::ToolUse(_)) => false,
            (CheckpointStrategy::PerToolUse, PolicyEvent::ToolUse(tools)) => !tools.is_empty(),
            (CheckpointStrategy::Smart, PolicyEvent::ToolUse(tools)) => {
                tools.iter().any(|t| self.is_file_mutating(t))
            }
            (_, PolicyEvent::UserPrompt) => false,
        }
    }

    /// Strategy decision combined with the minimum-interval throttle
    pub fn should_checkpoint(
        &self,
        event: PolicyEvent<'_>,
        last_auto: Option<Instant>,
        now: Instant,
    ) -> bool {
        if !self.wants_checkpoint(event) {
            return false;
        }
        match last_auto {
            Some(last) => now.saturating_duration_since(last) >= self.min_interval,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bash(command: &str) -> ToolInvocation {
        ToolInvocation::new("Bash", json!({ "command": command }))
    }

    #[test]
    fn test_write_tools_are_mutating() {
        let policy = AutoCheckpointPolicy::default();
        assert!(policy.is_file_mutating(&ToolInvocation::new("Edit", json!({}))));
        assert!(policy.is_file_mutating(&ToolInvocation::new("write", json!({}))));
        assert!(!policy.is_file_mutating(&ToolInvocation::new("Read", json!({}))));
    }

    #[test]
    fn test_shell_classification() {
        let policy = AutoCheckpointPolicy::default();
        assert!(policy.is_file_mutating(&bash("rm -rf build")));
        assert!(policy.is_file_mutating(&bash("cd src && mv a.rs b.rs")));
        assert!(policy.is_file_mutating(&bash("echo hi > out.txt")));
        assert!(policy.is_file_mutating(&bash("sed -i 's/a/b/' file")));
        assert!(policy.is_file_mutating(&bash("git checkout -- .")));

        assert!(!policy.is_file_mutating(&bash("ls -la")));
        assert!(!policy.is_file_mutating(&bash("cargo test 2>&1")));
        assert!(!policy.is_file_mutating(&bash("grep -r term src")));
        assert!(!policy.is_file_mutating(&ToolInvocation::new("Bash", json!({}))));
    }

    #[test]
    fn test_strategies() {
        let mut policy = AutoCheckpointPolicy::default();
        let read_only = [ToolInvocation::new("Read", json!({}))];
        let edits = [ToolInvocation::new("Edit", json!({}))];

        assert!(policy.wants_checkpoint(PolicyEvent::ToolUse(&edits)));
        assert!(!policy.wants_checkpoint(PolicyEvent::ToolUse(&read_only)));
        assert!(!policy.wants_checkpoint(PolicyEvent::UserPrompt));

        policy.strategy = CheckpointStrategy::PerToolUse;
        assert!(policy.wants_checkpoint(PolicyEvent::ToolUse(&read_only)));
        assert!(!policy.wants_checkpoint(PolicyEvent::ToolUse(&[])));

        policy.strategy = CheckpointStrategy::PerPrompt;
        assert!(policy.wants_checkpoint(PolicyEvent::UserPrompt));
        assert!(!policy.wants_checkpoint(PolicyEvent::ToolUse(&edits)));

        policy.strategy = CheckpointStrategy::Manual;
        assert!(!policy.wants_checkpoint(PolicyEvent::ToolUse(&edits)));
    }

    #[test]
    fn test_throttle() {
        let policy = AutoCheckpointPolicy::default();
        let edits = [ToolInvocation::new("Edit", json!({}))];
        let start = Instant::now();

        assert!(policy.should_checkpoint(PolicyEvent::ToolUse(&edits), None, start));
        assert!(!policy.should_checkpoint(
            PolicyEvent::ToolUse(&edits),
            Some(start),
            start + Duration::from_secs(5)
        ));
        assert!(policy.should_checkpoint(
            PolicyEvent::ToolUse(&edits),
            Some(start),
            start + Duration::from_secs(31)
        ));
    }
}
