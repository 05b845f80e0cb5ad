//! Constructor methods for WardenError

use super::types::WardenError;
use std::path::Path;

impl WardenError {
    /// Create a not-found error for a resource of the given kind
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Create an invalid rule error
    pub fn invalid_rule(message: impl Into<String>) -> Self {
        Self::InvalidRule {
            message: message.into(),
            rule: None,
        }
    }

    /// Create an invalid rule error that names the offending rule
    pub fn invalid_rule_in(message: impl Into<String>, rule: impl Into<String>) -> Self {
        Self::InvalidRule {
            message: message.into(),
            rule: Some(rule.into()),
        }
    }

    /// Create a conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            details: Vec::new(),
        }
    }

    /// Create a conflict error listing every conflicting pair
    pub fn conflict_with_details(message: impl Into<String>, details: Vec<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            details,
        }
    }

    /// Create a storage error without a path
    pub fn storage(message: impl Into<String>) -> Self {
        Self::StorageIo {
            message: message.into(),
            path: None,
        }
    }

    /// Create a storage error for a specific path
    pub fn storage_io(message: impl Into<String>, path: &Path) -> Self {
        Self::StorageIo {
            message: message.into(),
            path: Some(path.display().to_string()),
        }
    }

    /// Create an isolation error naming the missing primitives
    pub fn isolation_unavailable(message: impl Into<String>, missing: Vec<String>) -> Self {
        Self::IsolationUnavailable {
            message: message.into(),
            missing,
        }
    }

    /// Create a spawn failure for a program
    pub fn spawn_failure(message: impl Into<String>, program: impl Into<String>) -> Self {
        Self::ProcessSpawnFailure {
            message: message.into(),
            run_id: None,
            program: Some(program.into()),
        }
    }

    /// Create a parse error for external or textual input
    pub fn tool_output_parse(message: impl Into<String>, input: impl Into<String>) -> Self {
        Self::ToolOutputParse {
            message: message.into(),
            input: Some(input.into()),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: None,
        }
    }

    /// Create a configuration error with context
    pub fn config_with_context(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: Some(context.into()),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Attach a run id to a spawn failure; other variants are returned unchanged
    pub fn with_run_id(self, id: u64) -> Self {
        match self {
            Self::ProcessSpawnFailure {
                message, program, ..
            } => Self::ProcessSpawnFailure {
                message,
                run_id: Some(id),
                program,
            },
            other => other,
        }
    }
}
