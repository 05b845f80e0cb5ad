//! ErrorCode implementation for WardenError

use super::types::{ErrorCode, WardenError};

impl ErrorCode for WardenError {
    fn error_code(&self) -> &str {
        match self {
            Self::NotFound { .. } => "WARDEN_NOT_FOUND",
            Self::InvalidRule { .. } => "WARDEN_INVALID_RULE",
            Self::Conflict { .. } => "WARDEN_CONFLICT",
            Self::StorageIo { .. } => "WARDEN_STORAGE_IO",
            Self::IsolationUnavailable { .. } => "WARDEN_ISOLATION_UNAVAILABLE",
            Self::ProcessSpawnFailure { .. } => "WARDEN_PROCESS_SPAWN",
            Self::ToolOutputParse { .. } => "WARDEN_TOOL_OUTPUT_PARSE",
            Self::Config { .. } => "WARDEN_CONFIG",
            Self::Cancelled => "WARDEN_CANCELLED",
            Self::Internal { .. } => "WARDEN_INTERNAL",
        }
    }

    fn message(&self) -> &str {
        match self {
            Self::NotFound { id, .. } => id,
            Self::InvalidRule { message, .. } => message,
            Self::Conflict { message, .. } => message,
            Self::StorageIo { message, .. } => message,
            Self::IsolationUnavailable { message, .. } => message,
            Self::ProcessSpawnFailure { message, .. } => message,
            Self::ToolOutputParse { message, .. } => message,
            Self::Config { message, .. } => message,
            Self::Cancelled => "Operation was cancelled",
            Self::Internal { message } => message,
        }
    }

    fn context(&self) -> Option<&str> {
        match self {
            Self::NotFound { kind, .. } => Some(kind),
            Self::InvalidRule { rule, .. } => rule.as_deref(),
            Self::StorageIo { path, .. } => path.as_deref(),
            Self::ProcessSpawnFailure { program, .. } => program.as_deref(),
            Self::ToolOutputParse { input, .. } => input.as_deref(),
            Self::Config { context, .. } => context.as_deref(),
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageIo { .. } | Self::ProcessSpawnFailure { .. })
    }
}

impl WardenError {
    /// Process exit code used by the command-line front end
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound { .. } => 2,
            Self::InvalidRule { .. } | Self::Conflict { .. } => 3,
            Self::IsolationUnavailable { .. } => 4,
            Self::ProcessSpawnFailure { .. } => 5,
            Self::StorageIo { .. } => 6,
            Self::Config { .. } | Self::ToolOutputParse { .. } => 7,
            Self::Cancelled => 130,
            Self::Internal { .. } => 1,
        }
    }
}
