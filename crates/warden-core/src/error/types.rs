//! Core error types and traits for Warden

use thiserror::Error;

/// Result type alias for Warden operations
pub type WardenResult<T> = Result<T, WardenError>;

/// Stable, machine-readable error identification shared by every Warden error.
///
/// The CLI maps `error_code()` into JSON error bodies and process exit codes, so
/// codes never change once published.
pub trait ErrorCode: std::error::Error + Send + Sync {
    /// Unique code for programmatic handling
    fn error_code(&self) -> &str;

    /// Human-readable error message
    fn message(&self) -> &str;

    /// Optional structured context (path, run id, offending rule, ...)
    fn context(&self) -> Option<&str> {
        None
    }

    /// Whether retrying the same operation could succeed
    fn is_retryable(&self) -> bool {
        false
    }
}

/// Main error type for Warden
///
/// Each variant corresponds to one failure class of the checkpoint, sandbox and
/// process subsystems and carries the structured context needed to surface it
/// without re-parsing the message.
#[derive(Error, Debug, Clone)]
pub enum WardenError {
    /// A checkpoint, session, blob, profile or run does not exist
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    /// A sandbox rule could not be compiled
    #[error("Invalid sandbox rule: {message}")]
    InvalidRule {
        message: String,
        rule: Option<String>,
    },

    /// Contradictory rules, or an operation that would break timeline structure
    #[error("Conflict: {message}")]
    Conflict {
        message: String,
        details: Vec<String>,
    },

    /// Persistence failure in the checkpoint store
    #[error("Storage I/O error: {message}")]
    StorageIo {
        message: String,
        path: Option<String>,
    },

    /// The host cannot enforce the isolation a profile requires
    #[error("Isolation unavailable: {message}")]
    IsolationUnavailable {
        message: String,
        missing: Vec<String>,
    },

    /// A supervised process failed to start
    #[error("Failed to spawn process: {message}")]
    ProcessSpawnFailure {
        message: String,
        run_id: Option<u64>,
        program: Option<String>,
    },

    /// Output of an external tool or a textual request could not be parsed
    #[error("Failed to parse tool output: {message}")]
    ToolOutputParse {
        message: String,
        input: Option<String>,
    },

    /// Configuration related errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        context: Option<String>,
    },

    /// The operation was cancelled before completion
    #[error("Operation was cancelled")]
    Cancelled,

    /// Anything that does not fit the categories above
    #[error("Internal error: {message}")]
    Internal { message: String },
}
