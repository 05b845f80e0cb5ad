//! From trait implementations for WardenError conversions

use super::types::WardenError;

impl From<std::io::Error> for WardenError {
    fn from(error: std::io::Error) -> Self {
        Self::storage(error.to_string())
    }
}

impl From<serde_json::Error> for WardenError {
    fn from(error: serde_json::Error) -> Self {
        Self::storage(format!("JSON serialization failed: {}", error))
    }
}

impl From<toml::de::Error> for WardenError {
    fn from(error: toml::de::Error) -> Self {
        Self::config(format!("Failed to parse TOML: {}", error))
    }
}

impl From<tokio::task::JoinError> for WardenError {
    fn from(error: tokio::task::JoinError) -> Self {
        if error.is_cancelled() {
            Self::Cancelled
        } else {
            Self::internal(format!("Background task panicked: {}", error))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::path::Path;

    #[test]
    fn test_io_error_maps_to_storage() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: WardenError = io.into();
        assert_eq!(err.error_code(), "WARDEN_STORAGE_IO");
    }

    #[test]
    fn test_storage_io_carries_path() {
        let err = WardenError::storage_io("write failed", Path::new("/tmp/blob"));
        assert_eq!(err.context(), Some("/tmp/blob"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_spawn_failure_with_run_id() {
        let err = WardenError::spawn_failure("no such file", "missing-bin").with_run_id(7);
        match err {
            WardenError::ProcessSpawnFailure {
                run_id, program, ..
            } => {
                assert_eq!(run_id, Some(7));
                assert_eq!(program.as_deref(), Some("missing-bin"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_not_found_display() {
        let err = WardenError::not_found("checkpoint", "abc");
        assert_eq!(err.to_string(), "checkpoint not found: abc");
        assert_eq!(err.exit_code(), 2);
    }
}
