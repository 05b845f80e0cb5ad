//! Violation event type

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::sandbox::rules::{Decision, OperationClass};

/// An operation the OS refused inside a sandboxed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationEvent {
    pub run_id: u64,
    pub operation: OperationClass,
    /// Path or host involved, when the message names one
    pub target: Option<String>,
    pub decision: Decision,
    pub observed_at: DateTime<Utc>,
    /// The stderr line the event was read from
    pub raw: String,
}

impl fmt::Display for ViolationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run {}: {} {}", self.run_id, self.decision, self.operation)?;
        if let Some(target) = &self.target {
            write!(f, " {}", target)?;
        }
        Ok(())
    }
}
