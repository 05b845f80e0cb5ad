//! Process registry types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::WardenError;
use crate::sandbox::{CommandSpec, LaunchOptions, Primitive, SandboxProfile};

/// Process-wide, monotonically increasing run identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunId {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(RunId)
            .map_err(|_| WardenError::not_found("run", s))
    }
}

/// What a supervised process is doing for the agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProcessKind {
    AgentRun { agent_name: String },
    Tool { name: String },
}

impl fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessKind::AgentRun { agent_name } => write!(f, "agent:{}", agent_name),
            ProcessKind::Tool { name } => write!(f, "tool:{}", name),
        }
    }
}

/// Which pipe a chunk came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Lifecycle state of a supervised process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProcessStatus {
    Running,
    /// Termination requested; the OS has not confirmed exit yet
    Cancelling,
    Exited {
        code: Option<i32>,
        signal: Option<i32>,
    },
}

impl ProcessStatus {
    pub fn is_exited(&self) -> bool {
        matches!(self, ProcessStatus::Exited { .. })
    }

    pub fn success(&self) -> bool {
        matches!(self, ProcessStatus::Exited { code: Some(0), .. })
    }

    pub(crate) fn from_exit(status: &std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;
        ProcessStatus::Exited {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessStatus::Running => write!(f, "running"),
            ProcessStatus::Cancelling => write!(f, "cancelling"),
            ProcessStatus::Exited {
                code: Some(code), ..
            } => write!(f, "exited ({})", code),
            ProcessStatus::Exited {
                signal: Some(signal),
                ..
            } => write!(f, "killed by signal {}", signal),
            ProcessStatus::Exited { .. } => write!(f, "exited"),
        }
    }
}

/// A piece of combined output at a byte offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    /// Position of the first byte in the combined output of the run
    pub offset: u64,
    pub stream: StreamKind,
    pub data: Vec<u8>,
}

impl OutputChunk {
    pub fn end(&self) -> u64 {
        self.offset + self.data.len() as u64
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// What a subscriber receives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    Chunk(OutputChunk),
    /// Bytes evicted before this subscriber read them
    Gap { lost_bytes: u64 },
    /// Final event; every byte written before exit was delivered before it
    Exited(ProcessStatus),
}

/// Request to start a supervised process
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub kind: ProcessKind,
    pub command: CommandSpec,
    pub profile: SandboxProfile,
    pub task: Option<String>,
    pub options: LaunchOptions,
}

impl SpawnSpec {
    pub fn new(kind: ProcessKind, command: CommandSpec, profile: SandboxProfile) -> Self {
        Self {
            kind,
            command,
            profile,
            task: None,
            options: LaunchOptions::default(),
        }
    }

    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    pub fn with_options(mut self, options: LaunchOptions) -> Self {
        self.options = options;
        self
    }
}

/// Read-only snapshot of a registry row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub run_id: RunId,
    pub kind: ProcessKind,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
    pub working_dir: PathBuf,
    pub command: String,
    pub task: Option<String>,
    pub status: ProcessStatus,
    pub cancel_requested: bool,
    pub retained_bytes: usize,
    pub dropped_bytes: u64,
    pub profile: String,
    pub backend: String,
    pub degraded: Vec<Primitive>,
    pub violations: usize,
}

/// Output handed over by a drain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drained {
    pub status: ProcessStatus,
    pub events: Vec<OutputEvent>,
}

impl Drained {
    /// Delivered chunks as text, with gaps marked
    pub fn text(&self) -> String {
        render_events(&self.events)
    }
}

/// Result of a completed cancellation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelOutcome {
    pub run_id: RunId,
    pub status: ProcessStatus,
    /// Output not delivered before the cancel
    pub remaining: Vec<OutputEvent>,
}

pub(crate) fn render_events(events: &[OutputEvent]) -> String {
    let mut out = String::new();
    for event in events {
        match event {
            OutputEvent::Chunk(chunk) => out.push_str(&String::from_utf8_lossy(&chunk.data)),
            OutputEvent::Gap { lost_bytes } => {
                out.push_str(&format!("[... {} bytes dropped ...]\n", lost_bytes))
            }
            OutputEvent::Exited(_) => {}
        }
    }
    out
}
