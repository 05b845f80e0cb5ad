//! One registry row and its shared state

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::path::PathBuf;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use super::output::{OutputBuffer, ReadResult};
use super::types::{ProcessInfo, ProcessKind, ProcessStatus, RunId, StreamKind};
use crate::sandbox::Primitive;

#[derive(Debug)]
pub(crate) struct EntryState {
    pub status: ProcessStatus,
    pub output: OutputBuffer,
    /// Cursor of the registry-level drain
    pub drain_cursor: u64,
    /// Output was flushed to a subscriber after exit was confirmed
    pub drained: bool,
    pub cancel_requested: bool,
    pub violations: usize,
}

/// Static facts about a run plus its mutable state
#[derive(Debug)]
pub(crate) struct ProcessEntry {
    pub run_id: RunId,
    pub kind: ProcessKind,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
    pub working_dir: PathBuf,
    pub command: String,
    pub task: Option<String>,
    pub profile: String,
    pub backend: &'static str,
    pub degraded: Vec<Primitive>,
    pub state: Mutex<EntryState>,
    /// Woken on every append and on exit
    pub notify: Notify,
    pub cancel: CancellationToken,
}

pub(crate) struct EntryInit {
    pub run_id: RunId,
    pub kind: ProcessKind,
    pub pid: Option<u32>,
    pub working_dir: PathBuf,
    pub command: String,
    pub task: Option<String>,
    pub profile: String,
    pub backend: &'static str,
    pub degraded: Vec<Primitive>,
    pub buffer_bytes: usize,
}

impl ProcessEntry {
    pub fn new(init: EntryInit) -> Self {
        Self {
            run_id: init.run_id,
            kind: init.kind,
            pid: init.pid,
            started_at: Utc::now(),
            working_dir: init.working_dir,
            command: init.command,
            task: init.task,
            profile: init.profile,
            backend: init.backend,
            degraded: init.degraded,
            state: Mutex::new(EntryState {
                status: ProcessStatus::Running,
                output: OutputBuffer::new(init.buffer_bytes),
                drain_cursor: 0,
                drained: false,
                cancel_requested: false,
                violations: 0,
            }),
            notify: Notify::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Buffer output; refused once exit is published, since `Exited` closes the stream
    pub fn append(&self, stream: StreamKind, data: &[u8]) -> bool {
        {
            let mut state = self.state.lock();
            if state.status.is_exited() {
                tracing::debug!(
                    "Discarding {} bytes written to run {} after exit",
                    data.len(),
                    self.run_id
                );
                return false;
            }
            state.output.append(stream, data);
        }
        self.notify.notify_waiters();
        true
    }

    /// Mark the run as cancelling and fire its token; an exited status is kept
    pub fn request_cancel(&self) {
        {
            let mut state = self.state.lock();
            state.cancel_requested = true;
            if state.status == ProcessStatus::Running {
                state.status = ProcessStatus::Cancelling;
            }
        }
        self.cancel.cancel();
        self.notify.notify_waiters();
    }

    pub fn finish(&self, status: ProcessStatus) {
        self.state.lock().status = status;
        self.notify.notify_waiters();
    }

    pub fn status(&self) -> ProcessStatus {
        self.state.lock().status.clone()
    }

    /// Resolve once the OS has confirmed exit
    pub async fn wait_exit(&self) -> ProcessStatus {
        loop {
            let notified = self.notify.notified();
            {
                let status = self.status();
                if status.is_exited() {
                    return status;
                }
            }
            notified.await;
        }
    }

    /// Output past the drain cursor; counts as the drain flush if the run has exited
    pub fn drain(&self) -> (ProcessStatus, ReadResult) {
        let mut state = self.state.lock();
        let read = state.output.read_from(state.drain_cursor);
        state.drain_cursor = read.next_cursor;
        if state.status.is_exited() {
            state.drained = true;
        }
        (state.status.clone(), read)
    }

    pub fn is_finished(&self) -> bool {
        let state = self.state.lock();
        state.drained && state.status.is_exited()
    }

    pub fn render(&self) -> String {
        self.state.lock().output.render()
    }

    pub fn info(&self) -> ProcessInfo {
        let state = self.state.lock();
        ProcessInfo {
            run_id: self.run_id,
            kind: self.kind.clone(),
            pid: self.pid,
            started_at: self.started_at,
            working_dir: self.working_dir.clone(),
            command: self.command.clone(),
            task: self.task.clone(),
            status: state.status.clone(),
            cancel_requested: state.cancel_requested,
            retained_bytes: state.output.retained_bytes(),
            dropped_bytes: state.output.dropped_bytes(),
            profile: self.profile.clone(),
            backend: self.backend.to_string(),
            degraded: self.degraded.clone(),
            violations: state.violations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::types::OutputEvent;
    use tokio_test::{assert_pending, assert_ready_eq, task};

    fn entry() -> ProcessEntry {
        ProcessEntry::new(EntryInit {
            run_id: RunId(1),
            kind: ProcessKind::Tool {
                name: "bash".into(),
            },
            pid: None,
            working_dir: PathBuf::from("/work"),
            command: "sh -c true".into(),
            task: None,
            profile: "minimal".into(),
            backend: "none",
            degraded: Vec::new(),
            buffer_bytes: 64,
        })
    }

    fn exited(code: i32) -> ProcessStatus {
        ProcessStatus::Exited {
            code: Some(code),
            signal: None,
        }
    }

    #[test]
    fn test_append_after_exit_is_refused() {
        let entry = entry();
        assert!(entry.append(StreamKind::Stdout, b"before"));
        entry.finish(exited(0));
        assert!(!entry.append(StreamKind::Stdout, b"late"));

        let (_, read) = entry.drain();
        let events = read.into_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], OutputEvent::Chunk(c) if c.data == b"before"));
    }

    #[test]
    fn test_wait_exit_wakes_on_finish() {
        let entry = entry();
        let mut wait = task::spawn(entry.wait_exit());
        assert_pending!(wait.poll());

        entry.append(StreamKind::Stdout, b"noise");
        assert!(wait.is_woken());
        assert_pending!(wait.poll());

        entry.finish(exited(0));
        assert!(wait.is_woken());
        assert_ready_eq!(wait.poll(), exited(0));
    }

    #[test]
    fn test_cancel_marks_cancelling() {
        let entry = entry();
        entry.request_cancel();
        let info = entry.info();
        assert_eq!(info.status, ProcessStatus::Cancelling);
        assert!(info.cancel_requested);
        assert!(entry.cancel.is_cancelled());

        // An exited status is never overwritten
        entry.finish(exited(1));
        entry.request_cancel();
        assert_eq!(entry.status(), exited(1));
    }

    #[test]
    fn test_drain_counts_only_after_exit() {
        let entry = entry();
        entry.append(StreamKind::Stdout, b"early");
        let (status, read) = entry.drain();
        assert_eq!(status, ProcessStatus::Running);
        assert_eq!(read.next_cursor, 5);
        assert!(!entry.is_finished());

        entry.append(StreamKind::Stderr, b"late");
        entry.finish(exited(0));
        assert!(!entry.is_finished());

        let (_, read) = entry.drain();
        assert_eq!(read.chunks.len(), 1);
        assert_eq!(read.chunks[0].data, b"late");
        assert!(entry.is_finished());
    }
}
