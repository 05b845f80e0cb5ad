//! Process-wide registry of supervised child processes

use dashmap::DashMap;
use std::process::ExitStatus;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::task::JoinHandle;

use crate::error::{WardenError, WardenResult};
use crate::sandbox::violations::{SharedViolationStore, ViolationDetector, ViolationStore};
use crate::sandbox::{LaunchedProcess, SandboxExecutor, SandboxProfile};

use super::entry::{EntryInit, ProcessEntry};
use super::stream::OutputStream;
use super::types::{
    CancelOutcome, Drained, ProcessInfo, ProcessStatus, RunId, SpawnSpec, StreamKind,
};

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// How long to wait for pipes to close after the child itself exited
///
/// A grandchild that inherited the pipes can hold them open indefinitely.
const PIPE_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

static NEXT_RUN_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) type EntryMap = Arc<DashMap<RunId, Arc<ProcessEntry>>>;

/// Registry tuning
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub output_buffer_bytes: usize,
    pub cancel_grace_period: Duration,
    /// Cancel a run once it has caused this many violations
    pub auto_kill_after: Option<usize>,
    pub violation_capacity: usize,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            output_buffer_bytes: 1024 * 1024,
            cancel_grace_period: Duration::from_secs(5),
            auto_kill_after: None,
            violation_capacity: 1000,
        }
    }
}

/// Supervises every spawned agent and tool process
///
/// Rows live in a sharded map, so status queries never wait on unrelated runs.
/// A row is removed only once the OS confirmed exit and its output was flushed
/// to a subscriber at least once.
pub struct ProcessRegistry {
    executor: Arc<SandboxExecutor>,
    entries: EntryMap,
    settings: RegistrySettings,
    violations: SharedViolationStore,
    detector: ViolationDetector,
}

impl ProcessRegistry {
    pub fn new(executor: Arc<SandboxExecutor>, settings: RegistrySettings) -> Self {
        let violations = ViolationStore::shared(settings.violation_capacity);
        Self {
            executor,
            entries: Arc::new(DashMap::new()),
            settings,
            violations,
            detector: ViolationDetector::new(),
        }
    }

    pub fn executor(&self) -> &SandboxExecutor {
        &self.executor
    }

    pub fn violations(&self) -> &SharedViolationStore {
        &self.violations
    }

    /// Launch a process under its profile and start supervising it
    pub fn spawn(&self, spec: SpawnSpec) -> WardenResult<RunId> {
        let run_id = RunId(NEXT_RUN_ID.fetch_add(1, Ordering::SeqCst));
        let LaunchedProcess {
            mut child,
            backend,
            degraded,
        } = self
            .executor
            .launch(&spec.command, &spec.profile, spec.options)
            .map_err(|e| e.with_run_id(run_id.0))?;

        let entry = Arc::new(ProcessEntry::new(EntryInit {
            run_id,
            kind: spec.kind,
            pid: child.id(),
            working_dir: spec.command.cwd.clone(),
            command: spec.command.display(),
            task: spec.task,
            profile: spec.profile.name().to_string(),
            backend,
            degraded,
            buffer_bytes: self.settings.output_buffer_bytes,
        }));
        self.entries.insert(run_id, entry.clone());

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(read_pipe(
                stdout,
                StreamKind::Stdout,
                entry.clone(),
                None,
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            let hook = ViolationHook {
                store: self.violations.clone(),
                detector: self.detector,
                profile: spec.profile,
                auto_kill_after: self.settings.auto_kill_after,
            };
            readers.push(tokio::spawn(read_pipe(
                stderr,
                StreamKind::Stderr,
                entry.clone(),
                Some(hook),
            )));
        }

        tracing::info!(
            "Spawned run {} ({}) pid {:?}: {}",
            run_id,
            entry.kind,
            entry.pid,
            entry.command
        );
        tokio::spawn(monitor(
            entry,
            child,
            readers,
            self.settings.cancel_grace_period,
        ));
        Ok(run_id)
    }

    fn entry(&self, run_id: RunId) -> WardenResult<Arc<ProcessEntry>> {
        self.entries
            .get(&run_id)
            .map(|e| e.clone())
            .ok_or_else(|| WardenError::not_found("run", run_id.to_string()))
    }

    /// Add output to a run's buffer
    pub fn append_output(&self, run_id: RunId, stream: StreamKind, data: &[u8]) -> WardenResult<()> {
        if self.entry(run_id)?.append(stream, data) {
            Ok(())
        } else {
            Err(WardenError::conflict(format!(
                "Run {} has already exited",
                run_id
            )))
        }
    }

    pub fn get(&self, run_id: RunId) -> WardenResult<ProcessInfo> {
        Ok(self.entry(run_id)?.info())
    }

    /// Snapshots of every row, ordered by run id
    pub fn list(&self) -> Vec<ProcessInfo> {
        let mut rows: Vec<ProcessInfo> = self.entries.iter().map(|e| e.value().info()).collect();
        rows.sort_by_key(|info| info.run_id);
        rows
    }

    /// Rows whose process has not exited yet
    pub fn list_running(&self) -> Vec<ProcessInfo> {
        self.list()
            .into_iter()
            .filter(|info| !info.status.is_exited())
            .collect()
    }

    /// Retained output as text with a marker for dropped bytes
    pub fn live_output(&self, run_id: RunId) -> WardenResult<String> {
        Ok(self.entry(run_id)?.render())
    }

    /// Hand over everything not yet drained; an exited run is removed afterwards
    pub fn drain(&self, run_id: RunId) -> WardenResult<Drained> {
        let entry = self.entry(run_id)?;
        let (status, read) = entry.drain();
        self.reap(&entry);
        Ok(Drained {
            status,
            events: read.into_events(),
        })
    }

    /// Wait for a run to exit without draining it
    pub async fn wait(&self, run_id: RunId) -> WardenResult<ProcessStatus> {
        let entry = self.entry(run_id)?;
        Ok(entry.wait_exit().await)
    }

    /// Terminate a run: SIGTERM, then a forced kill after the grace period
    ///
    /// The row shows `cancelling` immediately. Resolves once the OS confirmed exit,
    /// returning the undrained output tail; the row is then removed.
    pub async fn cancel(&self, run_id: RunId) -> WardenResult<CancelOutcome> {
        let entry = self.entry(run_id)?;
        if !entry.status().is_exited() {
            tracing::info!("Cancelling run {}", run_id);
        }
        entry.request_cancel();

        let status = entry.wait_exit().await;
        let (_, read) = entry.drain();
        self.reap(&entry);

        tracing::info!("Run {} cancelled: {}", run_id, status);
        Ok(CancelOutcome {
            run_id,
            status,
            remaining: read.into_events(),
        })
    }

    /// Subscribe to a run's output from the oldest retained byte
    pub fn stream_output(&self, run_id: RunId) -> WardenResult<OutputStream> {
        let entry = self.entry(run_id)?;
        Ok(OutputStream::new(entry, self.entries.clone()))
    }

    /// Remove every row that has exited and been drained
    pub fn cleanup_finished(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_finished());
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!("Removed {} finished runs", removed);
        }
        removed
    }

    fn reap(&self, entry: &ProcessEntry) {
        reap(&self.entries, entry);
    }
}

pub(crate) fn reap(entries: &EntryMap, entry: &ProcessEntry) {
    if entry.is_finished() && entries.remove(&entry.run_id).is_some() {
        tracing::debug!("Run {} removed from registry", entry.run_id);
    }
}

#[derive(Clone)]
struct ViolationHook {
    store: SharedViolationStore,
    detector: ViolationDetector,
    profile: SandboxProfile,
    auto_kill_after: Option<usize>,
}

impl ViolationHook {
    fn inspect(&self, entry: &ProcessEntry, line: &str) {
        let Some(event) = self.detector.detect_for(entry.run_id.0, line, &self.profile) else {
            return;
        };
        tracing::warn!("Sandbox violation: {}", event);
        let count = self.store.record(event);
        entry.state.lock().violations = count;

        if self.auto_kill_after.is_some_and(|limit| count >= limit) && !entry.cancel.is_cancelled()
        {
            tracing::warn!(
                "Run {} reached {} violations, cancelling it",
                entry.run_id,
                count
            );
            entry.request_cancel();
        }
    }
}

async fn read_pipe<R>(
    mut pipe: R,
    stream: StreamKind,
    entry: Arc<ProcessEntry>,
    hook: Option<ViolationHook>,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK_BYTES];
    let mut partial_line: Vec<u8> = Vec::new();
    loop {
        match pipe.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if !entry.append(stream, &buf[..n]) {
                    break;
                }
                if let Some(hook) = &hook {
                    partial_line.extend_from_slice(&buf[..n]);
                    while let Some(pos) = partial_line.iter().position(|b| *b == b'\n') {
                        let line: Vec<u8> = partial_line.drain(..=pos).collect();
                        hook.inspect(&entry, &String::from_utf8_lossy(&line));
                    }
                }
            }
            Err(e) => {
                tracing::debug!("Reading {:?} of run {} failed: {}", stream, entry.run_id, e);
                break;
            }
        }
    }
    if let Some(hook) = &hook {
        if !partial_line.is_empty() {
            hook.inspect(&entry, &String::from_utf8_lossy(&partial_line));
        }
    }
}

async fn monitor(
    entry: Arc<ProcessEntry>,
    mut child: Child,
    readers: Vec<JoinHandle<()>>,
    grace: Duration,
) {
    let result = tokio::select! {
        result = child.wait() => result,
        _ = entry.cancel.cancelled() => terminate(&mut child, entry.run_id, grace).await,
    };

    // Publish exit only after the pipes are drained into the buffer
    let aborts: Vec<_> = readers.iter().map(|reader| reader.abort_handle()).collect();
    let readers = futures::future::join_all(readers);
    if tokio::time::timeout(PIPE_CLOSE_TIMEOUT, readers).await.is_err() {
        for abort in &aborts {
            abort.abort();
        }
        tracing::warn!(
            "Output pipes of run {} still open {:?} after exit; later output is discarded",
            entry.run_id,
            PIPE_CLOSE_TIMEOUT
        );
    }

    let status = match result {
        Ok(status) => ProcessStatus::from_exit(&status),
        Err(e) => {
            tracing::error!("Waiting for run {} failed: {}", entry.run_id, e);
            ProcessStatus::Exited {
                code: None,
                signal: None,
            }
        }
    };
    tracing::info!("Run {} {}", entry.run_id, status);
    entry.finish(status);
}

async fn terminate(
    child: &mut Child,
    run_id: RunId,
    grace: Duration,
) -> std::io::Result<ExitStatus> {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        // The launcher leads its own process group
        if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            tracing::debug!("SIGTERM to run {} failed: {}", run_id, e);
        }
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(result) => return result,
            Err(_) => {
                tracing::warn!(
                    "Run {} ignored SIGTERM for {:?}, killing it",
                    run_id,
                    grace
                );
                let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
            }
        }
    }

    if let Err(e) = child.start_kill() {
        tracing::debug!("Kill of run {} failed: {}", run_id, e);
    }
    child.wait().await
}
