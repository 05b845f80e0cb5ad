//! On-disk timeline index and message log

use crate::error::{WardenError, WardenResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::super::types::SessionId;
use super::tree::SessionTimeline;

const TIMELINE_FILE: &str = "timeline.json";
const MESSAGES_FILE: &str = "messages.jsonl";

/// Persists session timelines
///
/// Layout:
/// ```text
/// sessions_dir/
///   {session_id}/
///     timeline.json     checkpoint tree and head pointer
///     messages.jsonl    running message log, one JSON string per line
/// ```
///
/// A store without a directory keeps nothing, which suits in-memory sessions.
#[derive(Debug, Clone, Default)]
pub struct TimelineStore {
    sessions_dir: Option<PathBuf>,
}

impl TimelineStore {
    pub fn new(sessions_dir: impl Into<PathBuf>) -> Self {
        Self {
            sessions_dir: Some(sessions_dir.into()),
        }
    }

    pub fn memory() -> Self {
        Self { sessions_dir: None }
    }

    pub fn is_persistent(&self) -> bool {
        self.sessions_dir.is_some()
    }

    fn session_dir(&self, session: &SessionId) -> WardenResult<Option<PathBuf>> {
        if !session.is_valid() {
            return Err(WardenError::not_found("session", session.as_str()));
        }
        Ok(self.sessions_dir.as_ref().map(|d| d.join(session.as_str())))
    }

    /// Load a persisted timeline, `None` if the session was never saved
    pub async fn load(&self, session: &SessionId) -> WardenResult<Option<SessionTimeline>> {
        let Some(dir) = self.session_dir(session)? else {
            return Ok(None);
        };
        let path = dir.join(TIMELINE_FILE);
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(WardenError::storage_io(
                    format!("Failed to read timeline: {}", e),
                    &path,
                ));
            }
        };
        let timeline: SessionTimeline = serde_json::from_slice(&raw).map_err(|e| {
            WardenError::storage_io(format!("Corrupt timeline index: {}", e), &path)
        })?;
        timeline.validate().map_err(|reason| {
            WardenError::storage_io(format!("Corrupt timeline index: {}", reason), &path)
        })?;
        Ok(Some(timeline))
    }

    /// Replace the persisted timeline atomically
    pub async fn save(&self, timeline: &SessionTimeline) -> WardenResult<()> {
        let Some(dir) = self.session_dir(&timeline.session_id)? else {
            return Ok(());
        };
        let data = serde_json::to_vec_pretty(timeline)?;
        write_atomic(&dir, TIMELINE_FILE, &data).await
    }

    /// Load the running message log
    pub async fn load_messages(&self, session: &SessionId) -> WardenResult<Vec<String>> {
        let Some(dir) = self.session_dir(session)? else {
            return Ok(Vec::new());
        };
        let path = dir.join(MESSAGES_FILE);
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(WardenError::storage_io(
                    format!("Failed to read message log: {}", e),
                    &path,
                ));
            }
        };
        raw.lines()
            .filter(|line| !line.is_empty())
            .map(|line| {
                serde_json::from_str::<String>(line).map_err(|e| {
                    WardenError::storage_io(format!("Corrupt message log: {}", e), &path)
                })
            })
            .collect()
    }

    /// Append one message to the log
    pub async fn append_message(&self, session: &SessionId, message: &str) -> WardenResult<()> {
        let Some(dir) = self.session_dir(session)? else {
            return Ok(());
        };
        create_dir(&dir).await?;
        let path = dir.join(MESSAGES_FILE);
        let mut line = serde_json::to_string(message)?;
        line.push('\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| {
                WardenError::storage_io(format!("Failed to open message log: {}", e), &path)
            })?;
        file.write_all(line.as_bytes()).await.map_err(|e| {
            WardenError::storage_io(format!("Failed to append message: {}", e), &path)
        })?;
        file.flush().await.map_err(|e| {
            WardenError::storage_io(format!("Failed to flush message log: {}", e), &path)
        })
    }

    /// Replace the whole message log atomically
    pub async fn write_messages(&self, session: &SessionId, messages: &[String]) -> WardenResult<()> {
        let Some(dir) = self.session_dir(session)? else {
            return Ok(());
        };
        let mut data = String::new();
        for message in messages {
            data.push_str(&serde_json::to_string(message)?);
            data.push('\n');
        }
        write_atomic(&dir, MESSAGES_FILE, data.as_bytes()).await
    }

    /// Every session with a persisted timeline
    pub async fn list_sessions(&self) -> WardenResult<Vec<SessionId>> {
        let Some(root) = &self.sessions_dir else {
            return Ok(Vec::new());
        };
        let mut entries = match fs::read_dir(root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(WardenError::storage_io(
                    format!("Failed to list sessions: {}", e),
                    root,
                ));
            }
        };

        let mut sessions = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            WardenError::storage_io(format!("Failed to list sessions: {}", e), root)
        })? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let session = SessionId::from_string(name);
            if session.is_valid() && entry.path().join(TIMELINE_FILE).exists() {
                sessions.push(session);
            }
        }
        sessions.sort();
        Ok(sessions)
    }
}

async fn create_dir(dir: &Path) -> WardenResult<()> {
    fs::create_dir_all(dir).await.map_err(|e| {
        WardenError::storage_io(format!("Failed to create session directory: {}", e), dir)
    })
}

async fn write_atomic(dir: &Path, name: &str, data: &[u8]) -> WardenResult<()> {
    create_dir(dir).await?;
    let target = dir.join(name);
    let tmp = dir.join(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4()));

    if let Err(e) = fs::write(&tmp, data).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(WardenError::storage_io(
            format!("Failed to write {}: {}", name, e),
            &tmp,
        ));
    }
    fs::rename(&tmp, &target).await.map_err(|e| {
        WardenError::storage_io(format!("Failed to commit {}: {}", name, e), &target)
    })
}
