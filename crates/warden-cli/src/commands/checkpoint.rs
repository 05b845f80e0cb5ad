//! Checkpoint commands

use chrono::Local;
use colored::*;
use warden_core::checkpoints::{ChangeKind, CheckpointId, SessionId, TimelineEntry};
use warden_core::error::{WardenError, WardenResult};
use warden_core::Warden;

use crate::args::CheckpointAction;
use crate::console::CliConsole;

pub async fn run(warden: &Warden, action: CheckpointAction, console: &CliConsole) -> WardenResult<()> {
    match action {
        CheckpointAction::Session => {
            let session = warden.create_session().await?;
            if console.json() {
                return console.print_json(&serde_json::json!({ "session_id": session }));
            }
            console.success(&format!("Created session {}", session));
        }
        CheckpointAction::Sessions => {
            let sessions = warden.sessions().await?;
            if console.json() {
                return console.print_json(&sessions);
            }
            for session in sessions {
                console.line(session.as_str());
            }
        }
        CheckpointAction::Create { session, label } => {
            let session = SessionId::from_string(session);
            let id = warden.create_checkpoint(&session, label).await?;
            if console.json() {
                return console.print_json(&serde_json::json!({ "checkpoint_id": id }));
            }
            console.success(&format!("Created checkpoint {}", id));
        }
        CheckpointAction::Restore {
            session,
            checkpoint,
            dry_run,
        } => {
            let session = SessionId::from_string(session);
            let id = resolve(warden, &session, &checkpoint).await?;
            let outcome = if dry_run {
                warden.preview_restore(&session, &id).await?
            } else {
                warden.restore_checkpoint(&session, &id).await?
            };
            if console.json() {
                return console.print_json(&outcome);
            }

            let verb = if dry_run { "Would restore" } else { "Restored" };
            console.success(&format!(
                "{} {}: {} written, {} deleted, {} unchanged",
                verb,
                id.short(),
                outcome.restored.len(),
                outcome.deleted.len(),
                outcome.unchanged
            ));
            for path in &outcome.restored {
                console.line(&format!("  {} {}", "M".yellow(), path));
            }
            for path in &outcome.deleted {
                console.line(&format!("  {} {}", "D".red(), path));
            }
        }
        CheckpointAction::Fork {
            session,
            checkpoint,
        } => {
            let session = SessionId::from_string(session);
            let id = resolve(warden, &session, &checkpoint).await?;
            let forked = warden.fork_session(&session, &id).await?;
            if console.json() {
                return console.print_json(&serde_json::json!({ "session_id": forked }));
            }
            console.success(&format!("Forked into session {}", forked));
        }
        CheckpointAction::List { session } => {
            let session = SessionId::from_string(session);
            let entries = warden.list_checkpoints(&session).await?;
            if console.json() {
                return console.print_json(&entries);
            }
            print_tree(&entries, console);
        }
        CheckpointAction::Diff {
            session,
            from,
            to,
            patch,
        } => {
            let session = SessionId::from_string(session);
            let from = resolve(warden, &session, &from).await?;
            let to = resolve(warden, &session, &to).await?;
            let diffs = warden.diff_checkpoints(&session, &from, &to).await?;
            if console.json() {
                return console.print_json(&diffs);
            }
            if diffs.is_empty() {
                console.line("No changes");
            }
            for diff in &diffs {
                let marker = match diff.change {
                    ChangeKind::Added => "A".green(),
                    ChangeKind::Modified => "M".yellow(),
                    ChangeKind::Deleted => "D".red(),
                };
                console.line(&format!("{} {}", marker, diff.path));
                if patch {
                    match &diff.unified {
                        Some(unified) => console.line(unified),
                        None => console.line(&"  (binary)".dimmed().to_string()),
                    }
                }
            }
        }
        CheckpointAction::Prune {
            session,
            checkpoint,
        } => {
            let session = SessionId::from_string(session);
            let id = resolve(warden, &session, &checkpoint).await?;
            let removed = warden.prune_branch(&session, &id).await?;
            if console.json() {
                return console.print_json(&serde_json::json!({ "removed": removed }));
            }
            console.success(&format!("Pruned {} checkpoints", removed));
        }
        CheckpointAction::Gc => {
            let report = warden.collect_garbage().await?;
            if console.json() {
                return console.print_json(&report);
            }
            console.success(&format!(
                "Scanned {} sessions: {} live blobs, {} removed",
                report.sessions_scanned, report.live_blobs, report.removed_blobs
            ));
        }
    }
    Ok(())
}

/// Accept a full checkpoint id or a unique prefix of one
async fn resolve(warden: &Warden, session: &SessionId, raw: &str) -> WardenResult<CheckpointId> {
    let entries = warden.list_checkpoints(session).await?;
    if let Some(entry) = entries.iter().find(|e| e.checkpoint.id.as_str() == raw) {
        return Ok(entry.checkpoint.id.clone());
    }

    let matches: Vec<&CheckpointId> = entries
        .iter()
        .map(|e| &e.checkpoint.id)
        .filter(|id| !raw.is_empty() && id.as_str().starts_with(raw))
        .collect();
    match matches.as_slice() {
        [id] => Ok((*id).clone()),
        [] => Err(WardenError::not_found("checkpoint", raw)),
        many => Err(WardenError::conflict_with_details(
            format!("Checkpoint prefix '{}' is ambiguous", raw),
            many.iter().map(|id| id.to_string()).collect(),
        )),
    }
}

fn print_tree(entries: &[TimelineEntry], console: &CliConsole) {
    if entries.is_empty() {
        console.line("No checkpoints yet");
        return;
    }
    for entry in entries {
        let summary = &entry.checkpoint;
        let head = if entry.is_head {
            " (head)".cyan().bold().to_string()
        } else {
            String::new()
        };
        let label = summary.label.as_deref().unwrap_or("");
        console.line(&format!(
            "{}{} {} {} {} files{} {}",
            "  ".repeat(entry.depth),
            "●".dimmed(),
            summary.id.short().yellow(),
            summary
                .created_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S"),
            summary.file_count,
            head,
            label
        ));
    }
}
