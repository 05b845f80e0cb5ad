//! Run a command under a sandbox profile

use colored::*;
use std::io::Write;
use std::path::Path;
use warden_core::error::{WardenError, WardenResult};
use warden_core::process::{OutputEvent, ProcessKind, ProcessStatus, StreamKind};
use warden_core::sandbox::CommandSpec;
use warden_core::{RunRequest, Warden};

use crate::args::RunArgs;
use crate::console::CliConsole;

/// Spawn, stream output until exit, and return the child's exit code
///
/// The first interrupt cancels the run; output keeps streaming until the process
/// is confirmed gone.
pub async fn execute(warden: &Warden, args: RunArgs, console: &CliConsole) -> WardenResult<i32> {
    let command = build_command(warden.project_root(), &args)?;
    let kind = match &args.agent {
        Some(agent_name) => ProcessKind::AgentRun {
            agent_name: agent_name.clone(),
        },
        None => ProcessKind::Tool {
            name: tool_name(&command),
        },
    };

    let mut request = RunRequest::new(kind, command, args.profile.as_str());
    if args.best_effort {
        request = request.with_best_effort(true);
    }
    if let Some(task) = args.task {
        request = request.with_task(task);
    }

    let run_id = warden.spawn(request)?;
    let info = warden.get_run(run_id)?;
    if !info.degraded.is_empty() {
        let degraded: Vec<String> = info.degraded.iter().map(|p| p.to_string()).collect();
        console.warn(&format!(
            "Running with degraded isolation ({}) under backend {}",
            degraded.join(", "),
            info.backend
        ));
    }
    console.info(&format!("Run {} started (pid {:?})", run_id, info.pid));

    let mut stream = warden.stream_output(run_id)?;
    let interrupt = interrupted();
    tokio::pin!(interrupt);
    let mut cancelling = false;
    let mut status = None;

    loop {
        tokio::select! {
            event = stream.next() => match event {
                Some(event) => {
                    if let OutputEvent::Exited(exit) = &event {
                        status = Some(exit.clone());
                    }
                    emit(&event, console)?;
                }
                None => break,
            },
            _ = &mut interrupt, if !cancelling => {
                cancelling = true;
                console.warn(&format!("Cancelling run {}", run_id));
                let registry = warden.registry().clone();
                tokio::spawn(async move {
                    if let Err(e) = registry.cancel(run_id).await {
                        tracing::warn!("Cancel of run {} failed: {}", run_id, e);
                    }
                });
            }
        }
    }

    for violation in warden.violations(run_id) {
        console.warn(&format!("Sandbox violation: {}", violation));
    }

    match status {
        Some(status) => Ok(exit_code(&status, cancelling)),
        None => Err(WardenError::internal(format!(
            "Output of run {} ended without an exit status",
            run_id
        ))),
    }
}

fn build_command(project_root: &Path, args: &RunArgs) -> WardenResult<CommandSpec> {
    let cwd = match &args.cwd {
        Some(dir) if dir.is_absolute() => dir.clone(),
        Some(dir) => project_root.join(dir),
        None => project_root.to_path_buf(),
    };

    if args.shell {
        return Ok(CommandSpec::shell(args.command.join(" "), cwd));
    }
    let (program, rest) = args
        .command
        .split_first()
        .ok_or_else(|| WardenError::config("No command given"))?;
    Ok(CommandSpec::new(program.as_str(), cwd).args(rest.iter().cloned()))
}

fn tool_name(command: &CommandSpec) -> String {
    Path::new(&command.program)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| command.program.clone())
}

fn emit(event: &OutputEvent, console: &CliConsole) -> WardenResult<()> {
    if console.json() {
        let line = match event {
            OutputEvent::Chunk(chunk) => serde_json::json!({
                "event": "chunk",
                "offset": chunk.offset,
                "stream": chunk.stream,
                "text": chunk.text(),
            }),
            OutputEvent::Gap { lost_bytes } => serde_json::json!({
                "event": "gap",
                "lost_bytes": lost_bytes,
            }),
            OutputEvent::Exited(status) => serde_json::json!({
                "event": "exited",
                "status": status,
            }),
        };
        println!("{}", line);
        return Ok(());
    }

    match event {
        OutputEvent::Chunk(chunk) => {
            let result = match chunk.stream {
                StreamKind::Stdout => {
                    let mut out = std::io::stdout().lock();
                    out.write_all(&chunk.data).and_then(|_| out.flush())
                }
                StreamKind::Stderr => {
                    let mut err = std::io::stderr().lock();
                    err.write_all(&chunk.data).and_then(|_| err.flush())
                }
            };
            result.map_err(|e| WardenError::internal(format!("Writing output failed: {}", e)))
        }
        OutputEvent::Gap { lost_bytes } => {
            console.warn(&format!("{} bytes of output were dropped", lost_bytes));
            Ok(())
        }
        OutputEvent::Exited(status) => {
            let text = status.to_string();
            if status.success() {
                console.info(&text);
            } else {
                eprintln!("{}", text.dimmed());
            }
            Ok(())
        }
    }
}

fn exit_code(status: &ProcessStatus, cancelled: bool) -> i32 {
    match status {
        ProcessStatus::Exited {
            code: Some(code), ..
        } => *code,
        ProcessStatus::Exited {
            signal: Some(signal),
            ..
        } => 128 + signal,
        _ if cancelled => 130,
        _ => 1,
    }
}

/// Resolves on the first SIGINT or SIGTERM
async fn interrupted() {
    #[cfg(unix)]
    {
        use futures::StreamExt;
        use signal_hook::consts::{SIGINT, SIGTERM};
        use signal_hook_tokio::Signals;

        match Signals::new([SIGINT, SIGTERM]) {
            Ok(mut signals) => {
                signals.next().await;
                return;
            }
            Err(e) => tracing::debug!("Signal registration failed: {}", e),
        }
    }

    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
