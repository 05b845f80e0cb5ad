//! CLI console utilities

use colored::*;
use serde::Serialize;
use warden_core::error::{ErrorCode, WardenError, WardenResult};

/// Formatted human output, or JSON when requested
pub struct CliConsole {
    verbose: bool,
    json: bool,
}

impl CliConsole {
    pub fn new(verbose: bool, json: bool) -> Self {
        if !console::Term::stdout().is_term() {
            colored::control::set_override(false);
        }
        Self { verbose, json }
    }

    pub fn json(&self) -> bool {
        self.json
    }

    /// Print a value as pretty JSON on stdout
    pub fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> WardenResult<()> {
        let text = serde_json::to_string_pretty(value)?;
        println!("{}", text);
        Ok(())
    }

    /// Print an info message (verbose only)
    pub fn info(&self, message: &str) {
        if self.verbose && !self.json {
            eprintln!("{} {}", "ℹ".blue().bold(), message);
        }
    }

    pub fn success(&self, message: &str) {
        if !self.json {
            println!("{} {}", "✓".green().bold(), message.green());
        }
    }

    /// Warnings go to stderr so they never mix with JSON
    pub fn warn(&self, message: &str) {
        eprintln!("{} {}", "⚠".yellow().bold(), message.yellow());
    }

    pub fn print_header(&self, title: &str) {
        if !self.json {
            println!();
            println!("{}", title.bold().underline());
        }
    }

    pub fn line(&self, text: &str) {
        if !self.json {
            println!("{}", text);
        }
    }
}

/// Print an error as text, or as a JSON body on stdout
pub fn report_error(error: &WardenError, json: bool) {
    if json {
        let body = serde_json::json!({
            "error": {
                "code": error.error_code(),
                "message": error.to_string(),
                "context": error.context(),
                "retryable": error.is_retryable(),
            }
        });
        println!("{}", body);
        return;
    }

    eprintln!("{} {}", "✗".red().bold(), error.to_string().red());
    match error {
        WardenError::IsolationUnavailable { missing, .. } if !missing.is_empty() => {
            eprintln!("  missing primitives: {}", missing.join(", "));
            eprintln!("  rerun with --best-effort to run with degraded isolation");
        }
        WardenError::Conflict { details, .. } => {
            for detail in details {
                eprintln!("  {}", detail.dimmed());
            }
        }
        _ => {
            if let Some(context) = error.context() {
                eprintln!("  {}", context.dimmed());
            }
        }
    }
}
