//! Sandbox commands

use colored::*;
use warden_core::Warden;
use warden_core::error::WardenResult;
use warden_core::sandbox::{Capabilities, Capability, Decision, SandboxAction, SandboxProfile};

use crate::args::SandboxCommand;
use crate::console::CliConsole;

pub fn run(warden: &Warden, action: SandboxCommand, console: &CliConsole) -> WardenResult<()> {
    match action {
        SandboxCommand::Profiles => profiles(warden, console),
        SandboxCommand::Compile {
            profile,
            capabilities,
            hosts,
        } => {
            let compiled = if capabilities.is_empty() && hosts.is_empty() {
                warden.profile(&profile)?
            } else {
                warden.compile_profile(&parse_capabilities(&capabilities, &hosts)?, Vec::new())?
            };
            print_profile(&compiled, console)
        }
        SandboxCommand::Test { profile, actions } => {
            let compiled = warden.profile(&profile)?;
            let actions = actions
                .iter()
                .map(|raw| SandboxAction::parse(raw))
                .collect::<WardenResult<Vec<_>>>()?;
            let evaluations: Vec<_> = actions
                .iter()
                .map(|action| warden.test_profile(&compiled, action))
                .collect();
            if console.json() {
                return console.print_json(&evaluations);
            }
            for (action, evaluation) in actions.iter().zip(&evaluations) {
                let verdict = if evaluation.is_allowed() {
                    "allow".green().bold()
                } else {
                    "deny ".red().bold()
                };
                console.line(&format!(
                    "{} {}  {}",
                    verdict,
                    action,
                    evaluation.explain().dimmed()
                ));
            }
            Ok(())
        }
        SandboxCommand::Capabilities => {
            let platform = warden.platform_capabilities();
            if console.json() {
                return console.print_json(platform);
            }
            console.print_header("Isolation");
            console.line(&format!("os:         {}", platform.os));
            console.line(&format!("backend:    {}", platform.backend.name()));
            let available: Vec<String> = platform.primitives.iter().map(|p| p.to_string()).collect();
            let missing: Vec<String> = platform.unavailable().iter().map(|p| p.to_string()).collect();
            console.line(&format!(
                "available:  {}",
                if available.is_empty() { "none".to_string() } else { available.join(", ") }
            ));
            if !missing.is_empty() {
                console.line(&format!("missing:    {}", missing.join(", ").yellow()));
            }
            Ok(())
        }
    }
}

fn profiles(warden: &Warden, console: &CliConsole) -> WardenResult<()> {
    let summaries = warden.list_profiles();
    if console.json() {
        return console.print_json(&summaries);
    }
    console.print_header("Profiles");
    for summary in summaries {
        let origin = if summary.builtin { "preset" } else { "config" };
        console.line(&format!(
            "{:<14} {:<7} {}",
            summary.name.bold(),
            origin.dimmed(),
            summary.capabilities
        ));
        if let Some(description) = &summary.description {
            console.line(&format!("{:<22} {}", "", description.dimmed()));
        }
    }
    Ok(())
}

fn parse_capabilities(flags: &[String], hosts: &[String]) -> WardenResult<Capabilities> {
    let mut capabilities = Capabilities::none();
    for flag in flags {
        let capability: Capability = flag.parse()?;
        capabilities = capabilities.with(capability);
    }
    for host in hosts {
        capabilities = capabilities.with_host(host.clone());
    }
    Ok(capabilities)
}

fn print_profile(profile: &SandboxProfile, console: &CliConsole) -> WardenResult<()> {
    if console.json() {
        return console.print_json(profile);
    }
    console.print_header(&format!("Profile {}", profile.name()));
    console.line(&format!("capabilities: {}", profile.capabilities()));
    console.line(&format!("project root: {}", profile.project_root().display()));
    for rule in profile.rules() {
        let text = rule.to_string();
        match rule.decision {
            Decision::Allow => console.line(&format!("  {}", text.green())),
            Decision::Deny => console.line(&format!("  {}", text.red())),
        }
    }
    Ok(())
}
