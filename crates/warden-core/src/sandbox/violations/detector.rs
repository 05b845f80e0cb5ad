//! Classify OS denial messages on a child's stderr

use chrono::Utc;
use regex::Regex;
use std::sync::LazyLock;

use super::types::ViolationEvent;
use crate::sandbox::compiler::SandboxProfile;
use crate::sandbox::rules::{ActionTarget, Decision, OperationClass, SandboxAction};

static SEATBELT_DENY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"deny\(\d+\)\s+([a-z*-]+)(?:\s+(\S.*))?$").unwrap());

static READ_ONLY_FS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)read-only file system").unwrap());

static NOT_PERMITTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)operation not permitted|permission denied").unwrap());

static NETWORK_FAILURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)network is unreachable|could not resolve host|temporary failure in name resolution|name or service not known|nodename nor servname provided",
    )
    .unwrap()
});

static RESOLVE_HOST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)could not resolve host:?\s*([a-z0-9.-]+)").unwrap());

static ABSOLUTE_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(/[^\s'"`:,;()]+)"#).unwrap());

static WRITE_VERB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(cannot create|cannot touch|cannot remove|cannot move|for writing|mkdir|rm|mv|cp|tee|write|writing)\b",
    )
    .unwrap()
});

static EXEC_VERB: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(exec|execute|execvp|cannot run)\b").unwrap());

/// Turns stderr lines into violation events
///
/// Only lines carrying a known OS denial signature produce events; everything
/// else is ordinary program output.
#[derive(Debug, Clone, Copy, Default)]
pub struct ViolationDetector;

impl ViolationDetector {
    pub fn new() -> Self {
        Self
    }

    /// Operation and target named by a denial message
    pub fn classify(&self, line: &str) -> Option<(OperationClass, Option<String>)> {
        if let Some(caps) = SEATBELT_DENY.captures(line) {
            let op = caps.get(1).map_or("", |m| m.as_str());
            let target = caps.get(2).map(|m| m.as_str().trim().to_string());
            let operation = if op.starts_with("file-write") {
                OperationClass::FileWrite
            } else if op.starts_with("file-read") {
                OperationClass::FileRead
            } else if op.starts_with("process-exec") {
                OperationClass::ProcessExec
            } else if op.starts_with("network") {
                OperationClass::NetworkOutbound
            } else if op.starts_with("sysctl") || op.starts_with("process-info") {
                OperationClass::SystemInfo
            } else {
                return None;
            };
            return Some((operation, target));
        }

        if NETWORK_FAILURE.is_match(line) {
            let host = RESOLVE_HOST
                .captures(line)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim_end_matches('.').to_string());
            return Some((OperationClass::NetworkOutbound, host));
        }

        let path = ABSOLUTE_PATH
            .captures(line)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());
        if READ_ONLY_FS.is_match(line) {
            return Some((OperationClass::FileWrite, path));
        }
        if NOT_PERMITTED.is_match(line) {
            let operation = if WRITE_VERB.is_match(line) {
                OperationClass::FileWrite
            } else if EXEC_VERB.is_match(line) {
                OperationClass::ProcessExec
            } else {
                OperationClass::FileRead
            };
            return Some((operation, path));
        }
        None
    }

    /// An event for a stderr line of a run, if the line is a denial
    pub fn detect(&self, run_id: u64, line: &str) -> Option<ViolationEvent> {
        let line = line.trim_end();
        let (operation, target) = self.classify(line)?;
        Some(ViolationEvent {
            run_id,
            operation,
            target,
            decision: Decision::Deny,
            observed_at: Utc::now(),
            raw: line.to_string(),
        })
    }

    /// Like [`detect`](Self::detect), but only for denials the run's profile explains
    ///
    /// A "permission denied" for an action the profile allows comes from file modes
    /// or ownership, not from the sandbox. A denial naming no target counts only when
    /// the profile allows nothing of that operation class.
    pub fn detect_for(
        &self,
        run_id: u64,
        line: &str,
        profile: &SandboxProfile,
    ) -> Option<ViolationEvent> {
        let event = self.detect(run_id, line)?;
        let denied = match action_for(event.operation, event.target.as_deref()) {
            Some(action) => !profile.allows(&action),
            None => !profile
                .rules()
                .iter()
                .any(|rule| rule.operation == event.operation && rule.decision == Decision::Allow),
        };
        if denied {
            Some(event)
        } else {
            tracing::debug!(
                "Run {}: {} allowed by profile {}, not a violation",
                run_id,
                event.operation,
                profile.name()
            );
            None
        }
    }
}

fn action_for(operation: OperationClass, target: Option<&str>) -> Option<SandboxAction> {
    match (operation, target) {
        (OperationClass::SystemInfo, _) => Some(SandboxAction::system_info()),
        (OperationClass::NetworkOutbound, Some(host)) => Some(SandboxAction {
            operation,
            target: ActionTarget::Host(host.to_lowercase()),
        }),
        (_, Some(path)) if path.starts_with('/') => Some(SandboxAction::path(operation, path)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(line: &str) -> Option<(OperationClass, Option<String>)> {
        ViolationDetector::new().classify(line)
    }

    #[test]
    fn test_read_only_file_system() {
        assert_eq!(
            classify("sh: 1: cannot create /home/dev/.bashrc: Read-only file system"),
            Some((OperationClass::FileWrite, Some("/home/dev/.bashrc".into())))
        );
        assert_eq!(
            classify("touch: cannot touch '/etc/hosts': Read-only file system"),
            Some((OperationClass::FileWrite, Some("/etc/hosts".into())))
        );
    }

    #[test]
    fn test_permission_denied_variants() {
        assert_eq!(
            classify("cat: /root/secret: Permission denied"),
            Some((OperationClass::FileRead, Some("/root/secret".into())))
        );
        assert_eq!(
            classify("mkdir: cannot create directory '/opt/x': Permission denied"),
            Some((OperationClass::FileWrite, Some("/opt/x".into())))
        );
        assert_eq!(
            classify("sh: 1: /usr/sbin/tool: cannot execute: Permission denied")
                .map(|(op, _)| op),
            Some(OperationClass::ProcessExec)
        );
    }

    #[test]
    fn test_network_failures() {
        assert_eq!(
            classify("curl: (6) Could not resolve host: example.com"),
            Some((OperationClass::NetworkOutbound, Some("example.com".into())))
        );
        assert_eq!(
            classify("ping: connect: Network is unreachable"),
            Some((OperationClass::NetworkOutbound, None))
        );
    }

    #[test]
    fn test_seatbelt_lines() {
        assert_eq!(
            classify("Sandbox: sh(4242) deny(1) file-write-create /Users/dev/.zshrc"),
            Some((OperationClass::FileWrite, Some("/Users/dev/.zshrc".into())))
        );
        assert_eq!(
            classify("Sandbox: curl(77) deny(1) network-outbound 93.184.216.34:443")
                .map(|(op, _)| op),
            Some(OperationClass::NetworkOutbound)
        );
        assert_eq!(classify("Sandbox: x(1) deny(1) iokit-open"), None);
    }

    #[test]
    fn test_ordinary_output_is_ignored() {
        assert_eq!(classify("Compiling warden v0.1.0"), None);
        assert_eq!(classify("error: no such file: /tmp/x"), None);
    }

    fn minimal(root: &std::path::Path) -> SandboxProfile {
        crate::sandbox::compile(
            "minimal",
            &crate::sandbox::Capabilities::none(),
            &crate::sandbox::ProfileContext::new(root, "/home/dev"),
        )
        .unwrap()
    }

    #[test]
    fn test_denial_allowed_by_profile_is_ignored() {
        let detector = ViolationDetector::new();
        let profile = minimal(std::path::Path::new("/work/app"));

        // Reading inside the project is allowed: a file-mode failure, not the sandbox
        assert!(detector
            .detect_for(1, "cat: /work/app/notes.txt: Permission denied", &profile)
            .is_none());
        assert!(detector
            .detect_for(1, "cat: /usr/share/dict/words: Permission denied", &profile)
            .is_none());

        let event = detector
            .detect_for(1, "cat: /root/secret: Permission denied", &profile)
            .unwrap();
        assert_eq!(event.target.as_deref(), Some("/root/secret"));
        let event = detector
            .detect_for(1, "mkdir: cannot create directory '/work/app/out': Permission denied", &profile)
            .unwrap();
        assert_eq!(event.operation, OperationClass::FileWrite);
    }

    #[test]
    fn test_targetless_denial_needs_uncovered_operation() {
        let detector = ViolationDetector::new();
        let profile = minimal(std::path::Path::new("/work/app"));

        // Nothing allows network in minimal, file reads are partly allowed
        assert!(detector
            .detect_for(2, "ping: connect: Network is unreachable", &profile)
            .is_some());
        assert!(detector
            .detect_for(2, "ls: Permission denied", &profile)
            .is_none());
    }

    #[test]
    fn test_detect_builds_event() {
        let event = ViolationDetector::new()
            .detect(7, "cat: /root/secret: Permission denied\n")
            .unwrap();
        assert_eq!(event.run_id, 7);
        assert_eq!(event.decision, Decision::Deny);
        assert_eq!(event.raw, "cat: /root/secret: Permission denied");
        assert_eq!(event.to_string(), "run 7: deny file-read /root/secret");
    }
}
