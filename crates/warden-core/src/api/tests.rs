use super::*;
use crate::checkpoints::ChangeKind;
use crate::sandbox::{Capability, Decision, OperationClass, TargetKind};
use std::fs;
use tempfile::TempDir;

fn open(root: &Path) -> Warden {
    Warden::with_platform(root, WardenConfig::default(), PlatformCapabilities::none()).unwrap()
}

#[test]
fn test_open_requires_directory() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nope");
    let err = Warden::with_platform(&missing, WardenConfig::default(), PlatformCapabilities::none())
        .err()
        .unwrap();
    assert!(matches!(err, WardenError::StorageIo { .. }));
}

#[tokio::test]
async fn test_checkpoint_commands() {
    let temp_dir = TempDir::new().unwrap();
    let warden = open(temp_dir.path());
    let root = warden.project_root().to_path_buf();

    let session = warden.create_session().await.unwrap();
    fs::write(root.join("a.txt"), "1").unwrap();
    let c1 = warden
        .create_checkpoint(&session, Some("first".into()))
        .await
        .unwrap();
    fs::write(root.join("a.txt"), "2").unwrap();
    fs::write(root.join("b.txt"), "new").unwrap();
    let c2 = warden.create_checkpoint(&session, None).await.unwrap();

    let diffs = warden.diff_checkpoints(&session, &c1, &c2).await.unwrap();
    let changes: Vec<(&str, ChangeKind)> =
        diffs.iter().map(|d| (d.path.as_str(), d.change)).collect();
    assert_eq!(
        changes,
        vec![("a.txt", ChangeKind::Modified), ("b.txt", ChangeKind::Added)]
    );

    let preview = warden.preview_restore(&session, &c1).await.unwrap();
    assert_eq!(preview.deleted, vec!["b.txt".to_string()]);
    assert!(root.join("b.txt").exists());

    let outcome = warden.restore_checkpoint(&session, &c1).await.unwrap();
    assert_eq!(outcome.restored, vec!["a.txt".to_string()]);
    assert_eq!(fs::read_to_string(root.join("a.txt")).unwrap(), "1");
    assert!(!root.join("b.txt").exists());

    let entries = warden.list_checkpoints(&session).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries[0].is_head);

    let fork = warden.fork_session(&session, &c1).await.unwrap();
    assert_eq!(warden.list_checkpoints(&fork).await.unwrap().len(), 1);
    assert_eq!(warden.sessions().await.unwrap().len(), 2);

    assert_eq!(warden.prune_branch(&session, &c2).await.unwrap(), 1);
    let report = warden.collect_garbage().await.unwrap();
    assert_eq!(report.sessions_scanned, 2);
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let warden = open(temp_dir.path());
    let err = warden
        .list_checkpoints(&SessionId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::NotFound { .. }));
}

#[test]
fn test_profiles_include_configured() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = WardenConfig::default();
    config.sandbox.profiles.insert(
        "reviewer".into(),
        crate::sandbox::ProfileDefinition {
            description: Some("read only".into()),
            capabilities: Capabilities::none().with(Capability::FileRead),
            rules: Vec::new(),
        },
    );
    let warden =
        Warden::with_platform(temp_dir.path(), config, PlatformCapabilities::none()).unwrap();

    let names: Vec<String> = warden.list_profiles().into_iter().map(|p| p.name).collect();
    for expected in ["development", "minimal", "reviewer", "standard"] {
        assert!(names.iter().any(|n| n == expected), "missing {expected}");
    }
    assert_eq!(warden.profile("reviewer").unwrap().name(), "reviewer");
    assert!(matches!(
        warden.profile("nope").unwrap_err(),
        WardenError::NotFound { .. }
    ));
}

#[test]
fn test_compile_and_dry_run() {
    let temp_dir = TempDir::new().unwrap();
    let warden = open(temp_dir.path());
    let root = warden.project_root().to_path_buf();

    let capabilities = Capabilities::none()
        .with(Capability::FileWrite)
        .with_host("github.com");
    let deny_git = CustomRule::new(
        OperationClass::FileWrite,
        TargetKind::Subpath,
        "{{PROJECT_ROOT}}/.git",
        Decision::Deny,
    );
    let profile = warden.compile_profile(&capabilities, vec![deny_git]).unwrap();
    assert_eq!(profile.name(), CUSTOM_PROFILE_NAME);

    let write_src = SandboxAction::path(OperationClass::FileWrite, root.join("src/main.rs"));
    assert!(warden.test_profile(&profile, &write_src).is_allowed());

    let write_git = SandboxAction::path(OperationClass::FileWrite, root.join(".git/config"));
    let evaluation = warden.test_profile(&profile, &write_git);
    assert!(!evaluation.is_allowed());
    assert_eq!(evaluation.rule.unwrap().decision, Decision::Deny);

    let network = SandboxAction::parse("network-outbound:example.com").unwrap();
    assert!(!warden.test_profile(&profile, &network).is_allowed());
}

#[test]
fn test_unexpandable_rule_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let warden = open(temp_dir.path());
    let rule = CustomRule::new(
        OperationClass::FileRead,
        TargetKind::Subpath,
        "{{WORKSPACE}}/data",
        Decision::Allow,
    );
    assert!(matches!(
        warden
            .compile_profile(&Capabilities::none(), vec![rule])
            .unwrap_err(),
        WardenError::InvalidRule { .. }
    ));
}

#[tokio::test]
async fn test_spawn_refuses_without_isolation() {
    let temp_dir = TempDir::new().unwrap();
    let warden = open(temp_dir.path());
    let request = RunRequest::new(
        ProcessKind::Tool {
            name: "bash".into(),
        },
        CommandSpec::shell("true", warden.project_root()),
        "minimal",
    );
    assert!(matches!(
        warden.spawn(request).unwrap_err(),
        WardenError::IsolationUnavailable { .. }
    ));
    assert!(warden.list_runs().is_empty());
    assert!(!warden.platform_capabilities().is_available(crate::sandbox::Primitive::Filesystem));
}

#[cfg(unix)]
#[tokio::test]
async fn test_spawn_best_effort_runs_and_drains() {
    let temp_dir = TempDir::new().unwrap();
    let warden = open(temp_dir.path());
    let request = RunRequest::new(
        ProcessKind::AgentRun {
            agent_name: "coder".into(),
        },
        CommandSpec::shell("echo hello", warden.project_root()),
        "standard",
    )
    .with_task("greet")
    .with_best_effort(true);

    let run = warden.spawn(request).unwrap();
    let info = warden.get_run(run).unwrap();
    assert_eq!(info.profile, "standard");
    assert_eq!(info.task.as_deref(), Some("greet"));

    let events = warden.stream_output(run).unwrap().collect().await;
    let text: String = events
        .iter()
        .filter_map(|e| match e {
            crate::process::OutputEvent::Chunk(c) => Some(c.text()),
            _ => None,
        })
        .collect();
    assert_eq!(text, "hello\n");
    assert!(warden.get_run(run).is_err());
    assert!(warden.violations(run).is_empty());
}
