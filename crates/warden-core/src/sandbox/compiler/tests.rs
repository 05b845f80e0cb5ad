use super::*;
use crate::sandbox::rules::{Decision, SandboxAction};

fn context() -> ProfileContext {
    ProfileContext::new("/work/app", "/home/dev")
}

fn compile_linux(caps: &Capabilities, ctx: &ProfileContext) -> WardenResult<SandboxProfile> {
    compile_for("test", caps, ctx, Some(Platform::Linux))
}

fn probe_actions() -> Vec<SandboxAction> {
    vec![
        SandboxAction::path(OperationClass::FileRead, "/work/app/src/main.rs"),
        SandboxAction::path(OperationClass::FileWrite, "/work/app/src/main.rs"),
        SandboxAction::path(OperationClass::FileWrite, "/work/other/x"),
        SandboxAction::path(OperationClass::FileRead, "/home/dev/.cargo/config.toml"),
        SandboxAction::path(OperationClass::FileRead, "/home/dev/.ssh/id_ed25519"),
        SandboxAction::path(OperationClass::FileWrite, "/home/dev/.bashrc"),
        SandboxAction::path(OperationClass::ProcessExec, "/usr/bin/git"),
        SandboxAction::path(OperationClass::ProcessExec, "/usr/local/bin/node"),
        SandboxAction::path(OperationClass::ProcessExec, "/home/dev/.cargo/bin/cargo"),
        SandboxAction::path(OperationClass::FileWrite, "/dev/null"),
        SandboxAction::path(OperationClass::FileWrite, "/etc/hosts"),
        SandboxAction::host("github.com"),
        SandboxAction::host("pypi.org"),
        SandboxAction::host("evil.example"),
        SandboxAction::system_info(),
    ]
}

#[test]
fn test_minimal_profile_base_rules() {
    let profile = compile_linux(&Capabilities::none(), &context()).unwrap();

    assert!(profile.allows(&SandboxAction::path(
        OperationClass::FileRead,
        "/work/app/Cargo.toml"
    )));
    assert!(profile.allows(&SandboxAction::path(
        OperationClass::ProcessExec,
        "/work/app/scripts/build.sh"
    )));
    assert!(profile.allows(&SandboxAction::path(OperationClass::FileRead, "/usr/lib/libc.so.6")));
    assert!(profile.allows(&SandboxAction::path(OperationClass::ProcessExec, "/bin/sh")));
    assert!(profile.allows(&SandboxAction::path(OperationClass::FileWrite, "/dev/null")));

    assert!(!profile.allows(&SandboxAction::path(
        OperationClass::FileWrite,
        "/work/app/Cargo.toml"
    )));
    assert!(!profile.allows(&SandboxAction::host("github.com")));
    assert!(!profile.allows(&SandboxAction::system_info()));
}

#[test]
fn test_file_write_is_scoped_to_project_root() {
    let caps = Capabilities::none().with(Capability::FileWrite);
    let profile = compile_linux(&caps, &context()).unwrap();

    let writes: Vec<_> = profile
        .rules_for(OperationClass::FileWrite, true)
        .map(|r| r.target.clone())
        .collect();
    assert_eq!(
        writes,
        vec![
            RuleTarget::Literal("/dev/null".into()),
            RuleTarget::Subpath("/work/app".into()),
        ]
    );
    assert!(!profile.allows(&SandboxAction::path(OperationClass::FileWrite, "/work/other/x")));
}

#[test]
fn test_network_only_for_named_hosts() {
    let no_hosts = Capabilities::none().with(Capability::Network);
    let profile = compile_linux(&no_hosts, &context()).unwrap();
    assert_eq!(profile.rules_for(OperationClass::NetworkOutbound, true).count(), 0);

    let caps = Capabilities::none().with_host("GitHub.com").with_host("*.crates.io");
    let profile = compile_linux(&caps, &context()).unwrap();
    assert!(profile.allows(&SandboxAction::host("github.com")));
    assert!(profile.allows(&SandboxAction::host("static.crates.io")));
    assert!(!profile.allows(&SandboxAction::host("gitlab.com")));
}

#[test]
fn test_invalid_host_is_rejected() {
    for host in ["github.com/owner", "bad host", "*", "a.*.com", ""] {
        let caps = Capabilities::none().with_host(host);
        let err = compile_linux(&caps, &context()).unwrap_err();
        assert!(matches!(err, WardenError::InvalidRule { .. }), "{host}");
    }
}

#[test]
fn test_profile_monotonicity() {
    let ctx = context();
    let a = Capabilities::none()
        .with(Capability::FileRead)
        .with_host("github.com");
    let b = a
        .clone()
        .with(Capability::FileWrite)
        .with(Capability::ProcessExec)
        .with(Capability::SystemInfo)
        .with_host("pypi.org");
    assert!(a.is_subset(&b));

    let pa = compile_linux(&a, &ctx).unwrap();
    let pb = compile_linux(&b, &ctx).unwrap();
    for action in probe_actions() {
        if pa.allows(&action) {
            assert!(pb.allows(&action), "{action:?} allowed by A but not B");
        }
    }

    // Every capability subset of the full set, against the full set
    let full = Capabilities {
        flags: Capability::ALL.into_iter().collect(),
        network_hosts: ["github.com".to_string(), "pypi.org".to_string()].into(),
    };
    let full_profile = compile_linux(&full, &ctx).unwrap();
    for mask in 0u32..(1 << Capability::ALL.len()) {
        let mut caps = Capabilities::none();
        for (i, cap) in Capability::ALL.into_iter().enumerate() {
            if mask & (1 << i) != 0 {
                caps = caps.with(cap);
            }
        }
        let profile = compile_linux(&caps, &ctx).unwrap();
        for action in probe_actions() {
            if profile.allows(&action) {
                assert!(full_profile.allows(&action), "{action:?} under {caps}");
            }
        }
    }
}

#[test]
fn test_custom_rules_expand_templates() {
    let ctx = context().with_custom_rules([
        CustomRule::new(
            OperationClass::FileWrite,
            TargetKind::Subpath,
            "{{PROJECT_ROOT}}/.git",
            Decision::Deny,
        ),
        CustomRule::new(
            OperationClass::FileWrite,
            TargetKind::Subpath,
            "{{HOME}}/.cache/../.cache/tool",
            Decision::Allow,
        ),
    ]);
    let caps = Capabilities::none().with(Capability::FileWrite);
    let profile = compile_linux(&caps, &ctx).unwrap();

    let last = profile.rules().last().unwrap();
    assert_eq!(last.target, RuleTarget::Subpath("/home/dev/.cache/tool".into()));
    assert!(!profile.allows(&SandboxAction::path(
        OperationClass::FileWrite,
        "/work/app/.git/HEAD"
    )));
    assert!(profile.allows(&SandboxAction::path(
        OperationClass::FileWrite,
        "/home/dev/.cache/tool/db"
    )));
}

#[test]
fn test_unknown_template_variable_fails_compilation() {
    let ctx = context().with_custom_rules([CustomRule::new(
        OperationClass::FileRead,
        TargetKind::Subpath,
        "{{WORKSPACE}}/data",
        Decision::Allow,
    )]);
    let err = compile_linux(&Capabilities::none(), &ctx).unwrap_err();
    assert!(matches!(err, WardenError::InvalidRule { rule: Some(_), .. }));
}

#[test]
fn test_relative_rule_path_is_invalid() {
    let ctx = context().with_custom_rules([CustomRule::new(
        OperationClass::FileRead,
        TargetKind::Literal,
        "relative/file",
        Decision::Allow,
    )]);
    assert!(compile_linux(&Capabilities::none(), &ctx).is_err());

    let relative_root = ProfileContext::new("work/app", "/home/dev");
    assert!(compile_linux(&Capabilities::none(), &relative_root).is_err());
}

#[test]
fn test_target_kind_must_fit_operation() {
    let cases = [
        CustomRule::new(OperationClass::FileRead, TargetKind::Any, "", Decision::Deny),
        CustomRule::new(OperationClass::FileRead, TargetKind::Host, "x.com", Decision::Allow),
        CustomRule::new(OperationClass::NetworkOutbound, TargetKind::Subpath, "/x", Decision::Allow),
        CustomRule::new(OperationClass::SystemInfo, TargetKind::Host, "x.com", Decision::Allow),
    ];
    for rule in cases {
        let ctx = context().with_custom_rules([rule.clone()]);
        assert!(
            compile_linux(&Capabilities::none(), &ctx).is_err(),
            "{rule}"
        );
    }
}

#[test]
fn test_conflicting_custom_rule_is_rejected() {
    let ctx = context().with_custom_rules([CustomRule::new(
        OperationClass::FileWrite,
        TargetKind::Subpath,
        "{{PROJECT_PATH}}",
        Decision::Deny,
    )]);
    let caps = Capabilities::none().with(Capability::FileWrite);
    let err = compile_linux(&caps, &ctx).unwrap_err();
    assert!(matches!(err, WardenError::Conflict { .. }));
}

#[test]
fn test_platform_filter_and_dedup() {
    let ctx = context().with_custom_rules([
        CustomRule::new(
            OperationClass::FileRead,
            TargetKind::Subpath,
            "/opt/linux-only",
            Decision::Allow,
        )
        .on_platform(Platform::Linux),
        CustomRule::new(
            OperationClass::FileRead,
            TargetKind::Subpath,
            "/opt/mac-only",
            Decision::Allow,
        )
        .on_platform(Platform::Macos),
        // Duplicate of a base rule
        CustomRule::new(
            OperationClass::FileRead,
            TargetKind::Subpath,
            "{{PROJECT_ROOT}}",
            Decision::Allow,
        ),
    ]);
    let profile = compile_linux(&Capabilities::none(), &ctx).unwrap();

    assert!(profile.allows(&SandboxAction::path(OperationClass::FileRead, "/opt/linux-only/a")));
    assert!(!profile.allows(&SandboxAction::path(OperationClass::FileRead, "/opt/mac-only/a")));
    let project_reads = profile
        .rules()
        .iter()
        .filter(|r| {
            r.operation == OperationClass::FileRead
                && r.target == RuleTarget::Subpath("/work/app".into())
        })
        .count();
    assert_eq!(project_reads, 1);
}

#[test]
fn test_toolchain_rules_need_a_home() {
    let ctx = ProfileContext::new("/work/app", "");
    assert!(compile_linux(&Capabilities::none(), &ctx).is_ok());
    let caps = Capabilities::none().with(Capability::FileRead);
    assert!(compile_linux(&caps, &ctx).is_err());
}

#[test]
fn test_profile_serializes_for_display() {
    let profile = compile_linux(&Capabilities::none().with(Capability::SystemInfo), &context())
        .unwrap();
    let json = serde_json::to_value(&profile).unwrap();
    assert_eq!(json["name"], "test");
    assert_eq!(json["capabilities"]["flags"][0], "system-info");
    assert!(json["rules"].as_array().unwrap().len() > 5);
}
