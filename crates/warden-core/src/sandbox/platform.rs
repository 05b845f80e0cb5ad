//! Platform capability probe
//!
//! Reports which isolation primitives this host can genuinely enforce. The probe
//! runs real preflight commands, so its result is cached for the process lifetime.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::OnceCell;

/// Path of the macOS sandbox launcher
pub const SANDBOX_EXEC_PATH: &str = "/usr/bin/sandbox-exec";

/// An OS mechanism used to enforce part of a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Primitive {
    /// Restrict which paths can be read, written and executed
    Filesystem,
    /// Deny all outbound network access
    Network,
    /// Allow outbound access to named hosts only
    NetworkHostFilter,
    /// Confine the process tree (own pid namespace or sandboxed process-exec)
    Process,
}

impl Primitive {
    pub fn as_str(&self) -> &'static str {
        match self {
            Primitive::Filesystem => "filesystem",
            Primitive::Network => "network",
            Primitive::NetworkHostFilter => "network-host-filter",
            Primitive::Process => "process",
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The isolation mechanism found on this host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendKind {
    /// Linux `bwrap`; `proc_supported` is false in nested containers without procfs
    Bubblewrap { proc_supported: bool },
    /// macOS `sandbox-exec`
    Seatbelt,
    None,
}

impl BackendKind {
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Bubblewrap { .. } => "bubblewrap",
            BackendKind::Seatbelt => "seatbelt",
            BackendKind::None => "none",
        }
    }

    /// Primitives the backend enforces when it is available
    pub fn primitives(&self) -> BTreeSet<Primitive> {
        match self {
            BackendKind::Bubblewrap { .. } | BackendKind::Seatbelt => {
                [Primitive::Filesystem, Primitive::Network, Primitive::Process].into()
            }
            BackendKind::None => BTreeSet::new(),
        }
    }
}

/// What the probe found
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformCapabilities {
    pub os: String,
    pub backend: BackendKind,
    pub primitives: BTreeSet<Primitive>,
}

impl PlatformCapabilities {
    /// Capabilities of a known backend, without probing
    pub fn with_backend(backend: BackendKind) -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            primitives: backend.primitives(),
            backend,
        }
    }

    /// A host with no isolation at all
    pub fn none() -> Self {
        Self::with_backend(BackendKind::None)
    }

    pub fn is_available(&self, primitive: Primitive) -> bool {
        self.primitives.contains(&primitive)
    }

    /// Required primitives this host lacks
    pub fn missing(&self, required: &BTreeSet<Primitive>) -> Vec<Primitive> {
        required.difference(&self.primitives).copied().collect()
    }

    /// Primitives that cannot be enforced here
    pub fn unavailable(&self) -> Vec<Primitive> {
        [
            Primitive::Filesystem,
            Primitive::Network,
            Primitive::NetworkHostFilter,
            Primitive::Process,
        ]
        .into_iter()
        .filter(|p| !self.is_available(*p))
        .collect()
    }
}

static PROBE: OnceCell<PlatformCapabilities> = OnceCell::const_new();

/// Probe once per process and return the cached result afterwards
pub async fn probe_capabilities() -> &'static PlatformCapabilities {
    PROBE
        .get_or_init(|| async {
            let capabilities = probe_uncached().await;
            tracing::debug!(
                "Isolation backend {} provides {:?}",
                capabilities.backend.name(),
                capabilities.primitives
            );
            capabilities
        })
        .await
}

/// Run the platform probe without consulting the cache
pub async fn probe_uncached() -> PlatformCapabilities {
    let backend = if cfg!(target_os = "linux") {
        detect_bubblewrap().await
    } else if cfg!(target_os = "macos") {
        detect_sandbox_exec()
    } else {
        tracing::debug!("No isolation backend for {}", std::env::consts::OS);
        BackendKind::None
    };
    PlatformCapabilities::with_backend(backend)
}

async fn detect_bubblewrap() -> BackendKind {
    let version = Command::new("bwrap")
        .arg("--version")
        .stdin(Stdio::null())
        .output()
        .await;
    if !version.is_ok_and(|out| out.status.success()) {
        tracing::debug!("bwrap not found in PATH");
        return BackendKind::None;
    }

    // Namespaces can be unavailable even when the binary exists
    let preflight = bwrap_succeeds(&[
        "--ro-bind",
        "/",
        "/",
        "--unshare-net",
        "--unshare-pid",
        "--die-with-parent",
        "--",
        "true",
    ])
    .await;
    if !preflight {
        tracing::debug!("bwrap preflight failed; user namespaces are likely disabled");
        return BackendKind::None;
    }

    let proc_supported =
        bwrap_succeeds(&["--ro-bind", "/", "/", "--proc", "/proc", "--", "true"]).await;
    if !proc_supported {
        tracing::debug!("bwrap --proc /proc not supported, running without fresh procfs");
    }
    BackendKind::Bubblewrap { proc_supported }
}

async fn bwrap_succeeds(args: &[&str]) -> bool {
    Command::new("bwrap")
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .is_ok_and(|status| status.success())
}

fn detect_sandbox_exec() -> BackendKind {
    if Path::new(SANDBOX_EXEC_PATH).exists() {
        BackendKind::Seatbelt
    } else {
        tracing::debug!("{} not found", SANDBOX_EXEC_PATH);
        BackendKind::None
    }
}
