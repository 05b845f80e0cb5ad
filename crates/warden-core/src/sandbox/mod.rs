//! Sandboxing for agent-invoked processes
//!
//! A declarative capability set is compiled into a concrete rule list, which an
//! OS backend enforces from the first instruction of the launched process.

pub mod backends;
pub mod capabilities;
pub mod compiler;
pub mod evaluate;
pub mod executor;
pub mod platform;
pub mod presets;
pub mod rules;
pub mod violations;

pub use capabilities::{Capabilities, Capability};
pub use compiler::{ProfileContext, RuleConflict, SandboxProfile, compile, compile_for, validate};
pub use evaluate::Evaluation;
pub use executor::{CommandSpec, LaunchOptions, LaunchedProcess, SandboxExecutor};
pub use platform::{BackendKind, PlatformCapabilities, Primitive, probe_capabilities};
pub use presets::{ProfileCatalog, ProfileDefinition, ProfileSummary};
pub use rules::{
    ActionTarget, CustomRule, Decision, OperationClass, Platform, RuleTarget, SandboxAction,
    SandboxRule, TargetKind,
};
pub use violations::{ViolationDetector, ViolationEvent, ViolationStore};
