//! Warden: checkpoints, sandboxing and process supervision for coding agents
//!
//! The implementation lives in `warden-core`; the `warden` binary is in `warden-cli`.

pub use warden_core::*;
