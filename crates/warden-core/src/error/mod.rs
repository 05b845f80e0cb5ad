//! Error types for Warden
//!
//! One error enum covers the checkpoint store, the sandbox compiler and executor, and
//! the process registry. Every error implements [`ErrorCode`], which gives callers a
//! stable code, the human message and optional structured context.

mod codes;
mod constructors;
mod conversions;
mod types;

pub use types::{ErrorCode, WardenError, WardenResult};
