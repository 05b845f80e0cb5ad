//! Sandbox violation reporting
//!
//! Denials show up as error messages on the confined process's stderr. The
//! detector turns them into structured events, the store keeps the recent ones.

mod detector;
mod store;
mod types;

pub use detector::ViolationDetector;
pub use store::{SharedViolationStore, ViolationStore};
pub use types::ViolationEvent;
