//! Per-session checkpoint manager
//!
//! Creates checkpoints from the files on disk, restores them transactionally, and
//! keeps the session's timeline and message log in step with both.

mod core;
mod operations;


pub use core::CheckpointManager;
