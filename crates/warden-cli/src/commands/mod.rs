//! CLI commands

pub mod checkpoint;
pub mod config;
pub mod run;
pub mod sandbox;
