//! Per-session checkpoint timelines

mod persist;
mod tree;

#[cfg(test)]
mod tests;

pub use persist::TimelineStore;
pub use tree::{SessionTimeline, TimelineEntry};
