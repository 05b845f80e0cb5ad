//! Process registry
//!
//! Every agent run and tool process is spawned through the sandbox executor and
//! supervised here: output is captured into a bounded ring buffer, cancellation
//! escalates from SIGTERM to a forced kill, and rows disappear only after exit
//! and a final output flush.

mod entry;
mod output;
mod registry;
mod stream;
mod types;


pub use output::{OutputBuffer, ReadResult};
pub use registry::{ProcessRegistry, RegistrySettings};
pub use stream::OutputStream;
pub use types::{
    CancelOutcome, Drained, OutputChunk, OutputEvent, ProcessInfo, ProcessKind, ProcessStatus,
    RunId, SpawnSpec, StreamKind,
};
