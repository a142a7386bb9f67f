//! Single-writer async runtime and event stream APIs.

/// Event stream types emitted by the runtime.
pub mod events;
/// Handle and command loop implementation.
pub mod handle;

pub use events::MutationEvent;
pub use handle::{RuntimeError, WriterHandle, spawn_writer};
