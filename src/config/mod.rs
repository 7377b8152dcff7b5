//! Configuration models for the manager, its queue, and retries.

pub mod task;

pub use task::{QueueKind, TaskConfig};
