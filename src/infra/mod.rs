//! Infrastructure: the ordering containers tasks wait in.

pub mod queue;

pub use queue::{OrderingContainer, PriorityQueue, QueueError, TaskQueue};
