//! Ordering containers.
//!
//! [`TaskQueue`] (FIFO) and [`PriorityQueue`] share one blocking, bounded
//! implementation and differ only in their [`Discipline`].

pub mod bounded;
pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

pub use bounded::BoundedQueue;
pub use memory::{FifoOrder, PriorityOrder};

/// FIFO container.
pub type TaskQueue<T> = BoundedQueue<T, FifoOrder<T>>;

/// Priority container: highest priority first, FIFO among equals.
pub type PriorityQueue<T> = BoundedQueue<T, PriorityOrder<T>>;

/// Errors returned when putting into a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Non-blocking put found the container at capacity.
    #[error("queue full (capacity {0})")]
    Full(usize),
    /// The container was closed.
    #[error("queue closed")]
    Closed,
}

/// Items that carry a scheduling priority (higher is served first).
pub trait Prioritized {
    /// Priority of this item.
    fn priority(&self) -> i32;
}

impl<T: Prioritized + ?Sized> Prioritized for Arc<T> {
    fn priority(&self) -> i32 {
        (**self).priority()
    }
}

/// Storage and ordering rule behind a [`BoundedQueue`].
pub trait Discipline<T>: Send {
    /// Insert an item.
    fn push(&mut self, item: T);
    /// Remove the next item in order.
    fn pop(&mut self) -> Option<T>;
    /// Number of stored items.
    fn len(&self) -> usize;
    /// True when nothing is stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Remove every item, in the order `pop` would have returned them.
    fn drain_all(&mut self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.len());
        while let Some(item) = self.pop() {
            out.push(item);
        }
        out
    }
}

/// The contract shared by every container the manager can pull from.
pub trait OrderingContainer<T>: Send + Sync {
    /// Insert, blocking while the container is full.
    ///
    /// # Errors
    ///
    /// [`QueueError::Closed`] if the container is (or becomes) closed.
    fn put(&self, item: T) -> Result<(), QueueError>;

    /// Insert without blocking.
    ///
    /// # Errors
    ///
    /// [`QueueError::Full`] at capacity, [`QueueError::Closed`] once closed.
    fn try_put(&self, item: T) -> Result<(), QueueError>;

    /// Next item, blocking while empty. `None` once closed and empty.
    fn get(&self) -> Option<T>;

    /// Next item, waiting at most `timeout`.
    fn get_timeout(&self, timeout: Duration) -> Option<T>;

    /// Number of items currently held.
    fn size(&self) -> usize;

    /// True when a bounded container holds `capacity` items.
    fn is_full(&self) -> bool;

    /// Maximum number of items, `None` when unbounded.
    fn capacity(&self) -> Option<usize>;

    /// Acknowledge that an item returned by `get` has been processed.
    fn task_done(&self);

    /// Block until every accepted item was retrieved and acknowledged.
    fn join(&self);

    /// Like [`join`](Self::join) but gives up after `timeout`; `true` if drained.
    fn join_timeout(&self, timeout: Duration) -> bool;

    /// Reject further puts and wake every blocked caller. Items already held
    /// can still be retrieved.
    fn close(&self);

    /// True after [`close`](Self::close).
    fn is_closed(&self) -> bool;

    /// Remove and return every held item. Removed items count as acknowledged.
    fn drain(&self) -> Vec<T>;
}
