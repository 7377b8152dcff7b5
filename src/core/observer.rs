//! Transition observers.
//!
//! Every state change of every task is reported synchronously to a
//! [`TransitionObserver`]. Observers run on scheduler threads and must return
//! quickly; hand slow work off to a channel or another thread.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::core::task::{TaskId, TaskState};
use crate::util::clock::now_ms;

/// Observer hook consumed by loggers and metrics collectors.
pub trait TransitionObserver: Send + Sync {
    /// Called after `task_id` moved from `from` to `to` during attempt `attempt`.
    fn on_transition(&self, task_id: TaskId, from: TaskState, to: TaskState, attempt: u32);
}

/// Observer that ignores every transition.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl TransitionObserver for NoopObserver {
    fn on_transition(&self, _task_id: TaskId, _from: TaskState, _to: TaskState, _attempt: u32) {}
}

/// Observer that emits one `tracing` event per transition.
///
/// Terminal failures are logged at `warn`, everything else at `debug`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl TransitionObserver for TracingObserver {
    fn on_transition(&self, task_id: TaskId, from: TaskState, to: TaskState, attempt: u32) {
        if to == TaskState::Failed {
            tracing::warn!(task_id = %task_id, %from, %to, attempt, "task failed");
        } else {
            tracing::debug!(task_id = %task_id, %from, %to, attempt, "task transition");
        }
    }
}

/// One recorded transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRecord {
    /// Task that changed state.
    pub task_id: TaskId,
    /// State before the change.
    pub from: TaskState,
    /// State after the change.
    pub to: TaskState,
    /// Attempt number at the time of the change.
    pub attempt: u32,
    /// Timestamp milliseconds.
    pub at_ms: u128,
}

/// In-memory observer for testing and dev, bounded to the newest `max_events`.
pub struct InMemoryObserver {
    events: Mutex<VecDeque<TransitionRecord>>,
    max_events: usize,
}

impl InMemoryObserver {
    /// Create a new in-memory observer with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(max_events.min(1024))),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored transitions, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<TransitionRecord> {
        self.events.lock().iter().cloned().collect()
    }

    /// Transitions recorded for a single task, oldest first.
    #[must_use]
    pub fn transitions_for(&self, task_id: TaskId) -> Vec<TransitionRecord> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.task_id == task_id)
            .cloned()
            .collect()
    }
}

impl TransitionObserver for InMemoryObserver {
    fn on_transition(&self, task_id: TaskId, from: TaskState, to: TaskState, attempt: u32) {
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(TransitionRecord {
            task_id,
            from,
            to,
            attempt,
            at_ms: now_ms(),
        });
    }
}
