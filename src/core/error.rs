//! Error types for scheduler operations and task attempts.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::task::TaskId;

/// How a work error should be treated by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Transient failure; the default classifier retries it.
    Retryable,
    /// Failure that will not go away by trying again.
    Permanent,
    /// The work did not say. Treated as non-retryable unless a custom
    /// classifier decides otherwise.
    Unclassified,
}

/// Failure of a single task attempt.
///
/// Stored in the task's result and shared with every waiter, hence `Clone`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The work itself returned an error.
    #[error("{message}")]
    Work {
        /// Error message reported by the work.
        message: String,
        /// Retry classification attached by the work.
        class: ErrorClass,
    },
    /// The attempt exceeded its execution timeout.
    #[error("task timed out after {0:?}")]
    Timeout(Duration),
    /// The work observed its cancellation token and stopped.
    #[error("task cancelled")]
    Cancelled,
    /// The work panicked; the payload message is kept.
    #[error("task panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    /// Unclassified work error.
    pub fn new(message: impl Into<String>) -> Self {
        Self::Work {
            message: message.into(),
            class: ErrorClass::Unclassified,
        }
    }

    /// Work error the default retry classifier will retry.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::Work {
            message: message.into(),
            class: ErrorClass::Retryable,
        }
    }

    /// Work error that is never retried by the default classifier.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Work {
            message: message.into(),
            class: ErrorClass::Permanent,
        }
    }

    /// Classification of a work error, `None` for scheduler-produced errors.
    #[must_use]
    pub const fn class(&self) -> Option<ErrorClass> {
        match self {
            Self::Work { class, .. } => Some(*class),
            _ => None,
        }
    }

    /// True for [`TaskError::Cancelled`].
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<anyhow::Error> for TaskError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(format!("{err:#}"))
    }
}

/// Errors produced by the scheduler API.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Non-blocking submit found the queue at capacity.
    #[error("queue full: capacity {0}")]
    QueueFull(usize),
    /// No task with this id is known to the manager.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
    /// Waiting for a task result timed out. The task itself is unaffected.
    #[error("timed out after {0:?} waiting for task")]
    WaitTimeout(Duration),
    /// The manager is stopped or stopping and accepts no new work.
    #[error("pool has been shut down")]
    PoolShutdown,
    /// A template with this name is already registered.
    #[error("duplicate template: {0}")]
    DuplicateTemplate(String),
    /// No template with this name is registered.
    #[error("template not found: {0}")]
    TemplateNotFound(String),
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Internal failure such as a worker thread that could not be spawned.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
