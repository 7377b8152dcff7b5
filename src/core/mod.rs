//! Tasks, their execution, and the manager that schedules them.

pub mod error;
pub mod executor;
pub mod manager;
pub mod observer;
pub mod periodic;
pub mod retry;
pub mod task;
mod worker_pool;

pub use error::{AppResult, ErrorClass, SchedulerError, TaskError};
pub use executor::{blocking_fn, task_fn, BlockingFn, Executable, FnExecutable, TaskTemplate};
pub use manager::TaskManager;
pub use observer::{
    InMemoryObserver, NoopObserver, TracingObserver, TransitionObserver, TransitionRecord,
};
pub use periodic::{PeriodicHandle, PeriodicTrigger};
pub use retry::{RetryClassifier, RetryDecision, RetryPolicy};
pub use task::{
    AttemptOutcome, SubmitOptions, Task, TaskContext, TaskHandle, TaskId, TaskResult, TaskState,
};
pub use worker_pool::PoolStats;
