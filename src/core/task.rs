//! Task identity, state machine and results.
//!
//! A task's `state` lives in an atomic and only ever changes through a single
//! compare-and-set. Whoever wins the CAS owns the side effects of the
//! transition (result storage, observer notification); the loser does nothing.
//!
//! ```text
//! PENDING -> RUNNING -> COMPLETED | FAILED
//! PENDING -> CANCELLED
//! RUNNING -> CANCELLED   (cooperative)
//! RUNNING -> PENDING     (retry)
//! ```

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::error::{SchedulerError, TaskError};
use crate::core::executor::Executable;
use crate::core::observer::TransitionObserver;
use crate::core::retry::{RetryDecision, RetryPolicy};
use crate::infra::queue::Prioritized;
use crate::util::clock::now_ms;

/// Unique task identifier, assigned at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum TaskState {
    /// Waiting in the queue (or for a retry delay).
    Pending = 0,
    /// Claimed by a worker and executing.
    Running = 1,
    /// Finished successfully.
    Completed = 2,
    /// Finished with an error and no retry left.
    Failed = 3,
    /// Cancelled before or during execution.
    Cancelled = 4,
}

impl TaskState {
    /// `Completed`, `Failed` and `Cancelled` are terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Pending,
            1 => Self::Running,
            2 => Self::Completed,
            3 => Self::Failed,
            _ => Self::Cancelled,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-attempt context handed to [`Executable::execute`].
#[derive(Debug, Clone)]
pub struct TaskContext {
    task_id: TaskId,
    attempt: u32,
    token: CancellationToken,
}

impl TaskContext {
    /// Context for running work outside a manager, e.g. in tests.
    #[must_use]
    pub fn detached(task_id: TaskId, attempt: u32) -> Self {
        Self {
            task_id,
            attempt,
            token: CancellationToken::new(),
        }
    }

    /// Task being executed.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Attempt number, starting at 1.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// True once cancellation (or a timeout) was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves when cancellation is requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// `Err(TaskError::Cancelled)` if cancellation was requested.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Cancelled`] once the token has been tripped.
    pub fn checkpoint(&self) -> Result<(), TaskError> {
        if self.is_cancelled() {
            Err(TaskError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Underlying token, for handing to libraries that accept one.
    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Terminal result of a task.
#[derive(Debug, Clone)]
pub struct TaskResult<R> {
    /// Task the result belongs to.
    pub task_id: TaskId,
    /// Terminal state.
    pub status: TaskState,
    /// Value on success, last error otherwise.
    pub outcome: Result<R, TaskError>,
    /// Time from the first start to completion; zero if the task never ran.
    pub duration: Duration,
    /// Attempts made.
    pub attempt: u32,
}

impl<R> TaskResult<R> {
    /// Value of a completed task.
    #[must_use]
    pub const fn value(&self) -> Option<&R> {
        match &self.outcome {
            Ok(v) => Some(v),
            Err(_) => None,
        }
    }

    /// Error of a failed or cancelled task.
    #[must_use]
    pub const fn error(&self) -> Option<&TaskError> {
        match &self.outcome {
            Ok(_) => None,
            Err(e) => Some(e),
        }
    }

    /// True when the task completed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.status, TaskState::Completed)
    }
}

/// Per-submit settings. Unset fields fall back to the manager's configuration.
#[derive(Debug, Clone)]
pub struct SubmitOptions {
    /// Task label; defaults to `"task"`.
    pub name: Option<String>,
    /// Higher is served first.
    pub priority: i32,
    /// Retry policy override.
    pub retry_policy: Option<RetryPolicy>,
    /// Execution timeout override.
    pub timeout: Option<Duration>,
    /// Block while the queue is full instead of failing with `QueueFull`.
    pub blocking: bool,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            name: None,
            priority: 0,
            retry_policy: None,
            timeout: None,
            blocking: true,
        }
    }
}

impl SubmitOptions {
    /// Defaults: priority 0, blocking submit, manager-wide retry and timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the task label.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Override the execution timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Fail with `QueueFull` instead of blocking when the queue is at capacity.
    #[must_use]
    pub fn non_blocking(mut self) -> Self {
        self.blocking = false;
        self
    }
}

/// Result of one call to [`Task::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The task reached this terminal state.
    Finished(TaskState),
    /// The task is pending again and should be re-enqueued after the delay.
    Retry(Duration),
}

struct AtomicState(AtomicU8);

impl AtomicState {
    const fn new(state: TaskState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn load(&self) -> TaskState {
        TaskState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn compare_exchange(&self, from: TaskState, to: TaskState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

struct TaskRecord<R> {
    attempt: u32,
    started_at_ms: Option<u128>,
    completed_at_ms: Option<u128>,
    first_started: Option<Instant>,
    last_error: Option<TaskError>,
    token: CancellationToken,
    result: Option<TaskResult<R>>,
}

/// A unit of submitted work with identity and a lifecycle state.
pub struct Task<R> {
    id: TaskId,
    name: String,
    priority: i32,
    work: Arc<dyn Executable<R>>,
    retry_policy: RetryPolicy,
    timeout: Option<Duration>,
    created_at_ms: u128,
    state: AtomicState,
    aborted: AtomicBool,
    record: Mutex<TaskRecord<R>>,
    changed: Condvar,
    observer: Arc<dyn TransitionObserver>,
}

impl<R> fmt::Debug for Task<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("state", &self.state.load())
            .finish_non_exhaustive()
    }
}

impl<R> Prioritized for Task<R> {
    fn priority(&self) -> i32 {
        self.priority
    }
}

impl<R: Clone + Send + 'static> Task<R> {
    /// Create a pending task.
    ///
    /// `observer` receives every transition this task makes.
    pub fn new(
        name: impl Into<String>,
        priority: i32,
        work: Arc<dyn Executable<R>>,
        retry_policy: RetryPolicy,
        timeout: Option<Duration>,
        observer: Arc<dyn TransitionObserver>,
    ) -> Self {
        Self {
            id: TaskId::new(),
            name: name.into(),
            priority,
            work,
            retry_policy,
            timeout,
            created_at_ms: now_ms(),
            state: AtomicState::new(TaskState::Pending),
            aborted: AtomicBool::new(false),
            record: Mutex::new(TaskRecord {
                attempt: 0,
                started_at_ms: None,
                completed_at_ms: None,
                first_started: None,
                last_error: None,
                token: CancellationToken::new(),
                result: None,
            }),
            changed: Condvar::new(),
            observer,
        }
    }

    /// Task identifier.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Human-readable label.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Scheduling priority.
    #[must_use]
    pub const fn priority(&self) -> i32 {
        self.priority
    }

    /// Current state; safe to call from any thread.
    #[must_use]
    pub fn status(&self) -> TaskState {
        self.state.load()
    }

    /// Attempts started so far.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.record.lock().attempt
    }

    /// Creation time, ms since epoch.
    #[must_use]
    pub const fn created_at_ms(&self) -> u128 {
        self.created_at_ms
    }

    /// Time the first attempt started, ms since epoch.
    #[must_use]
    pub fn started_at_ms(&self) -> Option<u128> {
        self.record.lock().started_at_ms
    }

    /// Time the task reached its terminal state, ms since epoch.
    #[must_use]
    pub fn completed_at_ms(&self) -> Option<u128> {
        self.record.lock().completed_at_ms
    }

    /// Error of the most recent failed attempt, retried or not.
    #[must_use]
    pub fn last_error(&self) -> Option<TaskError> {
        self.record.lock().last_error.clone()
    }

    /// Terminal result, once available.
    #[must_use]
    pub fn result(&self) -> Option<TaskResult<R>> {
        self.record.lock().result.clone()
    }

    /// Block until the task is terminal.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::WaitTimeout`] if `timeout` elapses first.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<TaskResult<R>, SchedulerError> {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut record = self.record.lock();
        loop {
            if let Some(result) = &record.result {
                return Ok(result.clone());
            }
            match deadline {
                Some(deadline) => {
                    if self.changed.wait_until(&mut record, deadline).timed_out()
                        && record.result.is_none()
                    {
                        return Err(SchedulerError::WaitTimeout(timeout.unwrap_or_default()));
                    }
                }
                None => self.changed.wait(&mut record),
            }
        }
    }

    /// Cancel the task.
    ///
    /// A pending task is cancelled immediately and never executes. For a
    /// running task the cancellation token is tripped and the call waits up to
    /// `grace` for the work to acknowledge it. Returns `true` only if the task
    /// ends up `Cancelled`; a terminal state is never overwritten.
    ///
    /// Work that ignores the token is left alone: it completes or fails
    /// normally and the refused request has no further effect.
    pub fn cancel(&self, grace: Duration) -> bool {
        let now = Instant::now();
        let deadline = now.checked_add(grace).unwrap_or(now);
        loop {
            match self.status() {
                TaskState::Pending => {
                    if self.cancel_pending() {
                        return true;
                    }
                }
                TaskState::Running => {
                    self.record.lock().token.cancel();
                    let mut record = self.record.lock();
                    while self.status() == TaskState::Running {
                        if self.changed.wait_until(&mut record, deadline).timed_out() {
                            break;
                        }
                    }
                    drop(record);
                    match self.status() {
                        // retried between our check and the request
                        TaskState::Pending => {}
                        TaskState::Running => return false,
                        state => return state == TaskState::Cancelled,
                    }
                }
                state => return state == TaskState::Cancelled,
            }
        }
    }

    /// Abort without waiting: trip the token, end the current attempt as
    /// `Cancelled` whatever it returns, and never retry. Used by a forced stop.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
        self.record.lock().token.cancel();
    }

    /// Move `Pending -> Cancelled`; `false` if the task was not pending.
    pub(crate) fn cancel_pending(&self) -> bool {
        self.finish(TaskState::Pending, TaskState::Cancelled, Err(TaskError::Cancelled))
    }

    /// Claim the task for execution (`Pending -> Running`).
    ///
    /// Returns the context for the new attempt, or `None` if another party
    /// (usually a cancel) got there first.
    pub fn claim(&self) -> Option<TaskContext> {
        if !self.state.compare_exchange(TaskState::Pending, TaskState::Running) {
            return None;
        }
        let ctx = {
            let mut record = self.record.lock();
            record.attempt += 1;
            record.started_at_ms.get_or_insert_with(now_ms);
            record.first_started.get_or_insert_with(Instant::now);
            record.token = CancellationToken::new();
            if self.aborted.load(Ordering::Acquire) {
                record.token.cancel();
            }
            self.changed.notify_all();
            TaskContext {
                task_id: self.id,
                attempt: record.attempt,
                token: record.token.clone(),
            }
        };
        self.notify(TaskState::Pending, TaskState::Running, ctx.attempt);
        Some(ctx)
    }

    /// Execute the work for the claimed attempt and settle the outcome.
    ///
    /// Errors from the work are stored, never propagated. A timeout trips the
    /// context's token and fails the attempt with [`TaskError::Timeout`].
    /// Work that blocks the worker cannot be interrupted, so an attempt that
    /// returns after its deadline is failed the same way.
    pub async fn run(&self, ctx: &TaskContext) -> AttemptOutcome {
        let work = self.work.execute(ctx.clone());
        let outcome = match self.timeout {
            Some(limit) => {
                let started = Instant::now();
                match tokio::time::timeout(limit, work).await {
                    Ok(_) if started.elapsed() > limit => {
                        ctx.token.cancel();
                        Err(TaskError::Timeout(limit))
                    }
                    Ok(outcome) => outcome,
                    Err(_) => {
                        ctx.token.cancel();
                        Err(TaskError::Timeout(limit))
                    }
                }
            }
            None => work.await,
        };
        self.settle(ctx, outcome)
    }

    /// Apply the outcome of a claimed attempt.
    pub(crate) fn settle(
        &self,
        ctx: &TaskContext,
        outcome: Result<R, TaskError>,
    ) -> AttemptOutcome {
        let error = match outcome {
            Ok(value) => {
                self.finish(TaskState::Running, TaskState::Completed, Ok(value));
                return AttemptOutcome::Finished(self.status());
            }
            Err(error) => error,
        };

        if error.is_cancelled() || self.aborted.load(Ordering::Acquire) {
            self.record.lock().last_error = Some(error);
            self.finish(TaskState::Running, TaskState::Cancelled, Err(TaskError::Cancelled));
            return AttemptOutcome::Finished(self.status());
        }

        match self.retry_policy.decide(&error, ctx.attempt) {
            RetryDecision::Retry(delay) => {
                self.record.lock().last_error = Some(error);
                if self.transition(TaskState::Running, TaskState::Pending, ctx.attempt) {
                    AttemptOutcome::Retry(delay)
                } else {
                    AttemptOutcome::Finished(self.status())
                }
            }
            RetryDecision::GiveUp => {
                self.record.lock().last_error = Some(error.clone());
                self.finish(TaskState::Running, TaskState::Failed, Err(error));
                AttemptOutcome::Finished(self.status())
            }
        }
    }

    fn transition(&self, from: TaskState, to: TaskState, attempt: u32) -> bool {
        if !self.state.compare_exchange(from, to) {
            return false;
        }
        {
            let _record = self.record.lock();
            self.changed.notify_all();
        }
        self.notify(from, to, attempt);
        true
    }

    /// Terminal transition: CAS, then store the result. Losers store nothing.
    fn finish(&self, from: TaskState, to: TaskState, outcome: Result<R, TaskError>) -> bool {
        if !self.state.compare_exchange(from, to) {
            return false;
        }
        let attempt = {
            let mut record = self.record.lock();
            let completed_at = *record.completed_at_ms.get_or_insert_with(now_ms);
            let duration = record
                .first_started
                .map(|started| started.elapsed())
                .unwrap_or_default();
            tracing::trace!(task_id = %self.id, completed_at, ?duration, "task finished");
            record.result = Some(TaskResult {
                task_id: self.id,
                status: to,
                outcome,
                duration,
                attempt: record.attempt,
            });
            self.changed.notify_all();
            record.attempt
        };
        self.notify(from, to, attempt);
        true
    }

    fn notify(&self, from: TaskState, to: TaskState, attempt: u32) {
        let observer = &self.observer;
        let call = catch_unwind(AssertUnwindSafe(|| {
            observer.on_transition(self.id, from, to, attempt);
        }));
        if call.is_err() {
            tracing::error!(task_id = %self.id, %from, %to, "transition observer panicked");
        }
    }
}

/// Caller-side handle to a submitted task.
pub struct TaskHandle<R> {
    task: Arc<Task<R>>,
    cancel_grace: Duration,
}

impl<R> Clone for TaskHandle<R> {
    fn clone(&self) -> Self {
        Self {
            task: Arc::clone(&self.task),
            cancel_grace: self.cancel_grace,
        }
    }
}

impl<R> fmt::Debug for TaskHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle").field("task", &self.task).finish()
    }
}

impl<R: Clone + Send + 'static> TaskHandle<R> {
    pub(crate) const fn new(task: Arc<Task<R>>, cancel_grace: Duration) -> Self {
        Self { task, cancel_grace }
    }

    /// Task identifier.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.task.id()
    }

    /// Current state.
    #[must_use]
    pub fn status(&self) -> TaskState {
        self.task.status()
    }

    /// Attempts started so far.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.task.attempt()
    }

    /// Cancel the task, waiting up to the manager's grace period if it runs.
    #[must_use = "cancellation of a running task can be refused"]
    pub fn cancel(&self) -> bool {
        self.task.cancel(self.cancel_grace)
    }

    /// Block until the task is terminal.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::WaitTimeout`] if `timeout` elapses first.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<TaskResult<R>, SchedulerError> {
        self.task.wait(timeout)
    }

    /// The underlying task.
    #[must_use]
    pub const fn task(&self) -> &Arc<Task<R>> {
        &self.task
    }
}
