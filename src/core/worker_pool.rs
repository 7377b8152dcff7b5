//! Worker pool running tasks on dedicated OS threads.
//!
//! Each worker owns a single-threaded tokio runtime and pulls from the shared
//! ordering container. A supervisor thread watches for workers that exit by
//! panicking and respawns them within a restart budget. Retries are re-enqueued
//! by a timer thread once their backoff elapses.
//!
//! The pieces in this module are shared between the workers, the supervisor and
//! the [`TaskManager`](crate::core::TaskManager): lock-free counters for
//! statistics, the active-slot counter bounding concurrent executions, and the
//! outstanding-task count a draining stop waits on.

mod native;
mod retry_timer;

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use crate::core::observer::TransitionObserver;
use crate::core::task::{Task, TaskId, TaskState};
use crate::infra::queue::OrderingContainer;

pub(crate) use native::WorkerPool;
pub(crate) use retry_timer::RetryTimer;

/// Queue type shared by the manager, the workers and the retry timer.
pub(crate) type SharedQueue<R> = Arc<dyn OrderingContainer<Arc<Task<R>>>>;

/// Statistics about pool utilization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Number of worker threads.
    pub worker_count: usize,
    /// Tasks executing right now.
    pub active_tasks: u64,
    /// Tasks waiting in the queue.
    pub queued_tasks: u64,
    /// Tasks accepted by `submit`.
    pub submitted_tasks: u64,
    /// Tasks that completed successfully.
    pub completed_tasks: u64,
    /// Tasks that failed terminally.
    pub failed_tasks: u64,
    /// Tasks that ended cancelled.
    pub cancelled_tasks: u64,
    /// Attempts handed back for a retry.
    pub retried_attempts: u64,
    /// Workers respawned after a crash.
    pub worker_restarts: u64,
}

/// Internal counters for pool statistics (thread-safe).
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub submitted_tasks: AtomicU64,
    pub completed_tasks: AtomicU64,
    pub failed_tasks: AtomicU64,
    pub cancelled_tasks: AtomicU64,
    pub retried_attempts: AtomicU64,
    pub worker_restarts: AtomicU64,
}

impl PoolCounters {
    /// Get a snapshot of current statistics.
    pub fn snapshot(&self, worker_count: usize, active: usize, queued: usize) -> PoolStats {
        PoolStats {
            worker_count,
            active_tasks: active as u64,
            queued_tasks: queued as u64,
            submitted_tasks: self.submitted_tasks.load(Ordering::Relaxed),
            completed_tasks: self.completed_tasks.load(Ordering::Relaxed),
            failed_tasks: self.failed_tasks.load(Ordering::Relaxed),
            cancelled_tasks: self.cancelled_tasks.load(Ordering::Relaxed),
            retried_attempts: self.retried_attempts.load(Ordering::Relaxed),
            worker_restarts: self.worker_restarts.load(Ordering::Relaxed),
        }
    }
}

/// Counter of executing tasks, never above `max`.
#[derive(Debug)]
pub(crate) struct ActiveSlots {
    active: AtomicUsize,
    max: usize,
}

impl ActiveSlots {
    pub const fn new(max: usize) -> Self {
        Self {
            active: AtomicUsize::new(0),
            max,
        }
    }

    /// Reserve a slot if one is free (lock-free CAS).
    pub fn try_acquire(&self) -> bool {
        let mut current = self.active.load(Ordering::Acquire);
        loop {
            if current >= self.max {
                return false;
            }
            match self.active.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Reserve a slot, yielding while the pool is transiently saturated.
    ///
    /// Workers and slots are one-to-one, so this only spins while a crashed
    /// worker's slot is being released.
    pub fn acquire(&self) {
        while !self.try_acquire() {
            std::thread::yield_now();
        }
    }

    pub fn release(&self) {
        let previous = self.active.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "released more slots than acquired");
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}

/// Number of accepted tasks that have not reached a terminal state.
#[derive(Debug, Default)]
pub(crate) struct Outstanding {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Outstanding {
    pub fn add(&self) {
        *self.count.lock() += 1;
    }

    pub fn done(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    pub fn count(&self) -> usize {
        *self.count.lock()
    }

    /// Block until no task is outstanding; `false` if `timeout` elapsed first.
    pub fn wait_idle(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut count = self.count.lock();
        while *count > 0 {
            match deadline {
                Some(deadline) => {
                    if self.idle.wait_until(&mut count, deadline).timed_out() {
                        return *count == 0;
                    }
                }
                None => self.idle.wait(&mut count),
            }
        }
        true
    }
}

/// Observer installed on every task: keeps the counters and the outstanding
/// count current, then forwards to the user's observer.
pub(crate) struct PoolObserver {
    counters: Arc<PoolCounters>,
    outstanding: Arc<Outstanding>,
    inner: Arc<dyn TransitionObserver>,
}

impl PoolObserver {
    pub fn new(
        counters: Arc<PoolCounters>,
        outstanding: Arc<Outstanding>,
        inner: Arc<dyn TransitionObserver>,
    ) -> Self {
        Self {
            counters,
            outstanding,
            inner,
        }
    }
}

impl TransitionObserver for PoolObserver {
    fn on_transition(&self, task_id: TaskId, from: TaskState, to: TaskState, attempt: u32) {
        match (from, to) {
            (_, TaskState::Completed) => {
                self.counters.completed_tasks.fetch_add(1, Ordering::Relaxed);
            }
            (_, TaskState::Failed) => {
                self.counters.failed_tasks.fetch_add(1, Ordering::Relaxed);
            }
            (_, TaskState::Cancelled) => {
                self.counters.cancelled_tasks.fetch_add(1, Ordering::Relaxed);
            }
            (TaskState::Running, TaskState::Pending) => {
                self.counters.retried_attempts.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
        // Released after the user's observer returns or unwinds, so a draining
        // stop never returns early and never hangs on a panicking observer.
        let _release = Release(to.is_terminal().then_some(&*self.outstanding));
        self.inner.on_transition(task_id, from, to, attempt);
    }
}

struct Release<'a>(Option<&'a Outstanding>);

impl Drop for Release<'_> {
    fn drop(&mut self) {
        if let Some(outstanding) = self.0 {
            outstanding.done();
        }
    }
}

/// State shared by the workers, the supervisor and the manager.
pub(crate) struct PoolShared<R> {
    pub queue: SharedQueue<R>,
    pub slots: ActiveSlots,
    pub counters: Arc<PoolCounters>,
    pub retry_timer: RetryTimer<R>,
    /// Set by a forced stop: dequeued tasks are cancelled instead of run.
    pub forced: AtomicBool,
    /// Set once any stop begins; crashed workers are no longer replaced.
    pub stopping: AtomicBool,
    pub max_worker_restarts: u32,
    pub thread_stack_size: usize,
}

impl<R> PoolShared<R> {
    pub fn is_forced(&self) -> bool {
        self.forced.load(Ordering::Acquire)
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }
}
