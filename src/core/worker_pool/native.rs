//! Worker threads and their supervisor.
//!
//! Every worker is a dedicated OS thread with its own single-threaded tokio
//! runtime, so async work never blocks a caller's runtime and blocking work
//! only stalls its own worker.
//!
//! - **No polling**: workers block in `get`; a closed queue ends the loop.
//! - **Panic isolation**: a panic in work is caught per attempt and stored as
//!   [`TaskError::Panicked`]. A worker that dies anyway reports its exit to the
//!   supervisor, which respawns it within the restart budget.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::core::error::{SchedulerError, TaskError};
use crate::core::task::{AttemptOutcome, Task, TaskContext};

use super::PoolShared;

/// Sent by a worker thread as it exits.
#[derive(Debug, Clone, Copy)]
struct WorkerExit {
    worker_id: usize,
    panicked: bool,
}

/// Fixed set of worker threads plus their supervisor.
pub(crate) struct WorkerPool<R> {
    shared: Arc<PoolShared<R>>,
    worker_count: usize,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl<R: Clone + Send + 'static> WorkerPool<R> {
    pub fn new(shared: Arc<PoolShared<R>>, worker_count: usize) -> Self {
        Self {
            shared,
            worker_count,
            supervisor: Mutex::new(None),
        }
    }

    pub const fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Spawn the workers and the supervisor.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Internal`] if a thread cannot be spawned. Workers
    /// spawned before the failure stay supervised.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let (exit_tx, exit_rx) = unbounded::<WorkerExit>();
        let mut workers = Vec::with_capacity(self.worker_count);
        let mut failure = None;

        for worker_id in 0..self.worker_count {
            match spawn_worker(worker_id, Arc::clone(&self.shared), exit_tx.clone()) {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        let spawned = workers.len();
        let supervisor = {
            let shared = Arc::clone(&self.shared);
            thread::Builder::new()
                .name("task-supervisor".into())
                .spawn(move || supervise(&shared, &exit_rx, &exit_tx, workers))
                .map_err(|e| {
                    SchedulerError::Internal(format!("failed to spawn supervisor: {e}"))
                })?
        };
        *self.supervisor.lock() = Some(supervisor);

        if let Some(e) = failure {
            return Err(e);
        }
        info!(
            worker_count = spawned,
            stack_size = self.shared.thread_stack_size,
            "worker pool started"
        );
        Ok(())
    }

    /// Wait up to `timeout` for every worker to exit.
    ///
    /// Workers that don't exit in time are detached; `false` is returned.
    pub fn join(&self, timeout: Duration) -> bool {
        let Some(supervisor) = self.supervisor.lock().take() else {
            return true;
        };
        // Join on a helper thread so a stuck worker cannot hang the caller.
        let (tx, rx) = std::sync::mpsc::channel();
        let joiner = thread::spawn(move || {
            let _ = tx.send(supervisor.join().is_ok());
        });
        match rx.recv_timeout(timeout) {
            Ok(true) => {
                let _ = joiner.join();
                debug!("workers joined");
                true
            }
            Ok(false) => {
                let _ = joiner.join();
                warn!("supervisor panicked");
                true
            }
            Err(_) => {
                warn!(?timeout, "workers did not exit within timeout, detaching");
                false
            }
        }
    }
}

fn spawn_worker<R: Clone + Send + 'static>(
    worker_id: usize,
    shared: Arc<PoolShared<R>>,
    exits: Sender<WorkerExit>,
) -> Result<JoinHandle<()>, SchedulerError> {
    let stack_size = shared.thread_stack_size;
    thread::Builder::new()
        .name(format!("task-worker-{worker_id}"))
        .stack_size(stack_size)
        .spawn(move || {
            let mut guard = WorkerGuard {
                worker_id,
                shared,
                exits,
                current: None,
            };
            worker_loop(&mut guard);
        })
        .map_err(|e| {
            SchedulerError::Internal(format!("failed to spawn worker {worker_id}: {e}"))
        })
}

/// Owns a worker's slot and in-flight task for the duration of an attempt.
///
/// Dropped at thread exit, including while unwinding: an attempt that was
/// still in flight is settled as panicked and the supervisor is told.
struct WorkerGuard<R: Clone + Send + 'static> {
    worker_id: usize,
    shared: Arc<PoolShared<R>>,
    exits: Sender<WorkerExit>,
    current: Option<(Arc<Task<R>>, TaskContext)>,
}

impl<R: Clone + Send + 'static> WorkerGuard<R> {
    fn finish_attempt(&mut self) {
        if self.current.take().is_some() {
            self.shared.slots.release();
            self.shared.queue.task_done();
        }
    }
}

impl<R: Clone + Send + 'static> Drop for WorkerGuard<R> {
    fn drop(&mut self) {
        let panicked = thread::panicking();
        if let Some((task, ctx)) = &self.current {
            error!(
                worker_id = self.worker_id,
                task_id = %task.id(),
                "worker crashed mid-attempt"
            );
            let outcome = task.settle(ctx, Err(TaskError::Panicked("worker crashed".into())));
            schedule_retry(&self.shared, task, outcome);
        }
        self.finish_attempt();
        let _ = self.exits.send(WorkerExit {
            worker_id: self.worker_id,
            panicked,
        });
    }
}

fn worker_loop<R: Clone + Send + 'static>(guard: &mut WorkerGuard<R>) {
    let worker_id = guard.worker_id;
    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(worker_id, error = %e, "failed to create worker runtime");
            return;
        }
    };
    debug!(worker_id, "worker started");

    while let Some(task) = guard.shared.queue.get() {
        if guard.shared.is_forced() {
            task.cancel_pending();
            guard.shared.queue.task_done();
            continue;
        }
        // Lost the claim, usually to a cancel while queued.
        let Some(ctx) = task.claim() else {
            guard.shared.queue.task_done();
            continue;
        };
        // Forced stop raced with the claim.
        if guard.shared.is_forced() {
            task.abort();
        }

        guard.shared.slots.acquire();
        guard.current = Some((Arc::clone(&task), ctx.clone()));
        debug!(
            worker_id,
            task_id = %task.id(),
            attempt = ctx.attempt(),
            "worker executing task"
        );

        let outcome = match catch_unwind(AssertUnwindSafe(|| rt.block_on(task.run(&ctx)))) {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(worker_id, task_id = %task.id(), panic = %message, "task panicked");
                task.settle(&ctx, Err(TaskError::Panicked(message)))
            }
        };

        schedule_retry(&guard.shared, &task, outcome);
        guard.finish_attempt();
    }

    debug!(worker_id, "worker exiting");
}

/// Hand a task that must run again to the retry timer. Cancelled instead once
/// the timer has shut down.
fn schedule_retry<R: Clone + Send + 'static>(
    shared: &PoolShared<R>,
    task: &Arc<Task<R>>,
    outcome: AttemptOutcome,
) {
    if let AttemptOutcome::Retry(delay) = outcome {
        if !shared.retry_timer.schedule(Arc::clone(task), delay) {
            task.cancel_pending();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

/// Waits for worker exits and replaces crashed workers until none are left.
fn supervise<R: Clone + Send + 'static>(
    shared: &Arc<PoolShared<R>>,
    exits: &Receiver<WorkerExit>,
    exit_tx: &Sender<WorkerExit>,
    mut workers: Vec<JoinHandle<()>>,
) {
    let mut live = workers.len();
    let mut next_id = workers.len();
    let mut restarts = 0u32;

    while live > 0 {
        let Ok(exit) = exits.recv() else {
            break;
        };
        live -= 1;
        if !exit.panicked {
            continue;
        }
        error!(worker_id = exit.worker_id, "worker thread crashed");
        if shared.is_stopping() {
            continue;
        }
        if restarts >= shared.max_worker_restarts {
            error!(
                worker_id = exit.worker_id,
                max_restarts = shared.max_worker_restarts,
                "worker restart budget exhausted, pool runs degraded"
            );
            continue;
        }
        match spawn_worker(next_id, Arc::clone(shared), exit_tx.clone()) {
            Ok(handle) => {
                restarts += 1;
                shared.counters.worker_restarts.fetch_add(1, Ordering::Relaxed);
                warn!(
                    replaced = exit.worker_id,
                    worker_id = next_id,
                    restarts,
                    "worker restarted"
                );
                workers.push(handle);
                next_id += 1;
                live += 1;
            }
            Err(e) => error!(error = %e, "failed to restart worker"),
        }
    }

    for handle in workers {
        let _ = handle.join();
    }
    debug!("supervisor exiting");
}
