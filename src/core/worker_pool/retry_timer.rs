//! Delayed re-enqueue of retried tasks.
//!
//! One thread sleeps on a condvar until the earliest due retry, then puts the
//! task back into the ordering container. Workers never sleep through a
//! backoff, so a slot is not held while a task waits for its retry.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::core::error::SchedulerError;
use crate::core::task::{Task, TaskState};

use super::SharedQueue;

struct DueRetry<R> {
    at: Instant,
    seq: u64,
    task: Arc<Task<R>>,
}

impl<R> PartialEq for DueRetry<R> {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl<R> Eq for DueRetry<R> {}

impl<R> PartialOrd for DueRetry<R> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<R> Ord for DueRetry<R> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at.cmp(&other.at).then(self.seq.cmp(&other.seq))
    }
}

struct TimerState<R> {
    due: BinaryHeap<Reverse<DueRetry<R>>>,
    next_seq: u64,
    shutdown: bool,
}

struct TimerInner<R> {
    state: Mutex<TimerState<R>>,
    wake: Condvar,
    queue: SharedQueue<R>,
}

/// Re-enqueues tasks once their retry delay has elapsed.
pub(crate) struct RetryTimer<R> {
    inner: Arc<TimerInner<R>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl<R: Clone + Send + 'static> RetryTimer<R> {
    /// Spawn the timer thread feeding `queue`.
    pub fn spawn(queue: SharedQueue<R>) -> Result<Self, SchedulerError> {
        let inner = Arc::new(TimerInner {
            state: Mutex::new(TimerState {
                due: BinaryHeap::new(),
                next_seq: 0,
                shutdown: false,
            }),
            wake: Condvar::new(),
            queue,
        });
        let thread = {
            let inner = Arc::clone(&inner);
            thread::Builder::new()
                .name("task-retry-timer".into())
                .spawn(move || run_timer(&inner))
                .map_err(|e| SchedulerError::Internal(format!("failed to spawn retry timer: {e}")))?
        };
        Ok(Self {
            inner,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Put `task` back into the queue after `delay`.
    ///
    /// Returns `false` once the timer has been shut down; the caller then owns
    /// the task's fate.
    pub fn schedule(&self, task: Arc<Task<R>>, delay: Duration) -> bool {
        let now = Instant::now();
        let at = now.checked_add(delay).unwrap_or(now);
        let mut state = self.inner.state.lock();
        if state.shutdown {
            return false;
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        debug!(task_id = %task.id(), ?delay, "retry scheduled");
        state.due.push(Reverse(DueRetry { at, seq, task }));
        drop(state);
        self.inner.wake.notify_one();
        true
    }

    /// Stop the timer and hand back every retry that had not fired yet.
    ///
    /// With `join` the call waits for the timer thread to exit; the queue must
    /// already be closed, or a blocked re-enqueue could hold it up.
    pub fn shutdown(&self, join: bool) -> Vec<Arc<Task<R>>> {
        let leftovers = {
            let mut state = self.inner.state.lock();
            state.shutdown = true;
            state.due.drain().map(|Reverse(due)| due.task).collect()
        };
        self.inner.wake.notify_all();
        if join {
            if let Some(handle) = self.thread.lock().take() {
                if handle.join().is_err() {
                    warn!("retry timer thread panicked");
                }
            }
        }
        leftovers
    }
}

fn run_timer<R: Clone + Send + 'static>(inner: &TimerInner<R>) {
    let mut state = inner.state.lock();
    loop {
        if state.shutdown {
            break;
        }
        let next_at = state.due.peek().map(|Reverse(due)| due.at);
        match next_at {
            None => inner.wake.wait(&mut state),
            Some(at) if at > Instant::now() => {
                let _ = inner.wake.wait_until(&mut state, at);
            }
            Some(_) => {
                let Some(Reverse(due)) = state.due.pop() else {
                    continue;
                };
                drop(state);
                requeue(&inner.queue, due.task);
                state = inner.state.lock();
            }
        }
    }
    debug!("retry timer exiting");
}

fn requeue<R: Clone + Send + 'static>(queue: &SharedQueue<R>, task: Arc<Task<R>>) {
    // Cancelled while waiting for the delay.
    if task.status() != TaskState::Pending {
        return;
    }
    let id = task.id();
    if let Err(e) = queue.put(Arc::clone(&task)) {
        debug!(task_id = %id, error = %e, "retry dropped, queue unavailable");
        task.cancel_pending();
    }
}
