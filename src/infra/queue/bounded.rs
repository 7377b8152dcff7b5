//! Blocking, bounded container over any [`Discipline`].
//!
//! One `parking_lot::Mutex` guards the items, the unfinished-work counter and
//! the closed flag. Three condvars signal "not empty", "not full" and "all
//! work acknowledged".

use std::marker::PhantomData;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use super::{Discipline, OrderingContainer, QueueError};

struct QueueState<D> {
    items: D,
    unfinished: usize,
    closed: bool,
}

/// Thread-safe container with optional capacity and `join`/`task_done` tracking.
pub struct BoundedQueue<T, D> {
    capacity: usize,
    state: Mutex<QueueState<D>>,
    not_empty: Condvar,
    not_full: Condvar,
    all_done: Condvar,
    _item: PhantomData<fn() -> T>,
}

impl<T, D> BoundedQueue<T, D>
where
    D: Discipline<T> + Default,
{
    /// Create a container holding at most `capacity` items (0 = unbounded).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(QueueState {
                items: D::default(),
                unfinished: 0,
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            all_done: Condvar::new(),
            _item: PhantomData,
        }
    }
}

impl<T, D> BoundedQueue<T, D>
where
    D: Discipline<T>,
{
    fn full(&self, state: &QueueState<D>) -> bool {
        self.capacity > 0 && state.items.len() >= self.capacity
    }

    fn push_locked(&self, mut state: MutexGuard<'_, QueueState<D>>, item: T) {
        state.items.push(item);
        state.unfinished += 1;
        drop(state);
        self.not_empty.notify_one();
    }

    fn pop_locked(&self, mut state: MutexGuard<'_, QueueState<D>>) -> Option<T> {
        let item = state.items.pop();
        drop(state);
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }
}

impl<T, D> OrderingContainer<T> for BoundedQueue<T, D>
where
    T: Send,
    D: Discipline<T>,
{
    fn put(&self, item: T) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(QueueError::Closed);
            }
            if !self.full(&state) {
                break;
            }
            self.not_full.wait(&mut state);
        }
        self.push_locked(state, item);
        Ok(())
    }

    fn try_put(&self, item: T) -> Result<(), QueueError> {
        let state = self.state.lock();
        if state.closed {
            return Err(QueueError::Closed);
        }
        if self.full(&state) {
            return Err(QueueError::Full(self.capacity));
        }
        self.push_locked(state, item);
        Ok(())
    }

    fn get(&self) -> Option<T> {
        let mut state = self.state.lock();
        while state.items.is_empty() {
            if state.closed {
                return None;
            }
            self.not_empty.wait(&mut state);
        }
        self.pop_locked(state)
    }

    fn get_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.state.lock();
        while state.items.is_empty() {
            if state.closed {
                return None;
            }
            match deadline {
                Some(deadline) => {
                    if self.not_empty.wait_until(&mut state, deadline).timed_out() {
                        break;
                    }
                }
                None => self.not_empty.wait(&mut state),
            }
        }
        self.pop_locked(state)
    }

    fn size(&self) -> usize {
        self.state.lock().items.len()
    }

    fn is_full(&self) -> bool {
        self.full(&self.state.lock())
    }

    fn capacity(&self) -> Option<usize> {
        (self.capacity > 0).then_some(self.capacity)
    }

    fn task_done(&self) {
        let mut state = self.state.lock();
        if state.unfinished == 0 {
            tracing::warn!("task_done called more times than items were retrieved");
            return;
        }
        state.unfinished -= 1;
        if state.unfinished == 0 {
            self.all_done.notify_all();
        }
    }

    fn join(&self) {
        let mut state = self.state.lock();
        while state.unfinished > 0 {
            self.all_done.wait(&mut state);
        }
    }

    fn join_timeout(&self, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.join();
            return true;
        };
        let mut state = self.state.lock();
        while state.unfinished > 0 {
            if self.all_done.wait_until(&mut state, deadline).timed_out() {
                return state.unfinished == 0;
            }
        }
        true
    }

    fn close(&self) {
        self.state.lock().closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn drain(&self) -> Vec<T> {
        let mut state = self.state.lock();
        let items = state.items.drain_all();
        state.unfinished = state.unfinished.saturating_sub(items.len());
        let done = state.unfinished == 0;
        drop(state);
        self.not_full.notify_all();
        if done {
            self.all_done.notify_all();
        }
        items
    }
}
