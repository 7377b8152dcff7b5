//! `TaskManager`: the public face of the engine.
//!
//! A manager owns one ordering container, a fixed pool of worker threads, a
//! retry timer and a lookup table of every task it accepted. Managers are
//! plain values; create as many as needed and pass them around (usually in an
//! `Arc`).
//!
//! # Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use prometheus_task_engine::config::TaskConfig;
//! use prometheus_task_engine::core::{task_fn, SubmitOptions, TaskManager};
//!
//! let manager = TaskManager::<u64>::new(TaskConfig::new().with_max_workers(4))?;
//! manager.start()?;
//!
//! let handle = manager.submit(
//!     task_fn(|ctx| async move {
//!         ctx.checkpoint()?;
//!         Ok(42)
//!     }),
//!     SubmitOptions::new().with_priority(5),
//! )?;
//! let result = handle.wait(Some(Duration::from_secs(5)))?;
//! assert_eq!(result.value(), Some(&42));
//!
//! manager.stop(true);
//! ```

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::{QueueKind, TaskConfig};
use crate::core::error::SchedulerError;
use crate::core::executor::{Executable, TaskTemplate};
use crate::core::observer::{TracingObserver, TransitionObserver};
use crate::core::task::{SubmitOptions, Task, TaskHandle, TaskId, TaskResult, TaskState};
use crate::core::worker_pool::{
    ActiveSlots, Outstanding, PoolCounters, PoolObserver, PoolShared, PoolStats, RetryTimer,
    SharedQueue, WorkerPool,
};
use crate::infra::queue::{PriorityQueue, QueueError, TaskQueue};

const DEFAULT_TASK_NAME: &str = "task";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Running,
    Stopped,
}

/// Bounded worker pool with retry, cancellation and a template registry.
pub struct TaskManager<R: Clone + Send + 'static> {
    config: TaskConfig,
    shared: Arc<PoolShared<R>>,
    pool: WorkerPool<R>,
    observer: Arc<dyn TransitionObserver>,
    outstanding: Arc<Outstanding>,
    tasks: RwLock<HashMap<TaskId, Arc<Task<R>>>>,
    templates: RwLock<HashMap<String, TaskTemplate<R>>>,
    lifecycle: Mutex<Lifecycle>,
    accepting: AtomicBool,
}

impl<R: Clone + Send + 'static> TaskManager<R> {
    /// Create a manager that logs transitions through `tracing`.
    ///
    /// Workers are not running until [`start`](Self::start); tasks submitted
    /// before that wait in the queue.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidConfig`] for an invalid configuration,
    /// [`SchedulerError::Internal`] if the retry timer cannot be spawned.
    pub fn new(config: TaskConfig) -> Result<Self, SchedulerError> {
        Self::with_observer(config, Arc::new(TracingObserver))
    }

    /// Create a manager reporting every transition to `observer`.
    ///
    /// # Errors
    ///
    /// As for [`new`](Self::new).
    pub fn with_observer(
        config: TaskConfig,
        observer: Arc<dyn TransitionObserver>,
    ) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;

        let queue: SharedQueue<R> = match config.queue {
            QueueKind::Fifo => Arc::new(TaskQueue::<Arc<Task<R>>>::new(config.max_queue_size)),
            QueueKind::Priority => {
                Arc::new(PriorityQueue::<Arc<Task<R>>>::new(config.max_queue_size))
            }
        };
        let counters = Arc::new(PoolCounters::default());
        let outstanding = Arc::new(Outstanding::default());
        let shared = Arc::new(PoolShared {
            retry_timer: RetryTimer::spawn(Arc::clone(&queue))?,
            queue,
            slots: ActiveSlots::new(config.max_workers),
            counters: Arc::clone(&counters),
            forced: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            max_worker_restarts: config.max_worker_restarts,
            thread_stack_size: config.thread_stack_size,
        });
        let pool = WorkerPool::new(Arc::clone(&shared), config.max_workers);
        let observer: Arc<dyn TransitionObserver> = Arc::new(PoolObserver::new(
            counters,
            Arc::clone(&outstanding),
            observer,
        ));

        info!(
            max_workers = config.max_workers,
            max_queue_size = config.max_queue_size,
            queue = ?config.queue,
            "TaskManager created"
        );

        Ok(Self {
            config,
            shared,
            pool,
            observer,
            outstanding,
            tasks: RwLock::new(HashMap::new()),
            templates: RwLock::new(HashMap::new()),
            lifecycle: Mutex::new(Lifecycle::Created),
            accepting: AtomicBool::new(true),
        })
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &TaskConfig {
        &self.config
    }

    /// Spawn the worker threads. Calling it again while running is a no-op.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::PoolShutdown`] after [`stop`](Self::stop);
    /// [`SchedulerError::Internal`] if a thread cannot be spawned, in which
    /// case the manager is stopped.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut lifecycle = self.lifecycle.lock();
        match *lifecycle {
            Lifecycle::Running => Ok(()),
            Lifecycle::Stopped => Err(SchedulerError::PoolShutdown),
            Lifecycle::Created => {
                if let Err(e) = self.pool.start() {
                    warn!(error = %e, "worker pool failed to start, shutting down");
                    self.abort_outstanding(true);
                    self.pool.join(self.config.shutdown_join_timeout());
                    *lifecycle = Lifecycle::Stopped;
                    return Err(e);
                }
                *lifecycle = Lifecycle::Running;
                Ok(())
            }
        }
    }

    /// True between [`start`](Self::start) and [`stop`](Self::stop).
    #[must_use]
    pub fn is_running(&self) -> bool {
        *self.lifecycle.lock() == Lifecycle::Running
    }

    /// Stop the manager. New submissions fail with `PoolShutdown` from here on.
    ///
    /// With `drain`, queued and in-flight work (retries included) runs to a
    /// terminal state first. Without it, pending tasks are cancelled, running
    /// tasks are asked to cancel, and the call returns once the workers have
    /// exited or the join timeout elapsed.
    ///
    /// A manager that was never started has nothing to drain; its pending
    /// tasks are cancelled either way. Repeated calls are no-ops.
    pub fn stop(&self, drain: bool) {
        let mut lifecycle = self.lifecycle.lock();
        if *lifecycle == Lifecycle::Stopped {
            debug!("stop called on a stopped manager");
            return;
        }
        let was_running = *lifecycle == Lifecycle::Running;
        self.accepting.store(false, Ordering::Release);

        if drain && was_running {
            info!(outstanding = self.outstanding.count(), "draining task manager");
            self.outstanding.wait_idle(None);
            self.shared.stopping.store(true, Ordering::Release);
            self.shared.queue.close();
            for task in self.shared.retry_timer.shutdown(true) {
                task.cancel_pending();
            }
        } else {
            info!(outstanding = self.outstanding.count(), "stopping task manager without drain");
            self.abort_outstanding(true);
        }

        if was_running && !self.pool.join(self.config.shutdown_join_timeout()) {
            warn!("some workers were still busy at shutdown and have been detached");
        }
        *lifecycle = Lifecycle::Stopped;
        info!("task manager stopped");
    }

    /// Cancel everything not yet terminal and make the workers exit.
    fn abort_outstanding(&self, join_timer: bool) {
        self.accepting.store(false, Ordering::Release);
        self.shared.stopping.store(true, Ordering::Release);
        self.shared.forced.store(true, Ordering::Release);
        self.shared.queue.close();
        for task in self.shared.queue.drain() {
            task.cancel_pending();
        }
        for task in self.shared.retry_timer.shutdown(join_timer) {
            task.cancel_pending();
        }
        let tasks: Vec<_> = self.tasks.read().values().cloned().collect();
        for task in tasks {
            match task.status() {
                TaskState::Pending => {
                    task.cancel_pending();
                }
                TaskState::Running => task.abort(),
                _ => {}
            }
        }
    }

    /// Submit work. See [`submit_shared`](Self::submit_shared).
    ///
    /// # Errors
    ///
    /// As for [`submit_shared`](Self::submit_shared).
    pub fn submit<E: Executable<R>>(
        &self,
        work: E,
        options: SubmitOptions,
    ) -> Result<TaskHandle<R>, SchedulerError> {
        self.submit_shared(Arc::new(work), options)
    }

    /// Submit shared work as a new pending task.
    ///
    /// A blocking submit waits while the queue is full; a non-blocking one
    /// fails at once.
    ///
    /// The manager keeps every task it accepted, terminal ones included, so
    /// `status` and `wait` work by id after completion. A long-lived manager
    /// should call [`prune_finished`](Self::prune_finished) periodically.
    ///
    /// # Errors
    ///
    /// - [`SchedulerError::QueueFull`] for a non-blocking submit on a full queue
    /// - [`SchedulerError::PoolShutdown`] once the manager is stopping
    pub fn submit_shared(
        &self,
        work: Arc<dyn Executable<R>>,
        options: SubmitOptions,
    ) -> Result<TaskHandle<R>, SchedulerError> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(SchedulerError::PoolShutdown);
        }

        let SubmitOptions {
            name,
            priority,
            retry_policy,
            timeout,
            blocking,
        } = options;
        let task = Arc::new(Task::new(
            name.unwrap_or_else(|| DEFAULT_TASK_NAME.to_string()),
            priority,
            work,
            retry_policy.unwrap_or_else(|| self.config.retry_policy.clone()),
            timeout.or_else(|| self.config.default_timeout()),
            Arc::clone(&self.observer),
        ));
        let id = task.id();

        self.tasks.write().insert(id, Arc::clone(&task));
        self.outstanding.add();
        let put = if blocking {
            self.shared.queue.put(Arc::clone(&task))
        } else {
            self.shared.queue.try_put(Arc::clone(&task))
        };

        match put {
            Ok(()) => {
                self.shared.counters.submitted_tasks.fetch_add(1, Ordering::Relaxed);
                debug!(task_id = %id, name = task.name(), priority, "task submitted");
                Ok(TaskHandle::new(task, self.config.cancel_grace()))
            }
            Err(e) => {
                self.tasks.write().remove(&id);
                self.outstanding.done();
                match e {
                    QueueError::Full(capacity) => {
                        warn!(task_id = %id, capacity, "queue is full, submit rejected");
                        Err(SchedulerError::QueueFull(capacity))
                    }
                    QueueError::Closed => Err(SchedulerError::PoolShutdown),
                }
            }
        }
    }

    /// Register reusable work under `name`.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::DuplicateTemplate`] if the name is taken.
    pub fn register<E: Executable<R>>(
        &self,
        name: impl Into<String>,
        work: E,
    ) -> Result<TaskTemplate<R>, SchedulerError> {
        self.register_template(TaskTemplate::new(name, Arc::new(work)))
    }

    /// Register a prepared template, e.g. one carrying default options.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::DuplicateTemplate`] if the name is taken.
    pub fn register_template(
        &self,
        template: TaskTemplate<R>,
    ) -> Result<TaskTemplate<R>, SchedulerError> {
        match self.templates.write().entry(template.name().to_string()) {
            Entry::Occupied(entry) => Err(SchedulerError::DuplicateTemplate(entry.key().clone())),
            Entry::Vacant(entry) => {
                debug!(template = template.name(), "template registered");
                entry.insert(template.clone());
                Ok(template)
            }
        }
    }

    /// Registered template by name.
    #[must_use]
    pub fn template(&self, name: &str) -> Option<TaskTemplate<R>> {
        self.templates.read().get(name).cloned()
    }

    /// Submit a template. `None` uses the template's default options; options
    /// without a name take the template's name.
    ///
    /// # Errors
    ///
    /// As for [`submit_shared`](Self::submit_shared).
    pub fn submit_template(
        &self,
        template: &TaskTemplate<R>,
        options: Option<SubmitOptions>,
    ) -> Result<TaskHandle<R>, SchedulerError> {
        let options = match options {
            Some(options) if options.name.is_none() => options.with_name(template.name()),
            Some(options) => options,
            None => template.defaults().clone(),
        };
        self.submit_shared(template.work(), options)
    }

    /// Submit the template registered under `name`.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::TemplateNotFound`], or as for
    /// [`submit_shared`](Self::submit_shared).
    pub fn submit_named(
        &self,
        name: &str,
        options: Option<SubmitOptions>,
    ) -> Result<TaskHandle<R>, SchedulerError> {
        let template = self
            .template(name)
            .ok_or_else(|| SchedulerError::TemplateNotFound(name.to_string()))?;
        self.submit_template(&template, options)
    }

    fn lookup(&self, id: TaskId) -> Result<Arc<Task<R>>, SchedulerError> {
        self.tasks
            .read()
            .get(&id)
            .cloned()
            .ok_or(SchedulerError::TaskNotFound(id))
    }

    /// Cancel a task. See [`Task::cancel`]; the grace period comes from the
    /// configuration.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::TaskNotFound`] for an unknown id.
    pub fn cancel(&self, id: TaskId) -> Result<bool, SchedulerError> {
        let task = self.lookup(id)?;
        let cancelled = task.cancel(self.config.cancel_grace());
        debug!(task_id = %id, cancelled, "cancel requested");
        Ok(cancelled)
    }

    /// Block until the task is terminal.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::TaskNotFound`] for an unknown id,
    /// [`SchedulerError::WaitTimeout`] if `timeout` elapses first.
    pub fn wait(
        &self,
        id: TaskId,
        timeout: Option<Duration>,
    ) -> Result<TaskResult<R>, SchedulerError> {
        self.lookup(id)?.wait(timeout)
    }

    /// Current state of a task.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::TaskNotFound`] for an unknown id.
    pub fn status(&self, id: TaskId) -> Result<TaskState, SchedulerError> {
        Ok(self.lookup(id)?.status())
    }

    /// Handle to a known task.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::TaskNotFound`] for an unknown id.
    pub fn handle(&self, id: TaskId) -> Result<TaskHandle<R>, SchedulerError> {
        Ok(TaskHandle::new(self.lookup(id)?, self.config.cancel_grace()))
    }

    /// Forget terminal tasks; returns how many were removed.
    ///
    /// Handles already given out keep working.
    pub fn prune_finished(&self) -> usize {
        let mut tasks = self.tasks.write();
        let before = tasks.len();
        tasks.retain(|_, task| !task.status().is_terminal());
        let removed = before - tasks.len();
        drop(tasks);
        debug!(removed, "pruned finished tasks");
        removed
    }

    /// Number of tasks in the lookup table.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.read().len()
    }

    /// Current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.shared.counters.snapshot(
            self.pool.worker_count(),
            self.shared.slots.active(),
            self.shared.queue.size(),
        )
    }
}

impl<R: Clone + Send + 'static> Drop for TaskManager<R> {
    fn drop(&mut self) {
        // Signal shutdown but don't join: workers finish in the background.
        if *self.lifecycle.get_mut() != Lifecycle::Stopped {
            self.abort_outstanding(false);
            debug!("TaskManager dropped without stop, workers will be detached");
        }
    }
}
