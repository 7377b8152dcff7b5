//! Builder assembling a [`TaskManager`] from configuration, an observer and
//! templates to pre-register.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{QueueKind, TaskConfig};
use crate::core::{
    Executable, RetryPolicy, SchedulerError, TaskManager, TaskTemplate, TransitionObserver,
};

/// Fluent construction of a [`TaskManager`].
///
/// ```rust,ignore
/// let manager = TaskManagerBuilder::<String>::new()
///     .max_workers(4)
///     .max_queue_size(256)
///     .queue(QueueKind::Fifo)
///     .template("ping", task_fn(|_ctx| async { Ok("pong".to_string()) }))
///     .build_started()?;
/// ```
pub struct TaskManagerBuilder<R: Clone + Send + 'static> {
    config: TaskConfig,
    observer: Option<Arc<dyn TransitionObserver>>,
    templates: Vec<TaskTemplate<R>>,
}

impl<R: Clone + Send + 'static> Default for TaskManagerBuilder<R> {
    fn default() -> Self {
        Self::from_config(TaskConfig::default())
    }
}

impl<R: Clone + Send + 'static> TaskManagerBuilder<R> {
    /// Start from the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    #[must_use]
    pub const fn from_config(config: TaskConfig) -> Self {
        Self {
            config,
            observer: None,
            templates: Vec::new(),
        }
    }

    /// Worker count.
    #[must_use]
    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.config.max_workers = max_workers;
        self
    }

    /// Queue capacity (`0` = unbounded).
    #[must_use]
    pub fn max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.config.max_queue_size = max_queue_size;
        self
    }

    /// Ordering discipline.
    #[must_use]
    pub fn queue(mut self, queue: QueueKind) -> Self {
        self.config.queue = queue;
        self
    }

    /// Default retry policy.
    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry_policy = policy;
        self
    }

    /// Default execution timeout.
    #[must_use]
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_default_timeout(timeout);
        self
    }

    /// Grace period for cancelling running tasks.
    #[must_use]
    pub fn cancel_grace(mut self, grace: Duration) -> Self {
        self.config = self.config.with_cancel_grace(grace);
        self
    }

    /// Transition observer; defaults to tracing output.
    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn TransitionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Register `work` under `name` when the manager is built.
    #[must_use]
    pub fn template<E: Executable<R>>(mut self, name: impl Into<String>, work: E) -> Self {
        self.templates.push(TaskTemplate::new(name, Arc::new(work)));
        self
    }

    /// Build the manager without starting it.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidConfig`], [`SchedulerError::DuplicateTemplate`]
    /// for a template name given twice, or [`SchedulerError::Internal`].
    pub fn build(self) -> Result<TaskManager<R>, SchedulerError> {
        let manager = match self.observer {
            Some(observer) => TaskManager::with_observer(self.config, observer)?,
            None => TaskManager::new(self.config)?,
        };
        for template in self.templates {
            manager.register_template(template)?;
        }
        Ok(manager)
    }

    /// Build and start the manager.
    ///
    /// # Errors
    ///
    /// As for [`build`](Self::build) and [`TaskManager::start`].
    pub fn build_started(self) -> Result<TaskManager<R>, SchedulerError> {
        let manager = self.build()?;
        manager.start()?;
        Ok(manager)
    }
}
