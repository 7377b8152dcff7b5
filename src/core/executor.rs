//! The `Executable` capability and its closure adapters.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::error::TaskError;
use crate::core::task::{SubmitOptions, TaskContext};

/// Work the manager can run.
///
/// Arguments are bound at construction time (struct fields or closure
/// captures). `execute` is called once per attempt, so an implementation that
/// is retried must be callable more than once.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use prometheus_task_engine::core::{Executable, TaskContext, TaskError};
///
/// struct Resize {
///     path: String,
///     width: u32,
/// }
///
/// #[async_trait]
/// impl Executable<String> for Resize {
///     async fn execute(&self, ctx: TaskContext) -> Result<String, TaskError> {
///         ctx.checkpoint()?;
///         Ok(format!("{} resized to {}", self.path, self.width))
///     }
/// }
/// ```
#[async_trait]
pub trait Executable<R>: Send + Sync + 'static {
    /// Run one attempt.
    ///
    /// Long-running work should poll [`TaskContext::is_cancelled`] (or await
    /// [`TaskContext::cancelled`]) and return [`TaskError::Cancelled`] when
    /// asked to stop.
    ///
    /// # Threading
    ///
    /// Called on a dedicated worker thread driving its own single-threaded
    /// tokio runtime, so blocking here stalls only that worker.
    async fn execute(&self, ctx: TaskContext) -> Result<R, TaskError>;
}

/// Adapter turning an async closure into an [`Executable`]. See [`task_fn`].
pub struct FnExecutable<F>(F);

#[async_trait]
impl<R, F, Fut> Executable<R> for FnExecutable<F>
where
    R: Send + 'static,
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, TaskError>> + Send + 'static,
{
    async fn execute(&self, ctx: TaskContext) -> Result<R, TaskError> {
        (self.0)(ctx).await
    }
}

/// Wrap an async closure as work.
///
/// ```rust,ignore
/// let work = task_fn(|ctx| async move {
///     tokio::time::sleep(Duration::from_millis(50)).await;
///     ctx.checkpoint()?;
///     Ok(42)
/// });
/// ```
pub const fn task_fn<R, F, Fut>(f: F) -> FnExecutable<F>
where
    F: Fn(TaskContext) -> Fut,
    Fut: Future<Output = Result<R, TaskError>>,
{
    FnExecutable(f)
}

/// Adapter turning a synchronous closure into an [`Executable`]. See [`blocking_fn`].
pub struct BlockingFn<F>(F);

#[async_trait]
impl<R, F> Executable<R> for BlockingFn<F>
where
    R: Send + 'static,
    F: Fn(&TaskContext) -> Result<R, TaskError> + Send + Sync + 'static,
{
    async fn execute(&self, ctx: TaskContext) -> Result<R, TaskError> {
        (self.0)(&ctx)
    }
}

/// Wrap a synchronous closure as work.
///
/// The closure runs inline on the worker thread. An execution timeout can only
/// be observed once it returns: a late return fails the attempt with
/// [`TaskError::Timeout`], but the worker stays busy until then, so blocking
/// closures should poll the context themselves.
pub const fn blocking_fn<R, F>(f: F) -> BlockingFn<F>
where
    F: Fn(&TaskContext) -> Result<R, TaskError>,
{
    BlockingFn(f)
}

/// Named, reusable work registered on a manager with `register`.
pub struct TaskTemplate<R> {
    name: String,
    work: Arc<dyn Executable<R>>,
    defaults: SubmitOptions,
}

impl<R> Clone for TaskTemplate<R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            work: Arc::clone(&self.work),
            defaults: self.defaults.clone(),
        }
    }
}

impl<R> std::fmt::Debug for TaskTemplate<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskTemplate")
            .field("name", &self.name)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl<R> TaskTemplate<R> {
    /// Build a template. Submissions default to the template name as task name.
    pub fn new(name: impl Into<String>, work: Arc<dyn Executable<R>>) -> Self {
        let name = name.into();
        let defaults = SubmitOptions::new().with_name(name.clone());
        Self {
            name,
            work,
            defaults,
        }
    }

    /// Replace the default submit options.
    #[must_use]
    pub fn with_defaults(mut self, defaults: SubmitOptions) -> Self {
        if defaults.name.is_none() {
            self.defaults = defaults.with_name(self.name.clone());
        } else {
            self.defaults = defaults;
        }
        self
    }

    /// Template name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Default submit options.
    #[must_use]
    pub const fn defaults(&self) -> &SubmitOptions {
        &self.defaults
    }

    pub(crate) fn work(&self) -> Arc<dyn Executable<R>> {
        Arc::clone(&self.work)
    }
}
