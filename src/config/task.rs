//! Manager configuration.

use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::error::AppResult;
use crate::core::retry::RetryPolicy;

/// Ordering container used by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    /// Strict submission order; priorities are ignored.
    Fifo,
    /// Highest priority first, submission order among equals.
    #[default]
    Priority,
}

impl FromStr for QueueKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fifo" => Ok(Self::Fifo),
            "priority" => Ok(Self::Priority),
            other => Err(format!("unknown queue kind `{other}`")),
        }
    }
}

/// Configuration for a [`TaskManager`](crate::core::TaskManager).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Number of worker threads, and the bound on concurrent executions.
    pub max_workers: usize,
    /// Queue capacity; `0` means unbounded.
    pub max_queue_size: usize,
    /// Ordering discipline.
    pub queue: QueueKind,
    /// Retry policy for tasks submitted without an override.
    pub retry_policy: RetryPolicy,
    /// Execution timeout for tasks submitted without an override.
    pub default_timeout_ms: Option<u64>,
    /// How long cancelling a running task waits for acknowledgement.
    pub cancel_grace_ms: u64,
    /// Respawns granted to crashed workers over the manager's lifetime.
    pub max_worker_restarts: u32,
    /// How long `stop` waits for the worker threads to exit before detaching them.
    pub shutdown_join_timeout_ms: u64,
    /// Stack size of worker threads in bytes.
    pub thread_stack_size: usize,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            max_workers: num_cpus::get().max(1),
            max_queue_size: 0,
            queue: QueueKind::Priority,
            retry_policy: RetryPolicy::default(),
            default_timeout_ms: None,
            cancel_grace_ms: 1_000,
            max_worker_restarts: 8,
            shutdown_join_timeout_ms: 2_000,
            thread_stack_size: 2 * 1024 * 1024,
        }
    }
}

impl TaskConfig {
    /// Defaults: one worker per CPU, unbounded priority queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker count.
    #[must_use]
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Set the queue capacity (`0` = unbounded).
    #[must_use]
    pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = max_queue_size;
        self
    }

    /// Select the ordering discipline.
    #[must_use]
    pub fn with_queue(mut self, queue: QueueKind) -> Self {
        self.queue = queue;
        self
    }

    /// Set the default retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Set the default execution timeout.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Set the cancellation grace period.
    #[must_use]
    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the worker restart budget.
    #[must_use]
    pub fn with_max_worker_restarts(mut self, restarts: u32) -> Self {
        self.max_worker_restarts = restarts;
        self
    }

    /// Set the join timeout used by `stop`.
    #[must_use]
    pub fn with_shutdown_join_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_join_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the worker thread stack size.
    #[must_use]
    pub fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = bytes;
        self
    }

    /// Default execution timeout.
    #[must_use]
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }

    /// Cancellation grace period.
    #[must_use]
    pub const fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }

    /// Join timeout used by `stop`.
    #[must_use]
    pub const fn shutdown_join_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_join_timeout_ms)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Describes the first offending field.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_workers == 0 {
            return Err("max_workers must be greater than 0".into());
        }
        if self.default_timeout_ms == Some(0) {
            return Err("default_timeout_ms must be greater than 0".into());
        }
        if self.thread_stack_size == 0 {
            return Err("thread_stack_size must be greater than 0".into());
        }
        self.retry_policy
            .validate()
            .map_err(|e| format!("retry_policy invalid: {e}"))
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Parse or validation failure, as a message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from the environment (and a `.env` file if present).
    ///
    /// Recognised variables, all optional:
    /// `TASK_ENGINE_MAX_WORKERS`, `TASK_ENGINE_MAX_QUEUE_SIZE`, `TASK_ENGINE_QUEUE`,
    /// `TASK_ENGINE_MAX_ATTEMPTS`, `TASK_ENGINE_BASE_DELAY_MS`,
    /// `TASK_ENGINE_BACKOFF_MULTIPLIER`, `TASK_ENGINE_MAX_DELAY_MS`,
    /// `TASK_ENGINE_DEFAULT_TIMEOUT_MS`, `TASK_ENGINE_CANCEL_GRACE_MS`.
    ///
    /// # Errors
    ///
    /// A variable that does not parse, or a configuration that fails validation.
    pub fn from_env() -> AppResult<Self> {
        // A missing .env file is fine.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let mut cfg = Self::default();
        if let Some(v) = parse_var(&lookup, "TASK_ENGINE_MAX_WORKERS")? {
            cfg.max_workers = v;
        }
        if let Some(v) = parse_var(&lookup, "TASK_ENGINE_MAX_QUEUE_SIZE")? {
            cfg.max_queue_size = v;
        }
        if let Some(raw) = lookup("TASK_ENGINE_QUEUE") {
            cfg.queue = raw.parse().map_err(anyhow::Error::msg)?;
        }
        if let Some(v) = parse_var(&lookup, "TASK_ENGINE_MAX_ATTEMPTS")? {
            cfg.retry_policy.max_attempts = v;
        }
        if let Some(v) = parse_var(&lookup, "TASK_ENGINE_BASE_DELAY_MS")? {
            cfg.retry_policy.base_delay_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "TASK_ENGINE_BACKOFF_MULTIPLIER")? {
            cfg.retry_policy.backoff_multiplier = v;
        }
        if let Some(v) = parse_var(&lookup, "TASK_ENGINE_MAX_DELAY_MS")? {
            cfg.retry_policy.max_delay_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "TASK_ENGINE_DEFAULT_TIMEOUT_MS")? {
            cfg.default_timeout_ms = Some(v);
        }
        if let Some(v) = parse_var(&lookup, "TASK_ENGINE_CANCEL_GRACE_MS")? {
            cfg.cancel_grace_ms = v;
        }
        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> AppResult<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("{key}={raw} is not valid"))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = TaskConfig::default();
        assert!(cfg.max_workers >= 1);
        assert_eq!(cfg.max_queue_size, 0);
        assert_eq!(cfg.queue, QueueKind::Priority);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_lookup_overrides_defaults() {
        let vars: HashMap<&str, &str> = [
            ("TASK_ENGINE_MAX_WORKERS", "3"),
            ("TASK_ENGINE_QUEUE", "FIFO"),
            ("TASK_ENGINE_MAX_ATTEMPTS", "5"),
            ("TASK_ENGINE_DEFAULT_TIMEOUT_MS", "250"),
        ]
        .into_iter()
        .collect();
        let cfg = TaskConfig::from_lookup(|k| vars.get(k).map(|v| (*v).to_string())).unwrap();
        assert_eq!(cfg.max_workers, 3);
        assert_eq!(cfg.queue, QueueKind::Fifo);
        assert_eq!(cfg.retry_policy.max_attempts, 5);
        assert_eq!(cfg.default_timeout(), Some(Duration::from_millis(250)));
    }

    fn only_workers(value: &'static str) -> impl Fn(&str) -> Option<String> {
        move |k| (k == "TASK_ENGINE_MAX_WORKERS").then(|| value.to_string())
    }

    #[test]
    fn test_lookup_rejects_garbage() {
        let err = TaskConfig::from_lookup(only_workers("many")).unwrap_err();
        assert!(err.to_string().contains("TASK_ENGINE_MAX_WORKERS"));

        let err = TaskConfig::from_lookup(only_workers("0")).unwrap_err();
        assert!(err.to_string().contains("max_workers"));
    }
}
