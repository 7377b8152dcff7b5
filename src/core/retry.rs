//! Retry policy: decides whether a failed attempt runs again and after how long.
//!
//! The delay before retry `n` (1-based, i.e. after the `n`-th failed attempt) is
//! `base_delay × backoff_multiplier^(n-1)`, clamped to `max_delay`. The base is
//! derived from the attempt number alone, so delays never depend on past timing.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::error::{ErrorClass, TaskError};

/// Decides whether an error is worth retrying.
///
/// Any `Fn(&TaskError) -> bool` closure is a classifier.
pub trait RetryClassifier: Send + Sync {
    /// True if the attempt that produced `error` may be retried.
    fn is_retryable(&self, error: &TaskError) -> bool;
}

impl<F> RetryClassifier for F
where
    F: Fn(&TaskError) -> bool + Send + Sync,
{
    fn is_retryable(&self, error: &TaskError) -> bool {
        self(error)
    }
}

/// Outcome of consulting the policy after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Run the task again once the delay elapses.
    Retry(Duration),
    /// The failure is terminal.
    GiveUp,
}

/// Retry configuration attached to every task.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total number of attempts, the first one included. `1` disables retries.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Growth factor applied per retry (`>= 1.0`).
    pub backoff_multiplier: f64,
    /// Upper bound on any single delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Whether attempts that hit the execution timeout are retried.
    pub retry_on_timeout: bool,
    #[serde(skip)]
    classifier: Option<Arc<dyn RetryClassifier>>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            backoff_multiplier: 2.0,
            max_delay_ms: 30_000,
            retry_on_timeout: false,
            classifier: None,
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay_ms", &self.base_delay_ms)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("max_delay_ms", &self.max_delay_ms)
            .field("retry_on_timeout", &self.retry_on_timeout)
            .field("custom_classifier", &self.classifier.is_some())
            .finish()
    }
}

impl RetryPolicy {
    /// Policy with the given attempt budget and backoff parameters.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            max_attempts,
            base_delay_ms: duration_ms(base_delay),
            backoff_multiplier,
            ..Self::default()
        }
    }

    /// Single attempt, never retried.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Set the delay cap.
    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay_ms = duration_ms(max_delay);
        self
    }

    /// Retry attempts that time out.
    #[must_use]
    pub fn with_retry_on_timeout(mut self, retry: bool) -> Self {
        self.retry_on_timeout = retry;
        self
    }

    /// Replace the default classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: impl RetryClassifier + 'static) -> Self {
        self.classifier = Some(Arc::new(classifier));
        self
    }

    /// Delay before the first retry.
    #[must_use]
    pub const fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Cap applied to every delay.
    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Whether `error` is retryable under this policy, ignoring the attempt budget.
    ///
    /// Without a custom classifier only errors marked [`ErrorClass::Retryable`]
    /// qualify, plus timeouts when `retry_on_timeout` is set. Cancellation is
    /// never retried.
    #[must_use]
    pub fn is_retryable(&self, error: &TaskError) -> bool {
        if error.is_cancelled() {
            return false;
        }
        if let Some(classifier) = &self.classifier {
            return classifier.is_retryable(error);
        }
        match error {
            TaskError::Work { class, .. } => *class == ErrorClass::Retryable,
            TaskError::Timeout(_) => self.retry_on_timeout,
            TaskError::Cancelled | TaskError::Panicked(_) => false,
        }
    }

    /// Delay before running again after `attempt` attempts have failed.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let max = self.max_delay();
        let exp = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.base_delay().as_secs_f64() * self.backoff_multiplier.powi(exp);
        if !secs.is_finite() || secs < 0.0 || secs > max.as_secs_f64() {
            max
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Consult the policy after attempt number `attempt` failed with `error`.
    #[must_use]
    pub fn decide(&self, error: &TaskError, attempt: u32) -> RetryDecision {
        if attempt < self.max_attempts && self.is_retryable(error) {
            RetryDecision::Retry(self.delay_for(attempt))
        } else {
            RetryDecision::GiveUp
        }
    }

    /// Validate policy values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be greater than 0".into());
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err("backoff_multiplier must be a finite value >= 1.0".into());
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err("max_delay_ms must not be smaller than base_delay_ms".into());
        }
        Ok(())
    }
}

const fn duration_ms(d: Duration) -> u64 {
    let ms = d.as_millis();
    if ms > u64::MAX as u128 {
        u64::MAX
    } else {
        ms as u64
    }
}
