//! Tests for builder modules

use std::time::Duration;

use prometheus_task_engine::builders::TaskManagerBuilder;
use prometheus_task_engine::config::{QueueKind, TaskConfig};
use prometheus_task_engine::core::{blocking_fn, RetryPolicy, SchedulerError, TaskContext};

#[test]
fn test_builder_applies_settings() {
    let manager = TaskManagerBuilder::<u32>::new()
        .max_workers(3)
        .max_queue_size(7)
        .queue(QueueKind::Fifo)
        .retry_policy(RetryPolicy::none())
        .default_timeout(Duration::from_millis(500))
        .cancel_grace(Duration::from_millis(20))
        .build()
        .unwrap();

    let config = manager.config();
    assert_eq!(config.max_workers, 3);
    assert_eq!(config.max_queue_size, 7);
    assert_eq!(config.queue, QueueKind::Fifo);
    assert_eq!(config.retry_policy.max_attempts, 1);
    assert_eq!(config.default_timeout(), Some(Duration::from_millis(500)));
    assert_eq!(config.cancel_grace(), Duration::from_millis(20));
    assert!(!manager.is_running());
}

#[test]
fn test_builder_rejects_invalid_config() {
    let result = TaskManagerBuilder::<u32>::from_config(TaskConfig::new())
        .max_workers(0)
        .build();
    assert!(matches!(result, Err(SchedulerError::InvalidConfig(_))));
}

#[test]
fn test_builder_rejects_duplicate_templates() {
    let work = || blocking_fn(|_: &TaskContext| Ok(1_u32));
    let result = TaskManagerBuilder::<u32>::new()
        .max_workers(1)
        .template("same", work())
        .template("same", work())
        .build();
    assert!(matches!(result, Err(SchedulerError::DuplicateTemplate(name)) if name == "same"));
}
