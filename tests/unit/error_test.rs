//! Tests for error types

use std::time::Duration;

use prometheus_task_engine::core::{ErrorClass, SchedulerError, TaskError, TaskId};

#[test]
fn test_queue_full_error() {
    let err = SchedulerError::QueueFull(8);
    assert_eq!(format!("{err}"), "queue full: capacity 8");
}

#[test]
fn test_task_not_found_error() {
    let id = TaskId::new();
    let err = SchedulerError::TaskNotFound(id);
    assert_eq!(format!("{err}"), format!("task not found: {id}"));
}

#[test]
fn test_template_errors() {
    assert_eq!(
        SchedulerError::DuplicateTemplate("daily".into()).to_string(),
        "duplicate template: daily"
    );
    assert_eq!(
        SchedulerError::TemplateNotFound("weekly".into()).to_string(),
        "template not found: weekly"
    );
}

#[test]
fn test_task_error_classes() {
    assert_eq!(TaskError::retryable("io").class(), Some(ErrorClass::Retryable));
    assert_eq!(TaskError::permanent("bad").class(), Some(ErrorClass::Permanent));
    assert_eq!(TaskError::Timeout(Duration::from_secs(1)).class(), None);
    assert!(TaskError::Cancelled.is_cancelled());
    assert_eq!(
        TaskError::Panicked("boom".into()).to_string(),
        "task panicked: boom"
    );
}
