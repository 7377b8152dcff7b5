//! Tests for utility functions

use prometheus_task_engine::core::{TaskId, TaskState};
use prometheus_task_engine::util::{init_tracing, now_ms, DEFAULT_LOG_FILTER};

#[test]
fn test_now_ms_advances() {
    let before = now_ms();
    std::thread::sleep(std::time::Duration::from_millis(2));
    assert!(now_ms() > before);
}

#[test]
fn test_task_ids_are_unique() {
    let a = TaskId::new();
    let b = TaskId::new();
    assert_ne!(a, b);
    assert_eq!(a.to_string(), a.as_uuid().to_string());
}

#[test]
fn test_task_state_serde() {
    let json = serde_json::to_string(&TaskState::Cancelled).unwrap();
    assert_eq!(json, "\"cancelled\"");
    let back: TaskState = serde_json::from_str("\"running\"").unwrap();
    assert_eq!(back, TaskState::Running);
    assert!(TaskState::Failed.is_terminal());
    assert!(!TaskState::Pending.is_terminal());
}

#[test]
fn test_init_tracing_is_repeatable() {
    assert!(tracing_subscriber::EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    init_tracing();
    init_tracing();
    assert!(tracing::dispatcher::has_been_set());
}
