//! Tests for configuration validation

use std::time::Duration;

use prometheus_task_engine::config::{QueueKind, TaskConfig};
use prometheus_task_engine::core::RetryPolicy;

#[test]
fn test_task_config_validation() {
    let valid = TaskConfig::new().with_max_workers(4).with_max_queue_size(16);
    assert!(valid.validate().is_ok());
}

#[test]
fn test_task_config_invalid_max_workers() {
    let invalid = TaskConfig::new().with_max_workers(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_task_config_invalid_timeout() {
    let invalid = TaskConfig::new().with_default_timeout(Duration::ZERO);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_task_config_invalid_retry_policy() {
    let invalid = TaskConfig::new().with_retry_policy(RetryPolicy::new(0, Duration::ZERO, 2.0));
    let err = invalid.validate().unwrap_err();
    assert!(err.contains("max_attempts"));

    let shrinking = TaskConfig::new().with_retry_policy(RetryPolicy::new(
        3,
        Duration::from_millis(10),
        0.5,
    ));
    assert!(shrinking.validate().is_err());
}

#[test]
fn test_task_config_from_json() {
    let cfg = TaskConfig::from_json_str(
        r#"{
            "max_workers": 3,
            "max_queue_size": 10,
            "queue": "fifo",
            "retry_policy": { "max_attempts": 4, "base_delay_ms": 50 },
            "default_timeout_ms": 2000
        }"#,
    )
    .unwrap();
    assert_eq!(cfg.max_workers, 3);
    assert_eq!(cfg.max_queue_size, 10);
    assert_eq!(cfg.queue, QueueKind::Fifo);
    assert_eq!(cfg.retry_policy.max_attempts, 4);
    assert_eq!(cfg.retry_policy.base_delay(), Duration::from_millis(50));
    assert_eq!(cfg.default_timeout(), Some(Duration::from_secs(2)));
    // Unset fields keep their defaults.
    assert_eq!(cfg.cancel_grace(), Duration::from_secs(1));
}

#[test]
fn test_task_config_from_json_rejects_invalid() {
    assert!(TaskConfig::from_json_str(r#"{ "max_workers": 0 }"#).is_err());
    assert!(TaskConfig::from_json_str("not json").is_err());
}

#[test]
fn test_queue_kind_parsing() {
    assert_eq!("FIFO".parse::<QueueKind>(), Ok(QueueKind::Fifo));
    assert_eq!(" priority ".parse::<QueueKind>(), Ok(QueueKind::Priority));
    assert!("lifo".parse::<QueueKind>().is_err());
}
