//! # Prometheus Task Engine
//!
//! An in-process task scheduling and execution engine: submit units of work,
//! let a bounded pool of worker threads run them, and get results back through
//! handles.
//!
//! ## Key Features
//!
//! - **Bounded Concurrency**: A fixed number of dedicated worker threads; never
//!   more tasks running than `max_workers`
//! - **Ordering**: FIFO or priority order (highest first, submission order among equals)
//! - **Backpressure**: Bounded queue with blocking or failing submission
//! - **Retries**: Exponential backoff with a cap and a pluggable error classifier
//! - **Cancellation**: Pending tasks are cancelled at once; running tasks cooperatively
//! - **Timeouts**: Per-task execution timeouts
//! - **Templates**: Named reusable work, optionally re-submitted on a fixed cadence
//! - **Observability**: Every state transition is reported to an observer
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use prometheus_task_engine::builders::TaskManagerBuilder;
//! use prometheus_task_engine::core::{task_fn, RetryPolicy, SubmitOptions, TaskError};
//! use prometheus_task_engine::util::init_tracing;
//!
//! // Log through `RUST_LOG` unless the application installed its own subscriber.
//! init_tracing();
//!
//! let manager = TaskManagerBuilder::<String>::new()
//!     .max_workers(4)
//!     .max_queue_size(1_000)
//!     .retry_policy(RetryPolicy::new(3, Duration::from_millis(100), 2.0))
//!     .build_started()?;
//!
//! let handle = manager.submit(
//!     task_fn(|ctx| async move {
//!         ctx.checkpoint()?;
//!         Ok::<_, TaskError>(format!("attempt {}", ctx.attempt()))
//!     }),
//!     SubmitOptions::new().with_priority(10),
//! )?;
//!
//! let result = handle.wait(Some(Duration::from_secs(5)))?;
//! assert!(result.is_success());
//!
//! manager.stop(true);
//! ```
//!
//! Terminal tasks stay queryable by id until
//! [`TaskManager::prune_finished`](crate::core::TaskManager::prune_finished)
//! removes them.
//!
//! For complete examples, see:
//! - `tests/task_manager_test.rs` - Full integration tests

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Task model, manager, retries, observers and periodic triggers.
pub mod core;
/// Configuration models for the manager.
pub mod config;
/// Builders to construct managers from configuration.
pub mod builders;
/// Ordering containers backing the manager.
pub mod infra;
/// Shared utilities.
pub mod util;
