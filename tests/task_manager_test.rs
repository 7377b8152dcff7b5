//! Integration tests for TaskManager
//!
//! These tests exercise the engine end to end through its public API:
//! - Bounded concurrency and queue backpressure
//! - Priority and FIFO ordering
//! - Retries with backoff
//! - Cancellation of pending and running tasks
//! - Timeouts and panic capture
//! - Draining and forced shutdown
//! - Templates and periodic triggers

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use prometheus_task_engine::builders::TaskManagerBuilder;
use prometheus_task_engine::config::{QueueKind, TaskConfig};
use prometheus_task_engine::core::{
    blocking_fn, task_fn, Executable, InMemoryObserver, PeriodicTrigger, RetryPolicy,
    SchedulerError, SubmitOptions, TaskContext, TaskError, TaskId, TaskManager, TaskState,
    TransitionObserver,
};

const WAIT: Option<Duration> = Some(Duration::from_secs(5));

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn manager(workers: usize) -> TaskManager<u32> {
    TaskManagerBuilder::new()
        .max_workers(workers)
        .build()
        .expect("valid config")
}

/// Poll `condition` until it holds or `timeout` elapses.
fn eventually(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

fn ok(value: u32) -> impl Executable<u32> {
    blocking_fn(move |_: &TaskContext| Ok(value))
}

/// Work that runs until cancelled, checking every 10ms.
fn until_cancelled() -> impl Executable<u32> {
    task_fn(|ctx: TaskContext| async move {
        loop {
            if ctx.is_cancelled() {
                return Err::<u32, _>(TaskError::Cancelled);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
}

/// Work that appends `label` to `log` when it runs.
fn record(log: &Arc<Mutex<Vec<&'static str>>>, label: &'static str) -> impl Executable<u32> {
    let log = Arc::clone(log);
    blocking_fn(move |_: &TaskContext| {
        log.lock().push(label);
        Ok(0_u32)
    })
}

// ============================================================================
// EXECUTION AND CONCURRENCY
// ============================================================================

#[test]
fn test_concurrency_never_exceeds_max_workers() {
    let manager = manager(2);
    manager.start().unwrap();

    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let started = Instant::now();
    let handles: Vec<_> = (0..5_u32)
        .map(|i| {
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            let work = task_fn(move |_ctx: TaskContext| {
                let current = Arc::clone(&current);
                let peak = Arc::clone(&peak);
                async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    Ok(i)
                }
            });
            manager.submit(work, SubmitOptions::new()).unwrap()
        })
        .collect();

    for (i, handle) in (0_u32..).zip(&handles) {
        let result = handle.wait(WAIT).unwrap();
        assert_eq!(result.status, TaskState::Completed);
        assert_eq!(result.value(), Some(&i));
    }
    // Three waves of 50ms on two workers.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(140), "finished in {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "finished in {elapsed:?}");
    let peak = peak.load(Ordering::SeqCst);
    assert!(peak <= 2, "peak concurrency was {peak}");
    assert!(peak >= 1);
    manager.stop(true);
}

#[test]
fn test_transitions_reach_observer() {
    let observer = Arc::new(InMemoryObserver::new(64));
    let manager: TaskManager<u32> = TaskManagerBuilder::new()
        .max_workers(1)
        .observer(observer.clone())
        .build_started()
        .unwrap();

    let handle = manager.submit(ok(1), SubmitOptions::new()).unwrap();
    handle.wait(WAIT).unwrap();
    manager.stop(true);

    let seen: Vec<_> = observer
        .transitions_for(handle.id())
        .into_iter()
        .map(|t| (t.from, t.to))
        .collect();
    assert_eq!(
        seen,
        vec![
            (TaskState::Pending, TaskState::Running),
            (TaskState::Running, TaskState::Completed),
        ]
    );
}

#[test]
fn test_wait_timeout_leaves_task_alone() {
    let manager = manager(1);
    manager.start().unwrap();
    let handle = manager
        .submit(
            task_fn(|_ctx: TaskContext| async {
                tokio::time::sleep(Duration::from_millis(150)).await;
                Ok(9_u32)
            }),
            SubmitOptions::new(),
        )
        .unwrap();

    let err = handle.wait(Some(Duration::from_millis(10))).unwrap_err();
    assert!(matches!(err, SchedulerError::WaitTimeout(_)));
    assert_eq!(handle.wait(WAIT).unwrap().value(), Some(&9));
    manager.stop(true);
}

// ============================================================================
// QUEUEING AND ORDERING
// ============================================================================

#[test]
fn test_non_blocking_submit_on_full_queue() {
    let manager: TaskManager<u32> = TaskManagerBuilder::new()
        .max_workers(1)
        .max_queue_size(1)
        .build()
        .unwrap();

    let first = manager.submit(ok(1), SubmitOptions::new()).unwrap();
    let err = manager
        .submit(ok(2), SubmitOptions::new().non_blocking())
        .unwrap_err();
    assert!(matches!(err, SchedulerError::QueueFull(1)));
    assert_eq!(manager.task_count(), 1);

    manager.start().unwrap();
    assert_eq!(first.wait(WAIT).unwrap().value(), Some(&1));
    manager.stop(true);
}

#[test]
fn test_priority_order_with_fifo_among_equals() {
    let manager = manager(1);
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut handles = Vec::new();
    for (label, priority) in [("low", 1), ("high-a", 5), ("mid", 3), ("high-b", 5)] {
        let options = SubmitOptions::new().with_priority(priority);
        handles.push(manager.submit(record(&log, label), options).unwrap());
    }

    manager.start().unwrap();
    for handle in &handles {
        handle.wait(WAIT).unwrap();
    }
    assert_eq!(*log.lock(), vec!["high-a", "high-b", "mid", "low"]);
    manager.stop(true);
}

#[test]
fn test_fifo_queue_ignores_priority() {
    let manager: TaskManager<u32> = TaskManagerBuilder::new()
        .max_workers(1)
        .queue(QueueKind::Fifo)
        .build()
        .unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut handles = Vec::new();
    for (label, priority) in [("first", 0), ("second", 9), ("third", 4)] {
        let options = SubmitOptions::new().with_priority(priority);
        handles.push(manager.submit(record(&log, label), options).unwrap());
    }

    manager.start().unwrap();
    for handle in &handles {
        handle.wait(WAIT).unwrap();
    }
    assert_eq!(*log.lock(), vec!["first", "second", "third"]);
    manager.stop(true);
}

// ============================================================================
// RETRIES, TIMEOUTS AND PANICS
// ============================================================================

#[test]
fn test_retry_exhaustion_fails_with_last_error() {
    let manager = manager(1);
    manager.start().unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let work = {
        let calls = Arc::clone(&calls);
        blocking_fn(move |ctx: &TaskContext| {
            calls.fetch_add(1, Ordering::SeqCst);
            assert!(ctx.attempt() >= 1);
            Err::<u32, _>(TaskError::retryable("x"))
        })
    };
    let policy = RetryPolicy::new(2, Duration::from_millis(10), 2.0);
    let handle = manager
        .submit(work, SubmitOptions::new().with_retry_policy(policy))
        .unwrap();

    let result = handle.wait(WAIT).unwrap();
    assert_eq!(result.status, TaskState::Failed);
    assert_eq!(result.attempt, 2);
    assert_eq!(result.error().map(ToString::to_string).as_deref(), Some("x"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    manager.stop(true);
}

#[test]
fn test_retry_then_success() {
    let manager = manager(2);
    manager.start().unwrap();
    let work = blocking_fn(|ctx: &TaskContext| {
        if ctx.attempt() < 3 {
            Err(TaskError::retryable("flaky"))
        } else {
            Ok(ctx.attempt())
        }
    });
    let policy = RetryPolicy::new(5, Duration::from_millis(5), 1.5);
    let handle = manager
        .submit(work, SubmitOptions::new().with_retry_policy(policy))
        .unwrap();

    let result = handle.wait(WAIT).unwrap();
    assert!(result.is_success());
    assert_eq!(result.value(), Some(&3));
    manager.stop(true);
    assert_eq!(manager.stats().retried_attempts, 2);
}

#[test]
fn test_permanent_error_is_not_retried() {
    let manager = manager(1);
    manager.start().unwrap();
    let work = blocking_fn(|_: &TaskContext| Err::<u32, _>(TaskError::permanent("bad input")));
    let policy = RetryPolicy::new(5, Duration::from_millis(5), 2.0);
    let handle = manager
        .submit(work, SubmitOptions::new().with_retry_policy(policy))
        .unwrap();

    let result = handle.wait(WAIT).unwrap();
    assert_eq!(result.status, TaskState::Failed);
    assert_eq!(result.attempt, 1);
    manager.stop(true);
}

#[test]
fn test_execution_timeout_fails_task() {
    let manager = manager(1);
    manager.start().unwrap();
    let handle = manager
        .submit(
            task_fn(|_ctx: TaskContext| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(0_u32)
            }),
            SubmitOptions::new().with_timeout(Duration::from_millis(50)),
        )
        .unwrap();

    let result = handle.wait(WAIT).unwrap();
    assert_eq!(result.status, TaskState::Failed);
    assert_eq!(
        result.error(),
        Some(&TaskError::Timeout(Duration::from_millis(50)))
    );
    manager.stop(true);
}

#[test]
fn test_blocking_work_past_timeout_fails() {
    let manager = manager(1);
    manager.start().unwrap();
    let handle = manager
        .submit(
            blocking_fn(|_: &TaskContext| {
                std::thread::sleep(Duration::from_millis(200));
                Ok(7_u32)
            }),
            SubmitOptions::new().with_timeout(Duration::from_millis(50)),
        )
        .unwrap();

    let result = handle.wait(WAIT).unwrap();
    assert_eq!(result.status, TaskState::Failed);
    assert_eq!(result.value(), None);
    assert_eq!(
        result.error(),
        Some(&TaskError::Timeout(Duration::from_millis(50)))
    );
    manager.stop(true);
}

#[test]
fn test_panicking_work_is_captured() {
    let manager = manager(1);
    manager.start().unwrap();
    let bad = manager
        .submit(
            blocking_fn(|_: &TaskContext| -> Result<u32, TaskError> { panic!("kaboom") }),
            SubmitOptions::new(),
        )
        .unwrap();

    let result = bad.wait(WAIT).unwrap();
    assert_eq!(result.status, TaskState::Failed);
    match result.error() {
        Some(TaskError::Panicked(message)) => assert!(message.contains("kaboom")),
        other => panic!("unexpected error {other:?}"),
    }

    // The worker survives and keeps serving.
    let good = manager.submit(ok(4), SubmitOptions::new()).unwrap();
    assert_eq!(good.wait(WAIT).unwrap().value(), Some(&4));
    manager.stop(true);
}

// ============================================================================
// CANCELLATION
// ============================================================================

#[test]
fn test_cancel_running_task() {
    let manager = manager(1);
    manager.start().unwrap();
    let handle = manager.submit(until_cancelled(), SubmitOptions::new()).unwrap();
    assert!(eventually(Duration::from_secs(2), || {
        handle.status() == TaskState::Running
    }));

    let requested = Instant::now();
    assert!(manager.cancel(handle.id()).unwrap());
    // Acknowledged within a poll interval or so.
    assert!(requested.elapsed() < Duration::from_millis(500));
    let result = handle.wait(WAIT).unwrap();
    assert_eq!(result.status, TaskState::Cancelled);
    assert_eq!(result.error(), Some(&TaskError::Cancelled));
    manager.stop(true);
}

#[test]
fn test_cancel_pending_task_never_runs() {
    let manager = manager(1);
    manager.start().unwrap();
    let blocker = manager.submit(until_cancelled(), SubmitOptions::new()).unwrap();
    assert!(eventually(Duration::from_secs(2), || {
        blocker.status() == TaskState::Running
    }));

    let executed = Arc::new(AtomicBool::new(false));
    let queued = {
        let executed = Arc::clone(&executed);
        manager
            .submit(
                blocking_fn(move |_: &TaskContext| {
                    executed.store(true, Ordering::SeqCst);
                    Ok(1)
                }),
                SubmitOptions::new(),
            )
            .unwrap()
    };
    assert!(manager.cancel(queued.id()).unwrap());
    assert_eq!(queued.status(), TaskState::Cancelled);

    assert!(blocker.cancel());
    assert_eq!(queued.wait(WAIT).unwrap().status, TaskState::Cancelled);
    manager.stop(true);
    assert!(!executed.load(Ordering::SeqCst));
}

/// Blocking work that ignores its token: flags `started`, sleeps, then
/// returns whatever `outcome` gives for the attempt.
fn stubborn(
    started: &Arc<AtomicBool>,
    outcome: impl Fn(u32) -> Result<u32, TaskError> + Send + Sync + 'static,
) -> impl Executable<u32> {
    let started = Arc::clone(started);
    blocking_fn(move |ctx: &TaskContext| {
        started.store(true, Ordering::SeqCst);
        if ctx.attempt() == 1 {
            std::thread::sleep(Duration::from_millis(150));
        }
        outcome(ctx.attempt())
    })
}

fn quick_grace_manager() -> TaskManager<u32> {
    TaskManagerBuilder::new()
        .max_workers(1)
        .cancel_grace(Duration::from_millis(20))
        .build_started()
        .expect("valid config")
}

#[test]
fn test_refused_cancel_leaves_failure_in_place() {
    let manager = quick_grace_manager();
    let started = Arc::new(AtomicBool::new(false));
    let handle = manager
        .submit(
            stubborn(&started, |_| Err(TaskError::permanent("boom"))),
            SubmitOptions::new(),
        )
        .unwrap();
    assert!(eventually(Duration::from_secs(2), || started.load(Ordering::SeqCst)));

    assert!(!handle.cancel());
    let result = handle.wait(WAIT).unwrap();
    assert_eq!(result.status, TaskState::Failed);
    assert_eq!(result.error().map(ToString::to_string).as_deref(), Some("boom"));
    manager.stop(true);
    assert_eq!(manager.stats().cancelled_tasks, 0);
}

#[test]
fn test_refused_cancel_keeps_retries() {
    let manager = quick_grace_manager();
    let started = Arc::new(AtomicBool::new(false));
    let work = stubborn(&started, |attempt| {
        if attempt == 1 {
            Err(TaskError::retryable("flaky"))
        } else {
            Ok(attempt)
        }
    });
    let policy = RetryPolicy::new(3, Duration::from_millis(5), 2.0);
    let handle = manager
        .submit(work, SubmitOptions::new().with_retry_policy(policy))
        .unwrap();
    assert!(eventually(Duration::from_secs(2), || started.load(Ordering::SeqCst)));

    assert!(!handle.cancel());
    let result = handle.wait(WAIT).unwrap();
    assert_eq!(result.status, TaskState::Completed);
    assert_eq!(result.value(), Some(&2));
    manager.stop(true);
}

#[test]
fn test_cancel_finished_task_is_refused() {
    let manager = manager(1);
    manager.start().unwrap();
    let handle = manager.submit(ok(1), SubmitOptions::new()).unwrap();
    handle.wait(WAIT).unwrap();

    assert!(!manager.cancel(handle.id()).unwrap());
    assert_eq!(manager.status(handle.id()).unwrap(), TaskState::Completed);
    manager.stop(true);
}

// ============================================================================
// SHUTDOWN
// ============================================================================

#[test]
fn test_drain_stop_finishes_queued_work() {
    let manager = manager(2);
    manager.start().unwrap();
    let handles: Vec<_> = (0..6_u32)
        .map(|i| {
            let work = task_fn(move |_ctx: TaskContext| async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(i)
            });
            manager.submit(work, SubmitOptions::new()).unwrap()
        })
        .collect();

    manager.stop(true);
    for handle in &handles {
        assert_eq!(handle.status(), TaskState::Completed);
    }
    assert!(!manager.is_running());
}

struct FailingObserver;

impl TransitionObserver for FailingObserver {
    fn on_transition(&self, _: TaskId, _: TaskState, to: TaskState, _: u32) {
        assert!(!to.is_terminal(), "observer failure on {to}");
    }
}

#[test]
fn test_panicking_observer_does_not_block_drain() {
    let manager = Arc::new(
        TaskManagerBuilder::new()
            .max_workers(1)
            .observer(Arc::new(FailingObserver))
            .build_started()
            .expect("valid config"),
    );
    let handle = manager.submit(ok(3), SubmitOptions::new()).unwrap();
    assert_eq!(handle.wait(WAIT).unwrap().status, TaskState::Completed);

    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    let stopper = {
        let manager = Arc::clone(&manager);
        std::thread::spawn(move || {
            manager.stop(true);
            let _ = done_tx.send(());
        })
    };
    assert!(done_rx.recv_timeout(Duration::from_secs(2)).is_ok());
    stopper.join().unwrap();
    assert_eq!(manager.stats().completed_tasks, 1);
}

#[test]
fn test_forced_stop_cancels_everything() {
    let manager = manager(1);
    manager.start().unwrap();
    let running = manager.submit(until_cancelled(), SubmitOptions::new()).unwrap();
    assert!(eventually(Duration::from_secs(2), || {
        running.status() == TaskState::Running
    }));
    let pending: Vec<_> = (0..3)
        .map(|i| manager.submit(ok(i), SubmitOptions::new()).unwrap())
        .collect();

    manager.stop(false);
    for handle in &pending {
        assert_eq!(handle.wait(WAIT).unwrap().status, TaskState::Cancelled);
    }
    assert_eq!(running.wait(WAIT).unwrap().status, TaskState::Cancelled);
}

#[test]
fn test_stop_is_idempotent_and_rejects_new_work() {
    let manager = manager(2);
    manager.start().unwrap();
    let runs = Arc::new(AtomicU32::new(0));
    for _ in 0..4 {
        let runs = Arc::clone(&runs);
        let work = blocking_fn(move |_: &TaskContext| Ok(runs.fetch_add(1, Ordering::SeqCst)));
        manager.submit(work, SubmitOptions::new()).unwrap();
    }
    manager.stop(true);
    let stats = manager.stats();
    manager.stop(true);
    manager.stop(false);

    assert_eq!(runs.load(Ordering::SeqCst), 4);
    assert_eq!(manager.stats(), stats);

    let err = manager.submit(ok(1), SubmitOptions::new()).unwrap_err();
    assert!(matches!(err, SchedulerError::PoolShutdown));
    assert!(matches!(manager.start(), Err(SchedulerError::PoolShutdown)));
}

#[test]
fn test_start_is_idempotent() {
    let manager = manager(2);
    manager.start().unwrap();
    manager.start().unwrap();
    assert!(manager.is_running());
    assert_eq!(manager.stats().worker_count, 2);
    manager.stop(true);
}

// ============================================================================
// TEMPLATES AND PERIODIC TRIGGERS
// ============================================================================

#[test]
fn test_named_templates() {
    let manager = manager(2);
    manager.start().unwrap();
    manager.register("seven", ok(7)).unwrap();

    let a = manager.submit_named("seven", None).unwrap();
    let b = manager
        .submit_named("seven", Some(SubmitOptions::new().with_priority(3)))
        .unwrap();
    assert_eq!(a.wait(WAIT).unwrap().value(), Some(&7));
    assert_eq!(b.wait(WAIT).unwrap().value(), Some(&7));
    assert_eq!(b.task().name(), "seven");

    assert!(matches!(
        manager.register("seven", ok(8)),
        Err(SchedulerError::DuplicateTemplate(name)) if name == "seven"
    ));
    assert!(matches!(
        manager.submit_named("missing", None),
        Err(SchedulerError::TemplateNotFound(_))
    ));
    manager.stop(true);
}

#[test]
fn test_builder_registers_templates() {
    let manager: TaskManager<u32> = TaskManagerBuilder::from_config(TaskConfig::new())
        .max_workers(1)
        .template("one", ok(1))
        .template("two", ok(2))
        .build_started()
        .unwrap();

    let handle = manager.submit_named("two", None).unwrap();
    assert_eq!(handle.wait(WAIT).unwrap().value(), Some(&2));
    assert!(manager.template("one").is_some());
    manager.stop(true);
}

#[test]
fn test_periodic_trigger_respects_max_runs() {
    let manager = Arc::new(manager(1));
    manager.start().unwrap();
    let fired = Arc::new(AtomicU32::new(0));
    let template = {
        let fired = Arc::clone(&fired);
        manager
            .register(
                "tick",
                blocking_fn(move |_: &TaskContext| Ok(fired.fetch_add(1, Ordering::SeqCst))),
            )
            .unwrap()
    };

    let handle = PeriodicTrigger::new(Arc::clone(&manager), template, Duration::from_millis(20))
        .with_max_runs(3)
        .start()
        .unwrap();
    assert!(eventually(Duration::from_secs(3), || handle.is_finished()));
    assert_eq!(handle.stop(), 3);

    manager.stop(true);
    assert_eq!(fired.load(Ordering::SeqCst), 3);
}

#[test]
fn test_periodic_trigger_stops_with_manager() {
    let manager = Arc::new(manager(1));
    manager.start().unwrap();
    let template = manager.register("noop", ok(0)).unwrap();
    let handle = PeriodicTrigger::new(Arc::clone(&manager), template, Duration::from_millis(10))
        .start()
        .unwrap();
    assert!(eventually(Duration::from_secs(2), || handle.runs() >= 1));

    manager.stop(true);
    assert!(eventually(Duration::from_secs(2), || handle.is_finished()));
}

#[test]
fn test_zero_interval_rejected() {
    let manager = Arc::new(manager(1));
    let template = manager.register("noop", ok(0)).unwrap();
    let err = PeriodicTrigger::new(manager, template, Duration::ZERO)
        .start()
        .unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidConfig(_)));
}

// ============================================================================
// STATISTICS AND BOOKKEEPING
// ============================================================================

#[test]
fn test_stats_count_outcomes() {
    let manager = manager(2);
    manager.start().unwrap();
    let policy = RetryPolicy::none();
    let mut handles = vec![
        manager.submit(ok(1), SubmitOptions::new()).unwrap(),
        manager.submit(ok(2), SubmitOptions::new()).unwrap(),
    ];
    handles.push(
        manager
            .submit(
                blocking_fn(|_: &TaskContext| Err::<u32, _>(TaskError::new("nope"))),
                SubmitOptions::new().with_retry_policy(policy),
            )
            .unwrap(),
    );
    for handle in &handles {
        handle.wait(WAIT).unwrap();
    }
    manager.stop(true);

    let stats = manager.stats();
    assert_eq!(stats.submitted_tasks, 3);
    assert_eq!(stats.completed_tasks, 2);
    assert_eq!(stats.failed_tasks, 1);
    assert_eq!(stats.cancelled_tasks, 0);
    assert_eq!(stats.active_tasks, 0);
    assert_eq!(stats.queued_tasks, 0);
}

#[test]
fn test_lookup_and_prune() {
    let manager = manager(1);
    manager.start().unwrap();
    let handle = manager.submit(ok(5), SubmitOptions::new()).unwrap();
    let id = handle.id();
    assert_eq!(manager.wait(id, WAIT).unwrap().value(), Some(&5));
    assert_eq!(manager.handle(id).unwrap().id(), id);

    assert_eq!(manager.prune_finished(), 1);
    assert!(matches!(
        manager.status(id),
        Err(SchedulerError::TaskNotFound(missing)) if missing == id
    ));
    // Handles outlive pruning.
    assert_eq!(handle.status(), TaskState::Completed);
    manager.stop(true);
}
