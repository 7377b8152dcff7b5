//! Fixed-cadence re-submission of a template.
//!
//! Run `n` is due at `start + n × interval`, measured from the trigger's own
//! start instant. Time spent submitting (or a slow wake-up) therefore never
//! accumulates into drift. When the trigger falls more than one interval
//! behind, the missed ticks are skipped rather than fired in a burst.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::core::error::SchedulerError;
use crate::core::executor::TaskTemplate;
use crate::core::manager::TaskManager;
use crate::core::task::SubmitOptions;

/// Builder for a periodic submission loop.
pub struct PeriodicTrigger<R: Clone + Send + 'static> {
    manager: Arc<TaskManager<R>>,
    template: TaskTemplate<R>,
    interval: Duration,
    max_runs: Option<u64>,
    options: Option<SubmitOptions>,
}

impl<R: Clone + Send + 'static> PeriodicTrigger<R> {
    /// Submit `template` to `manager` every `interval`. The first run is due
    /// one interval after [`start`](Self::start).
    #[must_use]
    pub fn new(
        manager: Arc<TaskManager<R>>,
        template: TaskTemplate<R>,
        interval: Duration,
    ) -> Self {
        Self {
            manager,
            template,
            interval,
            max_runs: None,
            options: None,
        }
    }

    /// Stop after `runs` submissions.
    #[must_use]
    pub fn with_max_runs(mut self, runs: u64) -> Self {
        self.max_runs = Some(runs);
        self
    }

    /// Options for every submission instead of the template defaults.
    #[must_use]
    pub fn with_options(mut self, options: SubmitOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Spawn the trigger thread.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidConfig`] for a zero interval,
    /// [`SchedulerError::Internal`] if the thread cannot be spawned.
    pub fn start(self) -> Result<PeriodicHandle, SchedulerError> {
        if self.interval.is_zero() {
            return Err(SchedulerError::InvalidConfig(
                "periodic interval must be greater than 0".into(),
            ));
        }
        let signal = Arc::new(StopSignal::default());
        let runs = Arc::new(AtomicU64::new(0));
        let thread = {
            let signal = Arc::clone(&signal);
            let runs = Arc::clone(&runs);
            thread::Builder::new()
                .name(format!("periodic-{}", self.template.name()))
                .spawn(move || self.run(&signal, &runs))
                .map_err(|e| {
                    SchedulerError::Internal(format!("failed to spawn periodic trigger: {e}"))
                })?
        };
        Ok(PeriodicHandle {
            signal,
            runs,
            thread: Some(thread),
        })
    }

    fn run(self, signal: &StopSignal, runs: &AtomicU64) {
        let start = Instant::now();
        let interval_nanos = self.interval.as_nanos();
        let mut tick: u64 = 1;
        let name = self.template.name();
        info!(template = name, interval = ?self.interval, "periodic trigger started");

        loop {
            let Some(due) = due_instant(start, interval_nanos, tick) else {
                warn!("periodic schedule overflowed, stopping");
                break;
            };
            if signal.wait_until(due) {
                break;
            }

            match self.manager.submit_template(&self.template, self.options.clone()) {
                Ok(handle) => {
                    let fired = runs.fetch_add(1, Ordering::AcqRel) + 1;
                    debug!(template = name, tick, task_id = %handle.id(), "periodic submit");
                    if self.max_runs.is_some_and(|max| fired >= max) {
                        break;
                    }
                }
                Err(SchedulerError::PoolShutdown) => {
                    debug!(template = name, "manager shut down, periodic trigger exiting");
                    break;
                }
                Err(e) => warn!(template = name, tick, error = %e, "periodic submit failed"),
            }

            let next = next_tick(tick, start.elapsed().as_nanos(), interval_nanos);
            if next > tick + 1 {
                warn!(
                    template = name,
                    skipped = next - tick - 1,
                    "periodic trigger fell behind, skipping missed ticks"
                );
            }
            tick = next;
        }
        let runs = runs.load(Ordering::Acquire);
        info!(template = name, runs, "periodic trigger stopped");
    }
}

/// Instant at which tick `n` is due, `None` on overflow.
fn due_instant(start: Instant, interval_nanos: u128, n: u64) -> Option<Instant> {
    let offset = interval_nanos.checked_mul(u128::from(n))?;
    let offset = u64::try_from(offset).ok()?;
    start.checked_add(Duration::from_nanos(offset))
}

/// Index of the next tick to fire after `fired`, given the time elapsed since
/// start. Ticks whose due time has already passed are skipped.
fn next_tick(fired: u64, elapsed_nanos: u128, interval_nanos: u128) -> u64 {
    let candidate = fired.saturating_add(1);
    let current = u64::try_from(elapsed_nanos / interval_nanos.max(1)).unwrap_or(u64::MAX);
    if current >= candidate {
        current.saturating_add(1)
    } else {
        candidate
    }
}

#[derive(Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    /// Sleep until `deadline`; `true` if stopped meanwhile.
    fn wait_until(&self, deadline: Instant) -> bool {
        let mut stopped = self.stopped.lock();
        while !*stopped {
            if self.wake.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }

    fn stop(&self) {
        *self.stopped.lock() = true;
        self.wake.notify_all();
    }
}

/// Controls a running [`PeriodicTrigger`]. Dropping it stops the trigger.
pub struct PeriodicHandle {
    signal: Arc<StopSignal>,
    runs: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

impl fmt::Debug for PeriodicHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicHandle")
            .field("runs", &self.runs())
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl PeriodicHandle {
    /// Submissions made so far.
    #[must_use]
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Acquire)
    }

    /// True once the trigger thread has exited (stopped, `max_runs` reached,
    /// or the manager shut down).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stop the trigger and wait for its thread. Returns the number of runs.
    pub fn stop(mut self) -> u64 {
        self.shutdown();
        self.runs()
    }

    fn shutdown(&mut self) {
        self.signal.stop();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("periodic trigger thread panicked");
            }
        }
    }
}

impl Drop for PeriodicHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
