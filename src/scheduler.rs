//! The shared event loop behind every device's tick.
//!
//! A [`Scheduler`] owns a set of periodic tasks. Each powered-on device registers exactly
//! one task with it, and nothing ticks on its own: deadlines are processed either
//!
//! - manually, against a virtual clock ([`Scheduler::manual`] + [`Scheduler::advance`]),
//!   which makes multi-device runs fully deterministic, or
//! - by one background thread ([`Scheduler::spawn_driver`]) that sleeps until the next
//!   deadline, or
//! - with the `tokio` feature, by an async task ([`Scheduler::run_until`]).
//!
//! Callbacks always run with the scheduler's lock released and run to completion, so a
//! callback may schedule or cancel tasks (including its own).
//!
//! ```
//! use handheld_link::Scheduler;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let scheduler = Scheduler::manual();
//! let ticks = Arc::new(AtomicUsize::new(0));
//! let counter = ticks.clone();
//! let _task = scheduler.schedule_periodic("counter", Duration::from_millis(10), move || {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! scheduler.advance(Duration::from_millis(35)).unwrap();
//! assert_eq!(ticks.load(Ordering::SeqCst), 3);
//! ```

#[cfg(feature = "tokio")]
mod tokio_driver;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};
use web_time::{Duration, Instant};

use crate::error::{HandheldError, HandheldResult};
use crate::report_violation;
use crate::telemetry::{ViolationKind, ViolationSeverity};

/// The shortest period a task may have. Shorter periods are clamped up to this.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Identifies a task within one scheduler. Ids are never reused.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    /// The raw id.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

type Callback = Arc<dyn Fn() + Send + Sync>;

struct PeriodicTask {
    label: String,
    period: Duration,
    next_due: Instant,
    callback: Callback,
}

#[derive(Default)]
struct SchedulerState {
    tasks: BTreeMap<TaskId, PeriodicTask>,
    next_id: u64,
    driver_running: bool,
    shutdown: bool,
}

impl SchedulerState {
    /// The earliest `(deadline, id)` pair, ties broken by id.
    fn earliest(&self) -> Option<(Instant, TaskId)> {
        self.tasks
            .iter()
            .map(|(id, task)| (task.next_due, *id))
            .min()
    }
}

enum Clock {
    System,
    Manual {
        origin: Instant,
        elapsed: Mutex<Duration>,
    },
}

impl Clock {
    fn now(&self) -> Instant {
        match self {
            Self::System => Instant::now(),
            Self::Manual { origin, elapsed } => *origin + *elapsed.lock(),
        }
    }

    fn is_manual(&self) -> bool {
        matches!(self, Self::Manual { .. })
    }
}

struct SchedulerShared {
    state: Mutex<SchedulerState>,
    wakeup: Condvar,
    clock: Clock,
    #[cfg(feature = "tokio")]
    notify: tokio::sync::Notify,
}

impl SchedulerShared {
    fn new(clock: Clock) -> Self {
        Self {
            state: Mutex::new(SchedulerState::default()),
            wakeup: Condvar::new(),
            clock,
            #[cfg(feature = "tokio")]
            notify: tokio::sync::Notify::new(),
        }
    }

    fn wake(&self) {
        self.wakeup.notify_all();
        #[cfg(feature = "tokio")]
        self.notify.notify_one();
    }

    fn cancel(&self, id: TaskId) -> bool {
        let removed = self.state.lock().tasks.remove(&id);
        match removed {
            Some(task) => {
                debug!(task = %id, label = %task.label, "Cancelled periodic task");
                self.wake();
                true
            },
            None => false,
        }
    }

    /// Runs the callback of `id` unless the task was cancelled in the meantime.
    fn invoke(&self, id: TaskId, callback: &Callback) -> bool {
        if !self.state.lock().tasks.contains_key(&id) {
            return false;
        }
        trace!(task = %id, "Running periodic task");
        callback();
        true
    }

    /// Runs every task that is due at the current clock reading once.
    ///
    /// Missed ticks are dropped: a task that fell several periods behind runs a single
    /// time and is rescheduled one period from now.
    fn run_due(&self) -> usize {
        let now = self.clock.now();
        let due: Vec<(TaskId, Callback)> = {
            let mut state = self.state.lock();
            let mut due = Vec::new();
            for (id, task) in &mut state.tasks {
                if task.next_due > now {
                    continue;
                }
                task.next_due += task.period;
                if task.next_due <= now {
                    task.next_due = now + task.period;
                }
                due.push((*id, Arc::clone(&task.callback)));
            }
            due
        };

        due.iter()
            .filter(|(id, callback)| self.invoke(*id, callback))
            .count()
    }
}

/// A cheaply cloneable handle to a shared task scheduler.
///
/// Clones refer to the same set of tasks.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<SchedulerShared>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("manual", &self.is_manual())
            .field("tasks", &self.task_count())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Creates a scheduler that follows the wall clock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(SchedulerShared::new(Clock::System)),
        }
    }

    /// Creates a scheduler on a virtual clock that only moves through [`Scheduler::advance`].
    #[must_use]
    pub fn manual() -> Self {
        Self {
            shared: Arc::new(SchedulerShared::new(Clock::Manual {
                origin: Instant::now(),
                elapsed: Mutex::new(Duration::ZERO),
            })),
        }
    }

    /// Returns `true` for schedulers created with [`Scheduler::manual`].
    #[must_use]
    pub fn is_manual(&self) -> bool {
        self.shared.clock.is_manual()
    }

    /// The scheduler's current time.
    #[must_use]
    pub fn now(&self) -> Instant {
        self.shared.clock.now()
    }

    /// Registers `callback` to run every `period`, first one `period` from now.
    ///
    /// The task lives as long as the returned [`TaskHandle`]. Periods below
    /// [`MIN_PERIOD`] are clamped and reported as a scheduler violation.
    #[must_use = "dropping the handle cancels the task"]
    pub fn schedule_periodic<F>(
        &self,
        label: impl Into<String>,
        period: Duration,
        callback: F,
    ) -> TaskHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        let label = label.into();
        let period = if period < MIN_PERIOD {
            report_violation!(
                ViolationSeverity::Warning,
                ViolationKind::Scheduler,
                "Task '{}' requested a {:?} period, clamped to {:?}",
                label,
                period,
                MIN_PERIOD
            );
            MIN_PERIOD
        } else {
            period
        };

        let next_due = self.now() + period;
        let id = {
            let mut state = self.shared.state.lock();
            let id = TaskId(state.next_id);
            state.next_id += 1;
            debug!(task = %id, label = %label, ?period, "Scheduled periodic task");
            state.tasks.insert(
                id,
                PeriodicTask {
                    label,
                    period,
                    next_due,
                    callback: Arc::new(callback),
                },
            );
            id
        };
        self.shared.wake();

        TaskHandle {
            id,
            scheduler: Arc::downgrade(&self.shared),
        }
    }

    /// Number of live tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.shared.state.lock().tasks.len()
    }

    /// Returns `true` while the task `id` has not been cancelled.
    #[must_use]
    pub fn is_scheduled(&self, id: TaskId) -> bool {
        self.shared.state.lock().tasks.contains_key(&id)
    }

    /// The earliest pending deadline, if any task is scheduled.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.shared
            .state
            .lock()
            .earliest()
            .map(|(deadline, _)| deadline)
    }

    /// Runs every task that is due now once and returns how many ran.
    ///
    /// Ticks missed since the last call are not caught up.
    pub fn run_pending(&self) -> usize {
        self.shared.run_due()
    }

    /// Moves a manual scheduler's clock forward by `by`, running every tick that falls
    /// inside the window in deadline order (ties by task id). Returns the number of
    /// callbacks invoked.
    ///
    /// Before each callback the virtual clock is set to that tick's deadline, so tasks
    /// scheduled from inside a callback are timed relative to it.
    ///
    /// # Errors
    ///
    /// [`HandheldError::InvalidRequest`] if this scheduler follows the wall clock.
    pub fn advance(&self, by: Duration) -> HandheldResult<usize> {
        let Clock::Manual { origin, elapsed } = &self.shared.clock else {
            return Err(HandheldError::InvalidRequest {
                info: "only a manual scheduler can be advanced".to_owned(),
            });
        };

        let target = self.now() + by;
        let mut ran = 0;
        loop {
            let next = {
                let mut state = self.shared.state.lock();
                match state.earliest() {
                    Some((due, id)) if due <= target => state.tasks.get_mut(&id).map(|task| {
                        task.next_due += task.period;
                        (due, id, Arc::clone(&task.callback))
                    }),
                    _ => None,
                }
            };
            let Some((due, id, callback)) = next else {
                break;
            };
            set_manual_time(*origin, elapsed, due);
            if self.shared.invoke(id, &callback) {
                ran += 1;
            }
        }
        set_manual_time(*origin, elapsed, target);
        Ok(ran)
    }

    /// Starts the single background thread that runs tasks as they fall due.
    ///
    /// # Errors
    ///
    /// - [`HandheldError::InvalidRequest`] for a manual scheduler.
    /// - [`HandheldError::DriverAlreadyRunning`] if a driver is already active.
    /// - [`HandheldError::DriverSpawn`] if the OS refused to start the thread.
    pub fn spawn_driver(&self) -> HandheldResult<DriverHandle> {
        if self.is_manual() {
            return Err(HandheldError::InvalidRequest {
                info: "a manual scheduler is driven through advance()".to_owned(),
            });
        }
        {
            let mut state = self.shared.state.lock();
            if state.driver_running {
                return Err(HandheldError::DriverAlreadyRunning);
            }
            state.driver_running = true;
            state.shutdown = false;
        }

        let shared = Arc::clone(&self.shared);
        let spawned = std::thread::Builder::new()
            .name("handheld-scheduler".to_owned())
            .spawn(move || driver_loop(&shared));

        match spawned {
            Ok(thread) => {
                debug!("Scheduler driver started");
                Ok(DriverHandle {
                    shared: Arc::clone(&self.shared),
                    thread: Some(thread),
                })
            },
            Err(err) => {
                self.shared.state.lock().driver_running = false;
                Err(HandheldError::DriverSpawn {
                    context: err.to_string(),
                })
            },
        }
    }

    /// Returns `true` while a driver thread is active.
    #[must_use]
    pub fn has_driver(&self) -> bool {
        self.shared.state.lock().driver_running
    }
}

/// Moves a virtual clock forward to `to`. Never moves it backwards.
fn set_manual_time(origin: Instant, elapsed: &Mutex<Duration>, to: Instant) {
    let mut elapsed = elapsed.lock();
    let offset = to.saturating_duration_since(origin);
    if offset > *elapsed {
        *elapsed = offset;
    }
}

fn driver_loop(shared: &SchedulerShared) {
    loop {
        {
            let mut state = shared.state.lock();
            if state.shutdown {
                break;
            }
            match state.earliest() {
                None => {
                    shared.wakeup.wait(&mut state);
                    continue;
                },
                Some((due, _)) => {
                    let now = shared.clock.now();
                    if due > now {
                        let _timed_out = shared.wakeup.wait_for(&mut state, due - now);
                        continue;
                    }
                },
            }
        }
        shared.run_due();
    }

    shared.state.lock().driver_running = false;
    debug!("Scheduler driver stopped");
}

/// Owner of one periodic task. Dropping it cancels the task.
#[derive(Debug)]
pub struct TaskHandle {
    id: TaskId,
    scheduler: Weak<SchedulerShared>,
}

impl TaskHandle {
    /// The task's id.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Removes the task. Once this returns the callback is never started again.
    /// Returns `false` if it was already gone.
    pub fn cancel(&self) -> bool {
        self.scheduler
            .upgrade()
            .is_some_and(|shared| shared.cancel(self.id))
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Owner of the background driver thread. Dropping it stops the thread.
pub struct DriverHandle {
    shared: Arc<SchedulerShared>,
    thread: Option<JoinHandle<()>>,
}

impl fmt::Debug for DriverHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverHandle")
            .field("running", &self.thread.is_some())
            .finish_non_exhaustive()
    }
}

impl DriverHandle {
    /// Stops the driver and waits for its thread to exit.
    ///
    /// A callback currently running is allowed to finish. Calling this from inside a
    /// callback stops the driver without waiting for it.
    pub fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.shared.state.lock().shutdown = true;
        self.shared.wakeup.notify_all();
        if thread.thread().id() == std::thread::current().id() {
            return;
        }
        if thread.join().is_err() {
            report_violation!(
                ViolationSeverity::Error,
                ViolationKind::Scheduler,
                "Scheduler driver thread panicked"
            );
            self.shared.state.lock().driver_running = false;
        }
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
