//! The SCHEDULER - deadline-ordered dispatch of control-loop jobs.
//!
//! One dispatch context owns a mutex-guarded min-heap of jobs keyed by
//! absolute deadline (nanoseconds on the injected `TimeSource`):
//!
//! ```text
//!  schedule_*() ──push──► ┌────────────────────┐
//!   (any thread)          │ JobQueue (min-heap)│◄── requeue (periodic)
//!                         └─────────┬──────────┘
//!                                   │ pop when deadline <= now
//!                                   ▼
//!                  dispatch thread / VirtualClock::advance
//!                         (lock released while the job runs)
//! ```
//!
//! Jobs run one at a time. A slow job delays everything queued after it;
//! a panicking job is logged and the dispatcher carries on.

mod queue;

use crate::error::SchedulerError;
use crate::panics::run_guarded;
use ccre_env::{ClockDriver, MonotonicClock, TimeSource, VirtualClock};
use parking_lot::{Condvar, Mutex};
use queue::{JobQueue, OnceJob, RepeatJob, ScheduleEntry, Task};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use tracing::{debug, error, warn};

pub const NANOS_PER_MILLI: u64 = 1_000_000;

/// Configuration for a threaded scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Name of the dispatch thread (default: "ccre-scheduler")
    pub thread_name: String,

    /// Log a warning whenever a skippable job drops periods (default: true)
    pub warn_on_skip: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            thread_name: "ccre-scheduler".to_string(),
            warn_on_skip: true,
        }
    }
}

/// Cooperative cancellation token for a scheduled job.
///
/// Cancelling only prevents future firings; a run already in progress
/// completes normally. Cancelling twice, or after a one-shot fired, is a no-op.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// A queued job as seen by introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueuedJob {
    pub tag: String,
    pub deadline_nanos: u64,
}

/// A popped job, ready to run outside the queue lock.
enum Runnable {
    Once(OnceJob),
    Fixed(RepeatJob),
    Variable {
        job: RepeatJob,
        period: u64,
        cancelled: Arc<AtomicBool>,
    },
}

struct Shared<T> {
    time: Arc<T>,
    queue: Mutex<JobQueue>,
    signal: Condvar,
    terminated: AtomicBool,
    /// Tag of the job currently running, if any
    active: Mutex<Option<Arc<str>>>,
    config: SchedulerConfig,
    thread: Mutex<Option<JoinHandle<Result<(), SchedulerError>>>>,
}

/// Single-threaded, deadline-ordered job scheduler.
///
/// Cloning yields another handle to the same queue, so a running job can
/// capture a clone and schedule further work without deadlocking.
pub struct Scheduler<T: TimeSource = MonotonicClock> {
    shared: Arc<Shared<T>>,
}

impl<T: TimeSource> Clone for Scheduler<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: TimeSource> Scheduler<T> {
    /// Starts a scheduler with its own dispatch thread.
    pub fn start(time: Arc<T>, config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let shared = Arc::new(Shared::new(time, config));
        let worker = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name(shared.config.thread_name.clone())
            .spawn(move || worker.dispatch_loop())
            .map_err(|e| SchedulerError::Spawn(e.to_string()))?;
        *shared.thread.lock() = Some(handle);
        debug!("Scheduler '{}' started", shared.config.thread_name);
        Ok(Self { shared })
    }

    /// Returns the time source this scheduler reads deadlines against.
    pub fn time(&self) -> &Arc<T> {
        &self.shared.time
    }

    /// Current time in nanoseconds on the scheduler's time source.
    pub fn now_nanos(&self) -> u64 {
        self.shared.time.now_nanos()
    }

    /// Absolute deadline `millis` milliseconds from now.
    pub fn after_millis(&self, millis: u64) -> u64 {
        self.now_nanos()
            .saturating_add(millis.saturating_mul(NANOS_PER_MILLI))
    }

    /// Fire-and-forget job at an absolute deadline.
    pub fn schedule_once<F>(&self, tag: &str, at_nanos: u64, job: F) -> Result<(), SchedulerError>
    where
        F: FnOnce() + Send + 'static,
    {
        let tag = checked_tag(tag)?;
        self.shared.insert(ScheduleEntry {
            tag,
            deadline: at_nanos,
            task: Task::Once(Box::new(job)),
        })
    }

    /// One-shot job that can be cancelled until it starts running.
    ///
    /// The heap entry is left in place on cancel and discarded when it
    /// reaches the front of the queue.
    pub fn schedule_cancellable_once<F>(
        &self,
        tag: &str,
        at_nanos: u64,
        job: F,
    ) -> Result<CancelHandle, SchedulerError>
    where
        F: FnOnce() + Send + 'static,
    {
        let tag = checked_tag(tag)?;
        let handle = CancelHandle::new();
        self.shared.insert(ScheduleEntry {
            tag,
            deadline: at_nanos,
            task: Task::Cancellable {
                job: Box::new(job),
                cancelled: Arc::clone(&handle.flag),
            },
        })?;
        Ok(handle)
    }

    /// Periodic job on a fixed grid `first_at + k * period`.
    ///
    /// The next deadline is enqueued before each run. With `skippable`, a
    /// next deadline that has already passed jumps forward by whole periods
    /// until it is no longer late; without it, deadlines advance by strict
    /// addition and the job may fall permanently behind.
    pub fn schedule_fixed_rate<F>(
        &self,
        tag: &str,
        first_at: u64,
        period_nanos: u64,
        skippable: bool,
        job: F,
    ) -> Result<CancelHandle, SchedulerError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let tag = checked_tag(tag)?;
        checked_period(period_nanos)?;
        let handle = CancelHandle::new();
        self.shared.insert(ScheduleEntry {
            tag,
            deadline: first_at,
            task: Task::FixedRate {
                job: Arc::new(job),
                period: period_nanos,
                skippable,
                cancelled: Arc::clone(&handle.flag),
            },
        })?;
        Ok(handle)
    }

    /// Periodic job spaced `period` after each run completes.
    ///
    /// The gap between runs is exact; absolute phase drifts under load.
    pub fn schedule_variable_rate<F>(
        &self,
        tag: &str,
        period_nanos: u64,
        job: F,
    ) -> Result<CancelHandle, SchedulerError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let tag = checked_tag(tag)?;
        checked_period(period_nanos)?;
        let handle = CancelHandle::new();
        self.shared.insert(ScheduleEntry {
            tag,
            deadline: self.now_nanos().saturating_add(period_nanos),
            task: Task::VariableRate {
                job: Arc::new(job),
                period: period_nanos,
                cancelled: Arc::clone(&handle.flag),
            },
        })?;
        Ok(handle)
    }

    /// Tag of the job currently executing, if any.
    pub fn active_tag(&self) -> Option<String> {
        self.shared.active.lock().as_deref().map(str::to_string)
    }

    /// Number of queued jobs that have not been cancelled.
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().live()
    }

    /// Queued, non-cancelled jobs in firing order.
    pub fn snapshot(&self) -> Vec<QueuedJob> {
        self.shared
            .queue
            .lock()
            .snapshot()
            .into_iter()
            .map(|(tag, deadline_nanos)| QueuedJob {
                tag: tag.to_string(),
                deadline_nanos,
            })
            .collect()
    }

    pub fn is_terminated(&self) -> bool {
        self.shared.terminated.load(Ordering::SeqCst)
    }

    /// Stops dispatching. Queued jobs are dropped without running.
    pub fn terminate(&self) {
        let mut queue = self.shared.queue.lock();
        self.shared.terminated.store(true, Ordering::SeqCst);
        queue.clear();
        drop(queue);
        self.shared.signal.notify_all();
        debug!("Scheduler '{}' terminated", self.shared.config.thread_name);
    }

    /// Waits for the dispatch thread to exit and returns how it ended.
    ///
    /// Must not be called from a scheduled job. Returns `Ok(())` for a
    /// scheduler without a thread or one that was already joined.
    pub fn join(&self) -> Result<(), SchedulerError> {
        let handle = self.shared.thread.lock().take();
        match handle {
            Some(handle) => handle.join().map_err(|_| SchedulerError::ThreadPanicked)?,
            None => Ok(()),
        }
    }
}

impl Scheduler<VirtualClock> {
    /// Creates a scheduler without a thread whose jobs run inside
    /// `VirtualClock::advance`, on the advancing thread.
    pub fn driven_by(clock: &Arc<VirtualClock>) -> Result<Self, SchedulerError> {
        let shared = Arc::new(Shared::new(Arc::clone(clock), SchedulerConfig::default()));
        let driver: Weak<dyn ClockDriver> = Arc::downgrade(&shared) as Weak<dyn ClockDriver>;
        clock.attach(driver)?;
        Ok(Self { shared })
    }
}

impl<T: TimeSource> Shared<T> {
    fn new(time: Arc<T>, config: SchedulerConfig) -> Self {
        Self {
            time,
            queue: Mutex::new(JobQueue::new()),
            signal: Condvar::new(),
            terminated: AtomicBool::new(false),
            active: Mutex::new(None),
            config,
            thread: Mutex::new(None),
        }
    }

    fn insert(&self, entry: ScheduleEntry) -> Result<(), SchedulerError> {
        let mut queue = self.queue.lock();
        if self.terminated.load(Ordering::SeqCst) {
            return Err(SchedulerError::Terminated);
        }
        queue.push(entry);
        drop(queue);
        self.signal.notify_all();
        Ok(())
    }

    /// Body of the dispatch thread.
    fn dispatch_loop(&self) -> Result<(), SchedulerError> {
        loop {
            let (tag, runnable) = {
                let mut queue = self.queue.lock();
                loop {
                    if self.terminated.load(Ordering::SeqCst) {
                        debug!("Dispatch thread exiting");
                        return Ok(());
                    }
                    let now = self.time.now_nanos();
                    let timeout = match queue.peek_deadline() {
                        None => Some(0),
                        Some(deadline) if deadline > now => Some(millis_until(now, deadline)),
                        Some(_) => None,
                    };
                    if let Some(timeout) = timeout {
                        if self.time.wait_on(&self.signal, &mut queue, timeout).is_err() {
                            if self.terminated.load(Ordering::SeqCst) {
                                return Ok(());
                            }
                            error!("Dispatch thread interrupted while not terminating");
                            return Err(SchedulerError::Interrupted);
                        }
                        continue;
                    }
                    let Some(entry) = queue.pop() else {
                        continue;
                    };
                    if let Some(ready) = self.prepare(&mut queue, entry, now) {
                        break ready;
                    }
                }
            };
            self.run(tag, runnable);
        }
    }

    /// Runs every entry due at or before `limit` on the calling thread.
    fn drain_due(&self, limit: u64) {
        loop {
            let (tag, runnable) = {
                let mut queue = self.queue.lock();
                if self.terminated.load(Ordering::SeqCst) {
                    return;
                }
                match queue.peek_deadline() {
                    Some(deadline) if deadline <= limit => {}
                    _ => return,
                }
                let Some(entry) = queue.pop() else {
                    return;
                };
                let now = self.time.now_nanos();
                match self.prepare(&mut queue, entry, now) {
                    Some(ready) => ready,
                    None => continue,
                }
            };
            self.run(tag, runnable);
        }
    }

    /// Turns a popped entry into a runnable job, under the queue lock.
    ///
    /// Returns `None` for cancelled entries. Fixed-rate jobs get their next
    /// deadline enqueued here, before they run.
    fn prepare(
        &self,
        queue: &mut JobQueue,
        entry: ScheduleEntry,
        now: u64,
    ) -> Option<(Arc<str>, Runnable)> {
        let ScheduleEntry { tag, deadline, task } = entry;
        if task.is_cancelled() {
            return None;
        }
        match task {
            Task::Once(job) | Task::Cancellable { job, .. } => Some((tag, Runnable::Once(job))),
            Task::FixedRate {
                job,
                period,
                skippable,
                cancelled,
            } => {
                let mut next = deadline.saturating_add(period);
                if skippable && next < now {
                    let missed = (now - next).div_ceil(period);
                    next = next.saturating_add(missed.saturating_mul(period));
                    if self.config.warn_on_skip {
                        warn!("Job '{}' fell behind; skipped {} period(s)", tag, missed);
                    }
                }
                queue.push(ScheduleEntry {
                    tag: Arc::clone(&tag),
                    deadline: next,
                    task: Task::FixedRate {
                        job: Arc::clone(&job),
                        period,
                        skippable,
                        cancelled,
                    },
                });
                Some((tag, Runnable::Fixed(job)))
            }
            Task::VariableRate {
                job,
                period,
                cancelled,
            } => Some((
                tag,
                Runnable::Variable {
                    job,
                    period,
                    cancelled,
                },
            )),
        }
    }

    /// Runs a job with the queue unlocked, reporting it as active.
    fn run(&self, tag: Arc<str>, runnable: Runnable) {
        *self.active.lock() = Some(Arc::clone(&tag));
        match runnable {
            Runnable::Once(job) => {
                run_guarded("Scheduled job", &tag, job);
            }
            Runnable::Fixed(job) => {
                run_guarded("Scheduled job", &tag, || job());
            }
            Runnable::Variable {
                job,
                period,
                cancelled,
            } => {
                run_guarded("Scheduled job", &tag, || job());
                let mut queue = self.queue.lock();
                if !cancelled.load(Ordering::SeqCst) && !self.terminated.load(Ordering::SeqCst) {
                    queue.push(ScheduleEntry {
                        tag: Arc::clone(&tag),
                        deadline: self.time.now_nanos().saturating_add(period),
                        task: Task::VariableRate {
                            job,
                            period,
                            cancelled,
                        },
                    });
                }
                drop(queue);
                self.signal.notify_all();
            }
        }
        *self.active.lock() = None;
    }
}

impl<T: TimeSource> ClockDriver for Shared<T> {
    fn next_deadline(&self) -> Option<u64> {
        if self.terminated.load(Ordering::SeqCst) {
            return None;
        }
        self.queue.lock().peek_deadline()
    }

    fn run_due(&self, now_nanos: u64) {
        self.drain_due(now_nanos);
    }
}

fn checked_tag(tag: &str) -> Result<Arc<str>, SchedulerError> {
    if tag.trim().is_empty() {
        return Err(SchedulerError::invalid("job tag must not be empty"));
    }
    Ok(Arc::from(tag))
}

fn checked_period(period_nanos: u64) -> Result<(), SchedulerError> {
    if period_nanos == 0 {
        return Err(SchedulerError::invalid("period must be greater than zero"));
    }
    Ok(())
}

/// Whole milliseconds to wait so that `deadline` has passed. Never zero,
/// since a zero timeout means "wait indefinitely".
fn millis_until(now: u64, deadline: u64) -> u64 {
    (deadline - now).div_ceil(NANOS_PER_MILLI).max(1)
}
