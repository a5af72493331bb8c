//! Runtime context: one time source plus the scheduler that reads it.
//!
//! There are no process-wide singletons. Code that needs the clock or the
//! scheduler is handed a `Runtime` (or a clone of its parts). Swapping time
//! providers means building a new runtime.

use crate::error::SchedulerError;
use crate::scheduler::{CancelHandle, Scheduler, SchedulerConfig, NANOS_PER_MILLI};
use ccre_env::{MonotonicClock, TimeSource, VirtualClock};
use std::sync::Arc;
use tracing::info;

pub struct Runtime<T: TimeSource = MonotonicClock> {
    time: Arc<T>,
    scheduler: Scheduler<T>,
}

impl<T: TimeSource> Clone for Runtime<T> {
    fn clone(&self) -> Self {
        Self {
            time: Arc::clone(&self.time),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<T: TimeSource> Runtime<T> {
    /// Starts a threaded scheduler on `time`.
    pub fn start(time: Arc<T>, config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let scheduler = Scheduler::start(Arc::clone(&time), config)?;
        Ok(Self { time, scheduler })
    }

    pub fn time(&self) -> &Arc<T> {
        &self.time
    }

    pub fn scheduler(&self) -> &Scheduler<T> {
        &self.scheduler
    }

    pub fn now_nanos(&self) -> u64 {
        self.time.now_nanos()
    }

    pub fn now_millis(&self) -> u64 {
        self.time.now_millis()
    }

    /// Absolute deadline `millis` from now.
    pub fn after_millis(&self, millis: u64) -> u64 {
        self.scheduler.after_millis(millis)
    }

    /// Skippable fixed-rate job, first run one period from now.
    pub fn every_millis<F>(
        &self,
        tag: &str,
        period_millis: u64,
        job: F,
    ) -> Result<CancelHandle, SchedulerError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.scheduler.schedule_fixed_rate(
            tag,
            self.after_millis(period_millis),
            period_millis.saturating_mul(NANOS_PER_MILLI),
            true,
            job,
        )
    }

    /// Terminates the scheduler, closes the time source, then joins.
    pub fn shutdown(&self) -> Result<(), SchedulerError> {
        self.scheduler.terminate();
        self.time.close();
        let result = self.scheduler.join();
        info!("Runtime shut down at {} ms", self.now_millis());
        result
    }
}

impl Runtime<MonotonicClock> {
    /// Wall-clock runtime with default scheduler settings.
    pub fn realtime() -> Result<Self, SchedulerError> {
        Self::start(MonotonicClock::shared(), SchedulerConfig::default())
    }
}

impl Runtime<VirtualClock> {
    /// Deterministic runtime; jobs run inside `advance_millis`.
    pub fn virtual_time() -> Result<Self, SchedulerError> {
        let time = VirtualClock::shared();
        let scheduler = Scheduler::driven_by(&time)?;
        Ok(Self { time, scheduler })
    }

    pub fn advance_millis(&self, millis: u64) {
        self.time.advance_millis(millis);
    }
}
