//! Virtual clock implementing TimeSource for deterministic testing.

use crate::error::EnvError;
use crate::TimeSource;
use parking_lot::{Condvar, Mutex, MutexGuard, ReentrantMutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Real time a waiter blocks on a virtual clock before re-checking.
const VIRTUAL_POLL: Duration = Duration::from_millis(2);

/// Something whose pending work is released by virtual time.
///
/// A scheduler attached to a `VirtualClock` implements this so that
/// `advance` can run its due jobs synchronously on the advancing thread.
pub trait ClockDriver: Send + Sync {
    /// Earliest pending deadline in nanoseconds, if any.
    fn next_deadline(&self) -> Option<u64>;

    /// Runs every pending job whose deadline is `<= now_nanos`.
    fn run_due(&self, now_nanos: u64);
}

/// Deterministic clock that only moves when told to.
///
/// - `advance` steps virtual time to each due deadline in turn and runs the
///   jobs of every attached driver before moving on
/// - `sleep_for` moves virtual time without running anything, so a job can
///   model its own execution time
pub struct VirtualClock {
    /// Current virtual time (nanoseconds since clock creation)
    nanos: AtomicU64,

    /// Attached drivers, held weakly so a dropped scheduler detaches itself
    drivers: Mutex<Vec<Weak<dyn ClockDriver>>>,

    /// Serializes advances from different threads
    advancing: ReentrantMutex<()>,

    closed: AtomicBool,
}

impl VirtualClock {
    /// Creates a clock at virtual time zero.
    pub fn new() -> Self {
        Self {
            nanos: AtomicU64::new(0),
            drivers: Mutex::new(Vec::new()),
            advancing: ReentrantMutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    /// Creates an Arc-wrapped clock for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Attaches a driver whose due work runs during `advance`.
    pub fn attach(&self, driver: Weak<dyn ClockDriver>) -> Result<(), EnvError> {
        if self.is_closed() {
            return Err(EnvError::closed("cannot attach a driver to a closed virtual clock"));
        }
        self.drivers.lock().push(driver);
        Ok(())
    }

    /// Advances virtual time by `millis` milliseconds, firing due jobs.
    pub fn advance_millis(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    /// Advances virtual time by `duration`, firing due jobs in deadline order.
    ///
    /// Jobs that push the clock past the target with `sleep_for` leave any
    /// work they made late for the next advance.
    pub fn advance(&self, duration: Duration) {
        let _serial = self.advancing.lock();
        let target = self.now_nanos().saturating_add(duration.as_nanos() as u64);

        loop {
            let drivers = self.live_drivers();
            let next = drivers
                .iter()
                .filter_map(|driver| driver.next_deadline())
                .filter(|&deadline| deadline <= target)
                .min();
            let Some(deadline) = next else {
                break;
            };

            self.nanos.fetch_max(deadline, Ordering::SeqCst);
            let now = self.now_nanos();
            for driver in &drivers {
                driver.run_due(now);
            }
        }

        self.nanos.fetch_max(target, Ordering::SeqCst);
    }

    /// Returns the current virtual time as a Duration.
    pub fn now(&self) -> Duration {
        Duration::from_nanos(self.now_nanos())
    }

    fn live_drivers(&self) -> Vec<Arc<dyn ClockDriver>> {
        let mut drivers = self.drivers.lock();
        drivers.retain(|driver| driver.strong_count() > 0);
        drivers.iter().filter_map(Weak::upgrade).collect()
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for VirtualClock {
    fn now_nanos(&self) -> u64 {
        self.nanos.load(Ordering::SeqCst)
    }

    fn sleep_for(&self, millis: u64) {
        // In simulation, sleep advances virtual time
        self.nanos.fetch_add(millis.saturating_mul(1_000_000), Ordering::SeqCst);
    }

    fn wait_on<G>(
        &self,
        signal: &Condvar,
        guard: &mut MutexGuard<'_, G>,
        _timeout_millis: u64,
    ) -> Result<(), EnvError> {
        if self.is_closed() {
            return Err(EnvError::Interrupted);
        }
        // Virtual timeouts never elapse on their own; poll briefly instead.
        signal.wait_for(guard, VIRTUAL_POLL);
        if self.is_closed() {
            return Err(EnvError::Interrupted);
        }
        Ok(())
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!(now_nanos = self.now_nanos(), "virtual clock closed");
        }
        self.drivers.lock().clear();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
