//! Production implementation of TimeSource backed by `std::time::Instant`.

use crate::error::EnvError;
use crate::TimeSource;
use parking_lot::{Condvar, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default upper bound on a single blocking wait, in milliseconds.
pub const DEFAULT_WAIT_SLICE_MILLIS: u64 = 250;

/// Production clock backed by the OS monotonic clock.
///
/// Blocking waits are split into slices of at most `wait_slice` so that a
/// `close()` is noticed even by a waiter that asked to wait indefinitely.
pub struct MonotonicClock {
    /// Start time for monotonic duration calculations
    start: Instant,

    /// Upper bound on one condvar wait
    wait_slice: Duration,

    closed: AtomicBool,
}

impl MonotonicClock {
    /// Creates a new MonotonicClock.
    pub fn new() -> Self {
        Self::with_wait_slice(DEFAULT_WAIT_SLICE_MILLIS)
    }

    /// Creates a clock whose blocking waits last at most `millis` each.
    pub fn with_wait_slice(millis: u64) -> Self {
        Self {
            start: Instant::now(),
            wait_slice: Duration::from_millis(millis.max(1)),
            closed: AtomicBool::new(false),
        }
    }

    /// Creates an Arc-wrapped clock for sharing across threads.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicClock {
    fn now_nanos(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }

    fn sleep_for(&self, millis: u64) {
        std::thread::sleep(Duration::from_millis(millis));
    }

    fn wait_on<G>(
        &self,
        signal: &Condvar,
        guard: &mut MutexGuard<'_, G>,
        timeout_millis: u64,
    ) -> Result<(), EnvError> {
        if self.is_closed() {
            return Err(EnvError::Interrupted);
        }
        let slice = if timeout_millis == 0 {
            self.wait_slice
        } else {
            Duration::from_millis(timeout_millis).min(self.wait_slice)
        };
        signal.wait_for(guard, slice);
        if self.is_closed() {
            return Err(EnvError::Interrupted);
        }
        Ok(())
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("monotonic clock closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_monotonic_clock_time() {
        let clock = MonotonicClock::new();
        let t1 = clock.now_nanos();
        clock.sleep_for(10);
        let t2 = clock.now_nanos();

        assert!(t2 > t1);
        assert!(t2 - t1 >= 10_000_000);
        assert_eq!(clock.now_millis(), clock.now_nanos() / 1_000_000);
    }

    #[test]
    fn test_wait_on_times_out() {
        let clock = MonotonicClock::new();
        let lock = Mutex::new(());
        let signal = Condvar::new();

        let mut guard = lock.lock();
        let before = clock.now_millis();
        assert_eq!(clock.wait_on(&signal, &mut guard, 20), Ok(()));
        assert!(clock.now_millis() >= before + 15);
    }

    #[test]
    fn test_closed_clock_interrupts_waiters() {
        let clock = MonotonicClock::with_wait_slice(5);
        let lock = Mutex::new(());
        let signal = Condvar::new();
        clock.close();

        let mut guard = lock.lock();
        assert_eq!(
            clock.wait_on(&signal, &mut guard, 0),
            Err(EnvError::Interrupted)
        );
        assert!(clock.is_closed());
    }

    #[test]
    fn test_close_observed_by_indefinite_wait() {
        let clock = Arc::new(MonotonicClock::with_wait_slice(5));
        let lock = Arc::new(Mutex::new(()));
        let signal = Arc::new(Condvar::new());

        let waiter = {
            let (clock, lock, signal) = (clock.clone(), lock.clone(), signal.clone());
            std::thread::spawn(move || {
                let mut guard = lock.lock();
                loop {
                    if let Err(e) = clock.wait_on(&signal, &mut guard, 0) {
                        return e;
                    }
                }
            })
        };

        std::thread::sleep(Duration::from_millis(20));
        clock.close();
        assert_eq!(waiter.join().unwrap(), EnvError::Interrupted);
    }
}
