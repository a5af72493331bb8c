//! Core time source trait consumed by the CCRE scheduler.

use crate::error::EnvError;
use parking_lot::{Condvar, MutexGuard};

/// The central interface for time.
///
/// This trait abstracts the "real clock" so that the scheduler can run
/// against both the production clock and a virtual clock in tests.
///
/// # Implementations
///
/// - **Production**: `MonotonicClock` - wraps `std::time::Instant`
/// - **Simulation**: `VirtualClock` - explicit virtual nanoseconds
///
/// # Monotonicity
///
/// Timestamps need not track wall-clock time, but they must never go
/// backwards: the scheduler compares them against absolute deadlines.
pub trait TimeSource: Send + Sync + 'static {
    /// Returns the current monotonic time in nanoseconds.
    fn now_nanos(&self) -> u64;

    /// Returns the current monotonic time in milliseconds.
    fn now_millis(&self) -> u64 {
        self.now_nanos() / 1_000_000
    }

    /// Suspends the calling thread for `millis` milliseconds.
    ///
    /// In simulation this advances the virtual clock instead of blocking.
    fn sleep_for(&self, millis: u64);

    /// Waits on `signal`, releasing `guard` while blocked.
    ///
    /// A `timeout_millis` of zero means "wait indefinitely". Implementations
    /// may return early (spurious wakeup); callers re-check their condition.
    ///
    /// # Returns
    /// * `Ok(())` - woken, timed out, or spurious wakeup
    /// * `Err(EnvError::Interrupted)` - the time source was closed
    fn wait_on<G>(
        &self,
        signal: &Condvar,
        guard: &mut MutexGuard<'_, G>,
        timeout_millis: u64,
    ) -> Result<(), EnvError>;

    /// Retires this provider, waking any waiters so they observe the swap.
    fn close(&self);

    /// Returns true once `close` has been called.
    fn is_closed(&self) -> bool;
}
