//! Simulation context: a virtual-time runtime plus a seeded RNG.

use crate::error::SimError;
use ccre_core::Runtime;
use ccre_env::VirtualClock;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Deterministic environment for one scenario run.
///
/// - Time only moves through `advance_millis` (or jobs calling `sleep_for`)
/// - All randomness comes from a ChaCha8 stream seeded by the master seed
pub struct SimContext {
    seed: u64,
    runtime: Runtime<VirtualClock>,
    rng: Mutex<ChaCha8Rng>,
}

impl SimContext {
    pub fn new(seed: u64) -> Result<Self, SimError> {
        Ok(Self {
            seed,
            runtime: Runtime::virtual_time()?,
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        })
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn runtime(&self) -> &Runtime<VirtualClock> {
        &self.runtime
    }

    pub fn now_millis(&self) -> u64 {
        self.runtime.now_millis()
    }

    /// Advances virtual time, running every job that comes due.
    pub fn advance_millis(&self, millis: u64) {
        self.runtime.advance_millis(millis);
    }

    /// Bernoulli draw with probability `p`.
    pub fn chance(&self, p: f64) -> bool {
        self.rng.lock().gen_bool(p.clamp(0.0, 1.0))
    }

    /// Uniform draw from `low..high` (returns `low` if the range is empty).
    pub fn below(&self, low: u64, high: u64) -> u64 {
        if high <= low {
            return low;
        }
        self.rng.lock().gen_range(low..high)
    }

    /// Uniform index into a collection of `len` items.
    pub fn pick(&self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        self.rng.lock().gen_range(0..len)
    }

    /// Uniform float in `[-1, 1)`, the range of a joystick axis.
    pub fn axis(&self) -> f32 {
        self.rng.lock().gen_range(-1.0f32..1.0)
    }
}
