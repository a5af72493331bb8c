//! CCRE Environment Abstraction Layer
//!
//! This crate provides the time abstraction allowing the CCRE scheduler to
//! run against both the **Production** clock and a **Simulation** clock.
//!
//! # Core Concept: Injected Time
//!
//! The scheduler never reads the OS clock directly. It asks its
//! `TimeSource` for the time and blocks through it, so a test can swap in a
//! `VirtualClock` and drive every deadline explicitly:
//!
//! ```ignore
//! use ccre_env::{TimeSource, VirtualClock};
//!
//! let clock = VirtualClock::shared();
//! // ... attach a scheduler driven by `clock` ...
//! clock.advance_millis(20); // runs everything due in the next 20ms
//! ```

mod error;
mod monotonic;
mod time;
mod virtual_clock;

pub use error::EnvError;
pub use monotonic::{MonotonicClock, DEFAULT_WAIT_SLICE_MILLIS};
pub use time::TimeSource;
pub use virtual_clock::{ClockDriver, VirtualClock};
