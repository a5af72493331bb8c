//! CCRE Core - Reactive Control Runtime for Robots
//!
//! This library provides the three layers a robot control program is built on:
//! 1. **Scheduler**: deadline-ordered one-shot and periodic jobs on an injected clock
//! 2. **Channels**: push-based values and events wired between producers and consumers
//! 3. **Behaviors**: priority arbitration that routes per-mode overrides to shared outputs
//!
//! Time is always read through a `ccre_env::TimeSource`, so the same wiring runs
//! against the wall clock or a deterministic `VirtualClock`.

pub mod behaviors;
pub mod channel;
pub mod error;
pub mod introspect;
pub mod runtime;
pub mod scheduler;

mod panics;

// Re-export key types for convenience
pub use behaviors::{
    Arbitrated, ArbitratedBoolean, ArbitratedDiscrete, ArbitratedEvent, ArbitratedFloat, Behavior,
    BehaviorArbitrator, BehaviorStatus,
};
pub use channel::{
    constant, BooleanCell, BooleanInput, BooleanOutput, Cell, ChannelValue, Constant, Derived,
    Discrete, DiscreteCell, DiscreteInput, DiscreteOutput, EventCell, EventInput, EventOutput,
    FloatCell, FloatInput, FloatOutput, Input, Output, Subscription, Updating,
};
pub use error::{ArbitrationError, CcreError, SchedulerError};
pub use introspect::{Introspect, IntrospectionTable};
pub use runtime::Runtime;
pub use scheduler::{CancelHandle, QueuedJob, Scheduler, SchedulerConfig, NANOS_PER_MILLI};

pub use ccre_env::{EnvError, MonotonicClock, TimeSource, VirtualClock};

/// Glob-importable set of traits and the most used types.
pub mod prelude {
    pub use crate::behaviors::{Behavior, BehaviorArbitrator};
    pub use crate::channel::{
        BooleanCell, EventCell, EventInput, EventOutput, FloatCell, Input, Output, Updating,
    };
    pub use crate::runtime::Runtime;
    pub use ccre_env::TimeSource;
}
