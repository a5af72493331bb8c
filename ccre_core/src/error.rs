//! Error types for the CCRE engine.
//!
//! Every variant here is a wiring bug detected at setup time. Runtime
//! failures inside listeners and scheduled jobs are caught and logged
//! instead of being returned.

use ccre_env::EnvError;
use thiserror::Error;

/// Scheduler registration and dispatch errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Scheduler terminated")]
    Terminated,

    /// The time source was closed while the dispatch thread was waiting and
    /// no termination had been requested.
    #[error("Dispatch thread interrupted")]
    Interrupted,

    #[error("Time source error: {0}")]
    Env(#[from] EnvError),

    #[error("Failed to spawn dispatch thread: {0}")]
    Spawn(String),

    #[error("Dispatch thread panicked")]
    ThreadPanicked,
}

/// Behavior arbitration wiring errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArbitrationError {
    #[error("Invalid behavior name: {0:?}")]
    InvalidName(String),

    #[error("Behavior {behavior:?} belongs to arbitrator {owner:?}, not {arbitrator:?}")]
    ForeignBehavior {
        behavior: String,
        owner: String,
        arbitrator: String,
    },

    #[error("Behavior {0:?} already has an override on this channel")]
    DuplicateOverride(String),
}

/// Umbrella error for code that wires both schedulers and behaviors
#[derive(Debug, Error)]
pub enum CcreError {
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Arbitration(#[from] ArbitrationError),

    #[error(transparent)]
    Env(#[from] EnvError),
}

impl SchedulerError {
    /// Creates an invalid argument error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}
