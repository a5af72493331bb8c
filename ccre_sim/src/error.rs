//! Errors raised while setting up or loading a simulation.

use ccre_core::{ArbitrationError, SchedulerError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Arbitration(#[from] ArbitrationError),
}

/// Process exit code for a run in which some scenario failed.
pub const EXIT_FAILED_RUN: i32 = 1;

/// Process exit code for a bad flag, config file, or scenario name.
pub const EXIT_INVALID_CONFIG: i32 = 2;

impl SimError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Exit code the CLI reports for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::UnknownScenario(_) | Self::Io(_) | Self::Json(_) => {
                EXIT_INVALID_CONFIG
            }
            Self::Scheduler(_) | Self::Arbitration(_) => EXIT_FAILED_RUN,
        }
    }
}
