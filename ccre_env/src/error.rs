//! Error types for the CCRE time source abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    /// A blocking wait was cut short because the time source was closed.
    ///
    /// This is how a waiter learns that its provider has been retired.
    #[error("Interrupted: time source closed while waiting")]
    Interrupted,

    /// The time source was already closed when the operation was attempted.
    #[error("Time source closed: {0}")]
    Closed(String),
}

impl EnvError {
    /// Creates a closed error.
    pub fn closed(msg: impl Into<String>) -> Self {
        Self::Closed(msg.into())
    }
}
