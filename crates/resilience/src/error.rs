use std::time::Duration;

use thiserror::Error;

use crate::Classify;

/// Errors produced by a [`crate::ResiliencePipeline`].
#[derive(Debug, Error)]
pub enum Error<E> {
    /// The circuit for the target is open; no call was attempted.
    #[error("circuit '{name}' is open")]
    CircuitOpen {
        /// Name of the protected target.
        name: String,
    },

    /// A single attempt exceeded its time budget.
    #[error("call to '{name}' timed out after {after:?}")]
    Timeout {
        /// Name of the protected target.
        name: String,
        /// The per-attempt budget that elapsed.
        after: Duration,
    },

    /// The wrapped operation failed.
    #[error("{0}")]
    Operation(E),
}

impl<E: Classify> Classify for Error<E> {
    fn is_transient(&self) -> bool {
        match self {
            Self::CircuitOpen { .. } => false,
            Self::Timeout { .. } => true,
            Self::Operation(e) => e.is_transient(),
        }
    }
}
