use kgv_resilience::Classify;
use thiserror::Error;

/// Result type for handler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while dispatching or handling a request.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// The caller asked for the operation to stop.
    #[error("operation cancelled")]
    Cancelled,

    /// A handler type was registered more than once.
    #[error("duplicate handler registered for {type_name}")]
    DuplicateHandler {
        /// The request type with more than one handler.
        type_name: &'static str,
    },

    /// Handler failed for a reason that will not go away on retry.
    #[error("handler error: {0}")]
    Handler(String),

    /// No handler is registered for the request type.
    #[error("no handler registered for {type_name}")]
    NoHandler {
        /// The request type without a handler.
        type_name: &'static str,
    },

    /// Beginning, committing or rolling back a unit of work failed.
    #[error("transaction {stage} failed: {reason}")]
    Transaction {
        /// Which step failed.
        stage: &'static str,
        /// Underlying cause.
        reason: String,
    },

    /// Temporary failure; the request may succeed if attempted again.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The request was rejected as invalid.
    #[error("validation failed: {0}")]
    Validation(String),
}

impl Classify for Error {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
