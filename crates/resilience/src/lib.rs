//! Fault-detection primitives shared by the migration gateway and the
//! command/query pipeline: a per-target circuit breaker, a capped exponential
//! retry policy, and a pipeline composing the two around an async call.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod circuit_breaker;
mod error;
mod pipeline;
mod registry;
mod retry;

pub use circuit_breaker::*;
pub use error::*;
pub use pipeline::*;
pub use registry::*;
pub use retry::*;

/// Classifies a failure for retry and circuit-breaker accounting.
pub trait Classify {
    /// Whether the failure indicates temporary unavailability of the target
    /// (and may therefore succeed when attempted again).
    fn is_transient(&self) -> bool;
}
