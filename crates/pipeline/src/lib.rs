//! Command and query dispatch with a fixed chain of cross-cutting decorators.
//!
//! Handlers are plain values implementing [`Handler`]. Each decorator wraps
//! an inner handler and implements the same trait, so a pipeline is built by
//! explicit construction, outermost to innermost:
//! transaction → retry → logging → caching → handler.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod compose;
mod context;
mod decorators;
mod dispatcher;
mod error;
mod handler;
mod request;

pub use compose::*;
pub use context::*;
pub use decorators::*;
pub use dispatcher::*;
pub use error::*;
pub use handler::*;
pub use request::*;
