//! Decorators wrapping an inner [`crate::Handler`].

mod caching;
mod logging;
mod retry;
mod transaction;

pub use caching::*;
pub use logging::*;
pub use retry::*;
pub use transaction::*;
