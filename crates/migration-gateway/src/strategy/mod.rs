//! Multi-backend strategies. Each has one authoritative leg whose outcome the
//! client sees, and one detached leg whose failures only reach logs and
//! metrics.

mod dual_write;
mod shadow;

pub use dual_write::DualWriteStrategy;
pub use shadow::ShadowStrategy;
