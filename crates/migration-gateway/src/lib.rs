//! Progressive migration gateway: routes each inbound request to a legacy or
//! a new backend (or both, via dual-write or shadow mode) according to an
//! ordered rule set, with every backend call wrapped in retry and
//! circuit-breaker protection.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod comparison;
mod config;
mod decision;
mod error;
mod gateway;
mod metrics;
mod proxy;
mod request;
mod response;
mod route;
mod server;
mod store;
mod strategy;
mod upstream;

pub use comparison::*;
pub use config::*;
pub use decision::*;
pub use error::*;
pub use gateway::*;
pub use metrics::*;
pub use proxy::*;
pub use request::*;
pub use response::*;
pub use route::*;
pub use server::*;
pub use store::*;
pub use strategy::*;
pub use upstream::*;
