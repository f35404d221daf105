//! Routing decision engine.

use std::sync::Arc;

use http::Method;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::request::is_mutating;
use crate::route::Route;

/// Where a request goes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingTarget {
    /// Only the new system.
    NewSystem,

    /// Only the legacy system.
    LegacySystem,

    /// New system authoritatively, then replicated to legacy.
    DualWrite,

    /// Legacy authoritatively, mirrored to the new system for comparison.
    Shadow,
}

/// Outcome of routing one request.
#[derive(Clone, Debug)]
pub struct RoutingDecision {
    /// Chosen target.
    pub target: RoutingTarget,

    /// The route that produced the decision; `None` when nothing matched.
    pub route: Option<Arc<Route>>,
}

/// Picks a [`RoutingTarget`] for a matched route.
///
/// Priority: no route → legacy; mutating verb with dual-write → dual-write;
/// shadow mode → shadow; otherwise the migration percentage splits traffic.
#[derive(Debug)]
pub struct DecisionEngine {
    rng: Mutex<StdRng>,
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionEngine {
    /// Engine drawing from an entropy-seeded generator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Engine with reproducible draws.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Decide where a request with `method` matched by `route` goes.
    pub fn decide(&self, route: Option<&Arc<Route>>, method: &Method) -> RoutingDecision {
        let Some(route) = route else {
            return RoutingDecision {
                target: RoutingTarget::LegacySystem,
                route: None,
            };
        };

        let target = if is_mutating(method) && route.dual_write_enabled() {
            RoutingTarget::DualWrite
        } else if route.shadow_mode_enabled() {
            RoutingTarget::Shadow
        } else {
            self.split(route.migration_percentage())
        };

        RoutingDecision {
            target,
            route: Some(route.clone()),
        }
    }

    fn split(&self, percentage: u8) -> RoutingTarget {
        match percentage {
            0 => RoutingTarget::LegacySystem,
            p if p >= 100 => RoutingTarget::NewSystem,
            p => {
                let roll: u8 = self.rng.lock().gen_range(0..100);
                if roll < p {
                    RoutingTarget::NewSystem
                } else {
                    RoutingTarget::LegacySystem
                }
            }
        }
    }
}
