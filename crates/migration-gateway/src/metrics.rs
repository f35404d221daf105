use std::sync::atomic::{AtomicU64, Ordering};

use http::StatusCode;
use serde::Serialize;
use tracing::{debug, info};

use crate::comparison::ResponseComparison;
use crate::decision::{RoutingDecision, RoutingTarget};

/// Receives gateway observability events.
pub trait MetricsSink: Send + Sync + 'static {
    /// A routing decision was made.
    fn record_routing_decision(&self, decision: &RoutingDecision);

    /// A call to the legacy backend finished; `None` when no response was
    /// obtained.
    fn record_legacy_call(&self, status: Option<StatusCode>);

    /// Replicating a dual-write to legacy failed.
    fn record_dual_write_failure(&self);

    /// A shadowed request was compared.
    fn record_shadow_comparison(&self, comparison: &ResponseComparison);

    /// Current counter values, when the sink keeps any.
    fn snapshot(&self) -> Option<MetricsSnapshot> {
        None
    }
}

/// Point-in-time counter values.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// Requests routed to the new system only.
    pub routed_new: u64,
    /// Requests routed to legacy only.
    pub routed_legacy: u64,
    /// Requests routed as dual-writes.
    pub routed_dual_write: u64,
    /// Requests routed in shadow mode.
    pub routed_shadow: u64,
    /// Legacy calls that produced a response.
    pub legacy_calls: u64,
    /// Legacy calls that produced no response.
    pub legacy_call_errors: u64,
    /// Failed dual-write replications.
    pub dual_write_failures: u64,
    /// Shadow comparisons recorded.
    pub shadow_comparisons: u64,
    /// Shadow comparisons that did not match.
    pub shadow_mismatches: u64,
}

/// In-process counters that also emit tracing events.
#[derive(Debug, Default)]
pub struct GatewayMetrics {
    routed_new: AtomicU64,
    routed_legacy: AtomicU64,
    routed_dual_write: AtomicU64,
    routed_shadow: AtomicU64,
    legacy_calls: AtomicU64,
    legacy_call_errors: AtomicU64,
    dual_write_failures: AtomicU64,
    shadow_comparisons: AtomicU64,
    shadow_mismatches: AtomicU64,
}

impl GatewayMetrics {
    /// Fresh, zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetricsSink for GatewayMetrics {
    fn record_routing_decision(&self, decision: &RoutingDecision) {
        let counter = match decision.target {
            RoutingTarget::NewSystem => &self.routed_new,
            RoutingTarget::LegacySystem => &self.routed_legacy,
            RoutingTarget::DualWrite => &self.routed_dual_write,
            RoutingTarget::Shadow => &self.routed_shadow,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        debug!(
            routing_target = ?decision.target,
            route = decision.route.as_ref().map(|route| route.pattern()),
            "routing decision"
        );
    }

    fn record_legacy_call(&self, status: Option<StatusCode>) {
        match status {
            Some(status) => {
                self.legacy_calls.fetch_add(1, Ordering::Relaxed);
                debug!(status = status.as_u16(), "legacy call");
            }
            None => {
                self.legacy_call_errors.fetch_add(1, Ordering::Relaxed);
                debug!("legacy call without response");
            }
        }
    }

    fn record_dual_write_failure(&self) {
        let total = self.dual_write_failures.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(total, "dual-write failure recorded");
    }

    fn record_shadow_comparison(&self, comparison: &ResponseComparison) {
        self.shadow_comparisons.fetch_add(1, Ordering::Relaxed);
        if comparison.is_match() {
            debug!(path = %comparison.path, "shadow responses match");
        } else {
            self.shadow_mismatches.fetch_add(1, Ordering::Relaxed);
            info!(
                path = %comparison.path,
                method = %comparison.method,
                legacy_status = comparison.legacy_status,
                new_status = comparison.new_status,
                differences = comparison.differences.as_ref().map_or(0, |d| d.len()),
                "shadow responses differ"
            );
        }
    }

    fn snapshot(&self) -> Option<MetricsSnapshot> {
        Some(MetricsSnapshot {
            routed_new: self.routed_new.load(Ordering::Relaxed),
            routed_legacy: self.routed_legacy.load(Ordering::Relaxed),
            routed_dual_write: self.routed_dual_write.load(Ordering::Relaxed),
            routed_shadow: self.routed_shadow.load(Ordering::Relaxed),
            legacy_calls: self.legacy_calls.load(Ordering::Relaxed),
            legacy_call_errors: self.legacy_call_errors.load(Ordering::Relaxed),
            dual_write_failures: self.dual_write_failures.load(Ordering::Relaxed),
            shadow_comparisons: self.shadow_comparisons.load(Ordering::Relaxed),
            shadow_mismatches: self.shadow_mismatches.load(Ordering::Relaxed),
        })
    }
}
