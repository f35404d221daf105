//! The gateway facade: route, decide, dispatch to a strategy.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{DefaultBodyLimit, State};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use bytes::Bytes;
use http::{HeaderMap, Method, Uri};
use kgv_resilience::{CircuitBreakerConfig, CircuitSnapshot, RetryPolicy};
use serde::Serialize;
use tokio_util::task::TaskTracker;
use tracing::{info, instrument};

use crate::comparison::{BodyComparator, JsonBodyComparator};
use crate::config::GatewayConfig;
use crate::decision::{DecisionEngine, RoutingDecision, RoutingTarget};
use crate::error::{Error, ProxyError};
use crate::metrics::{GatewayMetrics, MetricsSink, MetricsSnapshot};
use crate::proxy::ProxyExecutor;
use crate::request::ProxiedRequest;
use crate::response::ProxiedResponse;
use crate::route::{MigrationRoute, RouteTable};
use crate::store::{ComparisonStore, JsonlComparisonStore, MemoryComparisonStore};
use crate::strategy::{DualWriteStrategy, ShadowStrategy};
use crate::upstream::{BackendKind, Backends, HttpUpstream};

/// Everything needed to assemble a [`MigrationGateway`].
pub struct GatewayOptions {
    /// Backends taking part in the migration.
    pub backends: Backends,

    /// Circuit breaker thresholds, applied per backend.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Differ for shadow responses.
    pub comparator: Arc<dyn BodyComparator>,

    /// Destination of shadow comparisons.
    pub comparison_store: Arc<dyn ComparisonStore>,

    /// Fixed seed for percentage routing.
    pub decision_seed: Option<u64>,

    /// Largest request body accepted.
    pub max_body_bytes: usize,

    /// Observability sink.
    pub metrics: Arc<dyn MetricsSink>,

    /// Ordered migration routes.
    pub routes: Vec<MigrationRoute>,

    /// Retry policy for every backend call.
    pub retry: RetryPolicy,

    /// Budget for a single backend attempt.
    pub attempt_timeout: Duration,

    /// Budget for dual-write replication.
    pub replica_timeout: Duration,

    /// Budget for the mirrored shadow call.
    pub shadow_timeout: Duration,
}

/// Gateway state as reported by the status endpoint.
#[derive(Debug, Serialize)]
pub struct GatewayStatus {
    /// Circuit state per backend called so far.
    pub circuits: Vec<CircuitSnapshot>,

    /// Counter values, if the sink keeps any.
    pub metrics: Option<MetricsSnapshot>,

    /// Number of configured routes.
    pub routes: usize,
}

/// Progressive migration gateway.
pub struct MigrationGateway {
    dual_write: DualWriteStrategy,
    engine: DecisionEngine,
    executor: ProxyExecutor,
    max_body_bytes: usize,
    routes: RouteTable,
    shadow: ShadowStrategy,
    task_tracker: TaskTracker,
}

impl MigrationGateway {
    /// Assemble a gateway. Fails if any route is malformed.
    pub fn new(options: GatewayOptions) -> Result<Self, Error> {
        let routes = RouteTable::new(options.routes)?;
        let engine = options
            .decision_seed
            .map_or_else(DecisionEngine::new, DecisionEngine::with_seed);

        let executor = ProxyExecutor::new(
            options.backends,
            options.retry,
            options.circuit_breaker,
            options.attempt_timeout,
            options.metrics,
        );

        let task_tracker = TaskTracker::new();
        let dual_write = DualWriteStrategy::new(
            executor.clone(),
            task_tracker.clone(),
            options.replica_timeout,
        );
        let shadow = ShadowStrategy::new(
            executor.clone(),
            task_tracker.clone(),
            options.shadow_timeout,
            options.comparator,
            options.comparison_store,
        );

        info!(routes = routes.len(), "migration gateway ready");

        Ok(Self {
            dual_write,
            engine,
            executor,
            max_body_bytes: options.max_body_bytes,
            routes,
            shadow,
            task_tracker,
        })
    }

    /// Assemble a gateway from file configuration, with HTTP backends,
    /// in-process metrics and the JSON body comparator.
    pub async fn from_config(config: &GatewayConfig) -> Result<Self, Error> {
        // The client timeout only backstops the per-attempt timeout.
        let client_timeout = config.timeouts.attempt() + Duration::from_secs(1);
        let backends = Backends::new(
            Arc::new(HttpUpstream::new(
                BackendKind::Legacy,
                config.backends.legacy.clone(),
                client_timeout,
            )?),
            Arc::new(HttpUpstream::new(
                BackendKind::New,
                config.backends.new.clone(),
                client_timeout,
            )?),
        );

        let comparison_store: Arc<dyn ComparisonStore> = match &config.comparison_log {
            Some(path) => Arc::new(JsonlComparisonStore::open(path).await?),
            None => Arc::new(MemoryComparisonStore::new()),
        };

        Self::new(GatewayOptions {
            backends,
            circuit_breaker: (&config.circuit_breaker).into(),
            comparator: Arc::new(JsonBodyComparator::default()),
            comparison_store,
            decision_seed: config.decision_seed,
            max_body_bytes: config.max_body_bytes,
            metrics: Arc::new(GatewayMetrics::new()),
            routes: config.routes.clone(),
            retry: (&config.retry).into(),
            attempt_timeout: config.timeouts.attempt(),
            replica_timeout: config.timeouts.replica(),
            shadow_timeout: config.timeouts.shadow(),
        })
    }

    /// Match `path` and `method` against the routes and decide the target.
    pub fn decide(&self, path: &str, method: &Method) -> RoutingDecision {
        self.engine.decide(self.routes.find(path, method), method)
    }

    /// Route one request and produce the client's response. Failures of the
    /// authoritative leg become the gateway's own error responses.
    #[instrument(skip_all, fields(correlation_id = %request.id))]
    pub async fn handle(&self, request: ProxiedRequest) -> ProxiedResponse {
        let decision = self.decide(request.path(), &request.method);
        self.executor.metrics().record_routing_decision(&decision);

        let result = match decision.target {
            RoutingTarget::NewSystem => self.executor.forward(&request, BackendKind::New).await,
            RoutingTarget::LegacySystem => {
                self.executor.forward(&request, BackendKind::Legacy).await
            }
            RoutingTarget::DualWrite => self.dual_write.execute(request).await,
            RoutingTarget::Shadow => self.shadow.execute(request).await,
        };

        result.unwrap_or_else(ProxyError::into_response)
    }

    /// Current circuit states and counters.
    #[must_use]
    pub fn status(&self) -> GatewayStatus {
        GatewayStatus {
            circuits: self.executor.circuits(),
            metrics: self.executor.metrics().snapshot(),
            routes: self.routes.len(),
        }
    }

    /// Wait for every detached replication and shadow task spawned so far.
    pub async fn drain(&self) {
        self.task_tracker.close();
        self.task_tracker.wait().await;
        self.task_tracker.reopen();
    }

    /// Axum router serving the operator endpoints and proxying everything
    /// else.
    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/_gateway/health", get(health))
            .route("/_gateway/status", get(status))
            .fallback(proxy_request)
            .layer(DefaultBodyLimit::max(self.max_body_bytes))
            .with_state(self.clone())
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn status(State(gateway): State<Arc<MigrationGateway>>) -> impl IntoResponse {
    Json(gateway.status())
}

async fn proxy_request(
    State(gateway): State<Arc<MigrationGateway>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> ProxiedResponse {
    gateway
        .handle(ProxiedRequest::new(method, &uri, headers, body))
        .await
}
