//! Shared fixtures: scripted in-memory backends and gateway assembly.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{self, HeaderValue};
use http::{HeaderMap, Method, StatusCode, Uri};
use kgv_migration_gateway::{
    Backends, GatewayMetrics, GatewayOptions, JsonBodyComparator, MemoryComparisonStore,
    MigrationGateway, MigrationRoute, ProxiedRequest, ProxiedResponse, Upstream, UpstreamError,
};
use kgv_resilience::{CircuitBreakerConfig, RetryPolicy};
use parking_lot::Mutex;

/// One scripted answer from a [`MockUpstream`].
#[derive(Clone, Debug)]
pub enum Reply {
    /// Respond with a status and JSON body.
    Json(StatusCode, &'static str),
    /// Fail as if the connection was refused.
    Unreachable,
}

/// In-memory backend answering from a script, then with a fallback reply.
pub struct MockUpstream {
    delay: Option<Duration>,
    fallback: Reply,
    received: Mutex<Vec<ProxiedRequest>>,
    script: Mutex<VecDeque<Reply>>,
}

impl MockUpstream {
    /// Backend that always gives `reply`.
    pub fn always(reply: Reply) -> Arc<Self> {
        Self::scripted([], reply)
    }

    /// Backend that works through `script`, then gives `fallback`.
    pub fn scripted(script: impl IntoIterator<Item = Reply>, fallback: Reply) -> Arc<Self> {
        Arc::new(Self {
            delay: None,
            fallback,
            received: Mutex::new(Vec::new()),
            script: Mutex::new(script.into_iter().collect()),
        })
    }

    /// Backend that takes `delay` before every `reply`.
    pub fn slow(delay: Duration, reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            fallback: reply,
            received: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
        })
    }

    /// Number of requests received.
    pub fn calls(&self) -> usize {
        self.received.lock().len()
    }

    /// Requests received, in order.
    pub fn received(&self) -> Vec<ProxiedRequest> {
        self.received.lock().clone()
    }
}

#[async_trait]
impl Upstream for MockUpstream {
    async fn send(&self, request: &ProxiedRequest) -> Result<ProxiedResponse, UpstreamError> {
        self.received.lock().push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let reply = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match reply {
            Reply::Json(status, body) => {
                let mut headers = HeaderMap::new();
                headers.insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
                Ok(ProxiedResponse {
                    body: Bytes::from_static(body.as_bytes()),
                    headers,
                    status,
                })
            }
            Reply::Unreachable => Err(UpstreamError::Transport("connection refused".to_string())),
        }
    }
}

/// A gateway over two mock backends, with its observable sinks.
pub struct Harness {
    pub comparisons: Arc<MemoryComparisonStore>,
    pub gateway: Arc<MigrationGateway>,
    pub legacy: Arc<MockUpstream>,
    pub metrics: Arc<GatewayMetrics>,
    pub new: Arc<MockUpstream>,
}

/// A route for `pattern` with everything else off.
pub fn route(pattern: &str) -> MigrationRoute {
    MigrationRoute {
        pattern: pattern.to_string(),
        methods: Vec::new(),
        migration_percentage: 0,
        dual_write_enabled: false,
        shadow_mode_enabled: false,
        metadata: std::collections::BTreeMap::new(),
    }
}

/// Fast retries (two retries, millisecond backoff) and a breaker that trips
/// after three failed calls.
pub fn harness(
    routes: Vec<MigrationRoute>,
    legacy: Arc<MockUpstream>,
    new: Arc<MockUpstream>,
) -> Harness {
    let comparisons = Arc::new(MemoryComparisonStore::new());
    let metrics = Arc::new(GatewayMetrics::new());

    let gateway = MigrationGateway::new(GatewayOptions {
        backends: Backends::new(legacy.clone(), new.clone()),
        circuit_breaker: CircuitBreakerConfig {
            minimum_throughput: 3,
            break_duration: Duration::from_secs(60),
            ..CircuitBreakerConfig::default()
        },
        comparator: Arc::new(JsonBodyComparator::default()),
        comparison_store: comparisons.clone(),
        decision_seed: Some(42),
        max_body_bytes: 1024 * 1024,
        metrics: metrics.clone(),
        routes,
        retry: RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            backoff_multiplier: 2.0,
        },
        attempt_timeout: Duration::from_millis(500),
        replica_timeout: Duration::from_secs(2),
        shadow_timeout: Duration::from_secs(2),
    })
    .expect("routes are valid");

    Harness {
        comparisons,
        gateway: Arc::new(gateway),
        legacy,
        metrics,
        new,
    }
}

/// Buffered request as the gateway would snapshot it.
pub fn request(method: Method, uri: &'static str, body: &'static str) -> ProxiedRequest {
    ProxiedRequest::new(
        method,
        &Uri::from_static(uri),
        HeaderMap::new(),
        Bytes::from_static(body.as_bytes()),
    )
}
