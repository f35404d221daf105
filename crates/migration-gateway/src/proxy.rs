//! Forwards requests to a backend through its resilience pipeline.

use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use kgv_resilience::{
    CircuitBreakerConfig, CircuitBreakerRegistry, CircuitSnapshot, Error as ResilienceError,
    ResiliencePipeline, RetryPolicy,
};
use tracing::{instrument, warn};

use crate::error::ProxyError;
use crate::metrics::MetricsSink;
use crate::request::ProxiedRequest;
use crate::response::ProxiedResponse;
use crate::upstream::{BackendKind, Backends, UpstreamError};

/// Whether `status` signals temporary unavailability of the backend.
#[must_use]
pub fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

/// Sends requests to either backend with retry, circuit breaking and a
/// per-attempt timeout.
#[derive(Clone)]
pub struct ProxyExecutor {
    attempt_timeout: Duration,
    backends: Backends,
    breakers: CircuitBreakerRegistry,
    metrics: Arc<dyn MetricsSink>,
    retry: RetryPolicy,
}

impl ProxyExecutor {
    /// Creates a new executor. Circuit breakers are created per backend on
    /// first use.
    pub fn new(
        backends: Backends,
        retry: RetryPolicy,
        circuit_breaker: CircuitBreakerConfig,
        attempt_timeout: Duration,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            attempt_timeout,
            backends,
            breakers: CircuitBreakerRegistry::new(circuit_breaker),
            metrics,
            retry,
        }
    }

    /// Forward `request` to `backend`.
    ///
    /// Responses with a non-transient status are returned as they are, error
    /// statuses included. Transient statuses are retried; if retries run out
    /// the last response is carried in [`ProxyError::UpstreamStatus`].
    #[instrument(skip(self, request), fields(correlation_id = %request.id, method = %request.method, path = %request.path_and_query))]
    pub async fn forward(
        &self,
        request: &ProxiedRequest,
        backend: BackendKind,
    ) -> Result<ProxiedResponse, ProxyError> {
        let upstream = self.backends.get(backend);
        let pipeline = ResiliencePipeline::new(self.breakers.get(backend.as_str()), self.retry.clone())
            .with_attempt_timeout(self.attempt_timeout);

        let result = pipeline
            .execute(|attempt| async move {
                if attempt > 0 {
                    warn!(%backend, attempt, "retrying request");
                }

                let response = upstream.send(request).await.map_err(|e| match e {
                    UpstreamError::InvalidRequest(reason) => {
                        ProxyError::InvalidRequest { backend, reason }
                    }
                    UpstreamError::Transport(reason) => ProxyError::Transport { backend, reason },
                })?;

                if is_transient_status(response.status) {
                    return Err(ProxyError::UpstreamStatus { backend, response });
                }
                Ok(response)
            })
            .await
            .map_err(|e| match e {
                ResilienceError::CircuitOpen { .. } => ProxyError::CircuitOpen { backend },
                ResilienceError::Timeout { after, .. } => ProxyError::Timeout { backend, after },
                ResilienceError::Operation(error) => error,
            });

        if backend == BackendKind::Legacy {
            let status = match &result {
                Ok(response) => Some(response.status),
                Err(error) => error.upstream_response().map(|response| response.status),
            };
            self.metrics.record_legacy_call(status);
        }

        if let Err(error) = &result {
            warn!(%backend, kind = error.kind(), "forwarding failed: {error}");
        }

        result
    }

    /// Circuit state of every backend called so far.
    #[must_use]
    pub fn circuits(&self) -> Vec<CircuitSnapshot> {
        self.breakers.snapshots()
    }

    /// The metrics sink events are reported to.
    #[must_use]
    pub fn metrics(&self) -> &Arc<dyn MetricsSink> {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use bytes::Bytes;
    use http::{HeaderMap, Method, Uri};
    use kgv_resilience::CircuitState;
    use parking_lot::Mutex;

    use crate::error::GATEWAY_ERROR_HEADER;
    use crate::metrics::GatewayMetrics;
    use crate::upstream::Upstream;

    struct Scripted {
        calls: AtomicU32,
        script: Mutex<VecDeque<Result<StatusCode, ()>>>,
    }

    impl Scripted {
        fn new(script: impl IntoIterator<Item = Result<StatusCode, ()>>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                script: Mutex::new(script.into_iter().collect()),
            })
        }
    }

    #[async_trait]
    impl Upstream for Scripted {
        async fn send(&self, _request: &ProxiedRequest) -> Result<ProxiedResponse, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.script.lock().pop_front().unwrap_or(Ok(StatusCode::OK)) {
                Ok(status) => Ok(ProxiedResponse::text(status, status.as_str())),
                Err(()) => Err(UpstreamError::Transport("connection refused".to_string())),
            }
        }
    }

    fn executor(legacy: Arc<Scripted>, new: Arc<Scripted>) -> (ProxyExecutor, Arc<GatewayMetrics>) {
        let metrics = Arc::new(GatewayMetrics::new());
        let executor = ProxyExecutor::new(
            Backends::new(legacy as Arc<dyn Upstream>, new as Arc<dyn Upstream>),
            RetryPolicy {
                max_retries: 2,
                base_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(40),
                backoff_multiplier: 2.0,
            },
            CircuitBreakerConfig {
                minimum_throughput: 3,
                ..CircuitBreakerConfig::default()
            },
            Duration::from_secs(1),
            metrics.clone(),
        );
        (executor, metrics)
    }

    fn request() -> ProxiedRequest {
        ProxiedRequest::new(
            Method::GET,
            &Uri::from_static("/reports/5?page=2"),
            HeaderMap::new(),
            Bytes::new(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_statuses_are_retried() {
        let legacy = Scripted::new([Ok(StatusCode::SERVICE_UNAVAILABLE), Ok(StatusCode::TOO_MANY_REQUESTS)]);
        let (executor, metrics) = executor(legacy.clone(), Scripted::new([]));

        let response = executor.forward(&request(), BackendKind::Legacy).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(legacy.calls.load(Ordering::SeqCst), 3);
        assert_eq!(metrics.snapshot().unwrap().legacy_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_errors_are_returned_unchanged() {
        let new = Scripted::new([Ok(StatusCode::NOT_FOUND)]);
        let (executor, metrics) = executor(Scripted::new([]), new.clone());

        let response = executor.forward(&request(), BackendKind::New).await.unwrap();

        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(new.calls.load(Ordering::SeqCst), 1);
        assert_eq!(metrics.snapshot().unwrap().legacy_calls, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_carry_last_response() {
        let new = Scripted::new([Ok(StatusCode::INTERNAL_SERVER_ERROR); 3]);
        let (executor, _) = executor(Scripted::new([]), new.clone());

        let error = executor.forward(&request(), BackendKind::New).await.unwrap_err();

        assert_eq!(new.calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            error.upstream_response().map(|r| r.status),
            Some(StatusCode::INTERNAL_SERVER_ERROR)
        );
        assert_eq!(error.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_fails_fast() {
        let legacy = Scripted::new([Err(()); 10]);
        let (executor, metrics) = executor(legacy.clone(), Scripted::new([]));

        let first = executor.forward(&request(), BackendKind::Legacy).await.unwrap_err();
        assert!(matches!(first, ProxyError::Transport { .. }));
        assert_eq!(legacy.calls.load(Ordering::SeqCst), 3);

        let second = executor.forward(&request(), BackendKind::Legacy).await.unwrap_err();
        assert!(matches!(second, ProxyError::CircuitOpen { backend: BackendKind::Legacy }));
        assert_eq!(legacy.calls.load(Ordering::SeqCst), 3, "no network call while open");

        let response = second.into_response();
        assert_eq!(response.status, StatusCode::BAD_GATEWAY);
        assert_eq!(response.headers[GATEWAY_ERROR_HEADER], "circuit-open");

        let circuits = executor.circuits();
        assert_eq!(circuits[0].name, "legacy");
        assert_eq!(circuits[0].state, CircuitState::Open);
        assert_eq!(metrics.snapshot().unwrap().legacy_call_errors, 2);
    }
}
