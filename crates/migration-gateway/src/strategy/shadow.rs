use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::oneshot;
use tokio_util::task::TaskTracker;
use tracing::{debug, error};

use crate::comparison::{BodyComparator, ResponseComparison, UNAVAILABLE_STATUS};
use crate::error::ProxyError;
use crate::proxy::ProxyExecutor;
use crate::request::ProxiedRequest;
use crate::response::ProxiedResponse;
use crate::store::ComparisonStore;
use crate::upstream::BackendKind;

/// Status and body of one leg, as far as it got.
type Observed = (u16, Option<Bytes>);

fn observe(outcome: &Result<ProxiedResponse, ProxyError>) -> Observed {
    match outcome {
        Ok(response) => (response.status.as_u16(), Some(response.body.clone())),
        Err(e) => e.upstream_response().map_or((UNAVAILABLE_STATUS, None), |response| {
            (response.status.as_u16(), Some(response.body.clone()))
        }),
    }
}

/// Serves from legacy while mirroring each request to the new system and
/// recording how the two answers compare.
#[derive(Clone)]
pub struct ShadowStrategy {
    comparator: Arc<dyn BodyComparator>,
    executor: ProxyExecutor,
    shadow_timeout: Duration,
    store: Arc<dyn ComparisonStore>,
    tracker: TaskTracker,
}

impl ShadowStrategy {
    /// Creates a new strategy. The mirrored call is abandoned after
    /// `shadow_timeout` and then counts as unavailable.
    #[must_use]
    pub fn new(
        executor: ProxyExecutor,
        tracker: TaskTracker,
        shadow_timeout: Duration,
        comparator: Arc<dyn BodyComparator>,
        store: Arc<dyn ComparisonStore>,
    ) -> Self {
        Self {
            comparator,
            executor,
            shadow_timeout,
            store,
            tracker,
        }
    }

    /// Forward to legacy and return its outcome unchanged. The new system's
    /// answer never reaches the client.
    pub async fn execute(&self, request: ProxiedRequest) -> Result<ProxiedResponse, ProxyError> {
        let request = Arc::new(request);

        let shadow_leg = {
            let executor = self.executor.clone();
            let request = request.clone();
            let shadow_timeout = self.shadow_timeout;

            self.tracker.spawn(async move {
                match tokio::time::timeout(
                    shadow_timeout,
                    executor.forward(&request, BackendKind::New),
                )
                .await
                {
                    Ok(outcome) => observe(&outcome),
                    Err(_) => {
                        debug!(correlation_id = %request.id, "shadow call timed out after {shadow_timeout:?}");
                        (UNAVAILABLE_STATUS, None)
                    }
                }
            })
        };

        let (legacy_tx, legacy_rx) = oneshot::channel::<Observed>();
        let comparator = self.comparator.clone();
        let metrics = self.executor.metrics().clone();
        let store = self.store.clone();
        let compared = request.clone();

        // Runs even if the client goes away before legacy answers.
        self.tracker.spawn(async move {
            let legacy = legacy_rx.await.unwrap_or_else(|_| {
                debug!(correlation_id = %compared.id, "legacy call abandoned before completing");
                (UNAVAILABLE_STATUS, None)
            });
            let new = shadow_leg.await.unwrap_or((UNAVAILABLE_STATUS, None));

            let differences = match (&legacy.1, &new.1) {
                (Some(legacy_body), Some(new_body)) => comparator.compare(legacy_body, new_body),
                _ => None,
            };

            let comparison = ResponseComparison::new(
                compared.path(),
                compared.method.as_str(),
                legacy.0,
                new.0,
                differences,
            );

            if let Err(e) = store.append(&comparison).await {
                error!(correlation_id = %compared.id, "failed to store shadow comparison: {e}");
            }
            metrics.record_shadow_comparison(&comparison);
        });

        let outcome = self.executor.forward(&request, BackendKind::Legacy).await;
        let _ = legacy_tx.send(observe(&outcome));

        outcome
    }
}
