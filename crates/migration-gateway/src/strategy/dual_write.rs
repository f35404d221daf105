use std::time::Duration;

use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::error::ProxyError;
use crate::proxy::ProxyExecutor;
use crate::request::ProxiedRequest;
use crate::response::ProxiedResponse;
use crate::upstream::BackendKind;

/// Writes to the new system, then replicates successful writes to legacy in
/// the background.
#[derive(Clone)]
pub struct DualWriteStrategy {
    executor: ProxyExecutor,
    replica_timeout: Duration,
    tracker: TaskTracker,
}

impl DualWriteStrategy {
    /// Creates a new strategy. Replication tasks are spawned on `tracker` and
    /// abandoned after `replica_timeout`.
    #[must_use]
    pub const fn new(executor: ProxyExecutor, tracker: TaskTracker, replica_timeout: Duration) -> Self {
        Self {
            executor,
            replica_timeout,
            tracker,
        }
    }

    /// Forward to the new system and return its outcome. Only a 2xx answer is
    /// replicated; legacy is never called otherwise.
    pub async fn execute(&self, request: ProxiedRequest) -> Result<ProxiedResponse, ProxyError> {
        let response = self.executor.forward(&request, BackendKind::New).await?;

        if response.status.is_success() {
            self.replicate(request);
        } else {
            debug!(
                correlation_id = %request.id,
                status = response.status.as_u16(),
                "new system did not accept write, skipping replication"
            );
        }

        Ok(response)
    }

    fn replicate(&self, request: ProxiedRequest) {
        let executor = self.executor.clone();
        let replica_timeout = self.replica_timeout;

        // Detached from the client request: a disconnect must not cancel it.
        self.tracker.spawn(async move {
            let outcome = tokio::time::timeout(
                replica_timeout,
                executor.forward(&request, BackendKind::Legacy),
            )
            .await;

            let failure = match outcome {
                Ok(Ok(response)) if response.status.is_success() => return,
                Ok(Ok(response)) => format!("legacy responded with {}", response.status),
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("replication timed out after {replica_timeout:?}"),
            };

            warn!(
                correlation_id = %request.id,
                method = %request.method,
                path = %request.path_and_query,
                "dual-write replication to legacy failed: {failure}"
            );
            executor.metrics().record_dual_write_failure();
        });
    }
}
