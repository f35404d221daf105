use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::{Command, Error, Handler, RequestContext, Result};

/// A scoped unit of work. At most one of `commit` or `rollback` is called.
/// When the command is cancelled mid-handle, [`TransactionHandler`] spawns the
/// rollback on the current runtime; outside a runtime the unit is only dropped,
/// so implementors holding external state should also discard it on `Drop`.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Persist everything done within the unit.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discard everything done within the unit.
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Opens units of work.
#[async_trait]
pub trait UnitOfWorkFactory: Send + Sync + 'static {
    /// Begin a new unit of work.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;
}

/// Runs each command inside a unit of work: commit on success, rollback on
/// any error.
#[derive(Clone)]
pub struct TransactionHandler<H> {
    inner: H,
    units: Arc<dyn UnitOfWorkFactory>,
}

impl<H> TransactionHandler<H> {
    /// Wrap `inner`, opening units of work from `units`.
    pub fn new(inner: H, units: Arc<dyn UnitOfWorkFactory>) -> Self {
        Self { inner, units }
    }
}

/// Rolls back a unit of work whose command was cancelled before settling.
struct RollbackGuard {
    request_type: &'static str,
    unit: Option<Box<dyn UnitOfWork>>,
}

impl Drop for RollbackGuard {
    fn drop(&mut self) {
        let Some(unit) = self.unit.take() else {
            return;
        };
        let request_type = self.request_type;

        warn!(request_type, "command cancelled, rolling back unit of work");
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Err(e) = unit.rollback().await {
                    error!(request_type, error = %e, "rollback failed");
                }
            });
        }
    }
}

#[async_trait]
impl<C, H> Handler<C> for TransactionHandler<H>
where
    C: Command,
    H: Handler<C>,
{
    async fn handle(&self, request: C, context: &RequestContext) -> Result<C::Response> {
        let unit = self.units.begin().await.map_err(|e| Error::Transaction {
            stage: "begin",
            reason: e.to_string(),
        })?;
        let mut guard = RollbackGuard {
            request_type: C::request_type(),
            unit: Some(unit),
        };

        let outcome = self.inner.handle(request, context).await;

        match (outcome, guard.unit.take()) {
            (Ok(response), Some(unit)) => {
                unit.commit().await.map_err(|e| Error::Transaction {
                    stage: "commit",
                    reason: e.to_string(),
                })?;
                debug!(
                    request_type = C::request_type(),
                    correlation_id = %context.correlation_id,
                    "unit of work committed"
                );
                Ok(response)
            }
            (Err(e), Some(unit)) => {
                if let Err(rollback_error) = unit.rollback().await {
                    error!(
                        request_type = C::request_type(),
                        correlation_id = %context.correlation_id,
                        error = %rollback_error,
                        "rollback failed"
                    );
                }
                Err(e)
            }
            (outcome, None) => outcome,
        }
    }
}
