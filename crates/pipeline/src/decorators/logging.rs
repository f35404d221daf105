use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{error, info};

use crate::{Handler, Request, RequestContext, Result};

/// Logs start, success and failure of every request with elapsed time and
/// correlation id. Errors pass through unchanged.
#[derive(Clone, Debug)]
pub struct LoggingHandler<H> {
    inner: H,
}

impl<H> LoggingHandler<H> {
    /// Wrap `inner`.
    pub const fn new(inner: H) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<R, H> Handler<R> for LoggingHandler<H>
where
    R: Request,
    H: Handler<R>,
{
    async fn handle(&self, request: R, context: &RequestContext) -> Result<R::Response> {
        let started = Instant::now();
        info!(
            request_type = R::request_type(),
            correlation_id = %context.correlation_id,
            "handling request"
        );

        match self.inner.handle(request, context).await {
            Ok(response) => {
                info!(
                    request_type = R::request_type(),
                    correlation_id = %context.correlation_id,
                    elapsed_ms = started.elapsed().as_millis(),
                    "request handled"
                );
                Ok(response)
            }
            Err(e) => {
                error!(
                    request_type = R::request_type(),
                    correlation_id = %context.correlation_id,
                    elapsed_ms = started.elapsed().as_millis(),
                    error = %e,
                    "request failed"
                );
                Err(e)
            }
        }
    }
}
