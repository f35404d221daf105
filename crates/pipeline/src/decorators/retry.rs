use async_trait::async_trait;
use kgv_resilience::RetryPolicy;

use crate::{Command, Handler, RequestContext, Result};

/// Retries commands that fail with a transient error, using the shared
/// [`RetryPolicy`] backoff.
#[derive(Clone, Debug)]
pub struct RetryHandler<H> {
    inner: H,
    policy: RetryPolicy,
}

impl<H> RetryHandler<H> {
    /// Wrap `inner` with `policy`.
    pub const fn new(inner: H, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<C, H> Handler<C> for RetryHandler<H>
where
    C: Command,
    H: Handler<C>,
{
    async fn handle(&self, request: C, context: &RequestContext) -> Result<C::Response> {
        let inner = &self.inner;

        self.policy
            .execute(C::request_type(), |_| {
                let request = request.clone();
                async move { inner.handle(request, context).await }
            })
            .await
    }
}
