use std::sync::Arc;

use async_trait::async_trait;

use crate::{Request, RequestContext, Result};

/// Handler for one request type.
#[async_trait]
pub trait Handler<R: Request>: Send + Sync + 'static {
    /// Handle a request and return its response.
    async fn handle(&self, request: R, context: &RequestContext) -> Result<R::Response>;
}

#[async_trait]
impl<R, H> Handler<R> for Arc<H>
where
    R: Request,
    H: Handler<R> + ?Sized,
{
    async fn handle(&self, request: R, context: &RequestContext) -> Result<R::Response> {
        (**self).handle(request, context).await
    }
}
