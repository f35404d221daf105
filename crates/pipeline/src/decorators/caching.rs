use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use tracing::debug;

use crate::{Handler, Query, RequestContext, Result};

/// Expiration and size limits for a query cache.
#[derive(Clone, Debug)]
pub struct CacheOptions {
    /// Maximum number of cached responses.
    pub max_capacity: u64,

    /// Absolute expiration, counted from insertion.
    pub time_to_live: Duration,

    /// Sliding expiration, counted from the last read.
    pub time_to_idle: Duration,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            time_to_live: Duration::from_secs(300),
            time_to_idle: Duration::from_secs(60),
        }
    }
}

/// Serves repeated queries from a cache keyed by [`Query::cache_key`]. A hit
/// never reaches the inner handler; failures are not cached.
pub struct CachingHandler<Q, H>
where
    Q: Query,
    Q::Response: Clone,
{
    cache: Cache<String, Q::Response>,
    inner: H,
}

impl<Q, H> CachingHandler<Q, H>
where
    Q: Query,
    Q::Response: Clone,
{
    /// Wrap `inner` with a fresh cache.
    pub fn new(inner: H, options: &CacheOptions) -> Self {
        let cache = Cache::builder()
            .max_capacity(options.max_capacity)
            .time_to_live(options.time_to_live)
            .time_to_idle(options.time_to_idle)
            .build();

        Self { cache, inner }
    }

    /// Drop every cached response.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}

#[async_trait]
impl<Q, H> Handler<Q> for CachingHandler<Q, H>
where
    Q: Query,
    Q::Response: Clone,
    H: Handler<Q>,
{
    async fn handle(&self, request: Q, context: &RequestContext) -> Result<Q::Response> {
        let Some(key) = request.cache_key() else {
            return self.inner.handle(request, context).await;
        };

        if let Some(cached) = self.cache.get(&key).await {
            debug!(
                request_type = Q::request_type(),
                correlation_id = %context.correlation_id,
                "cache hit"
            );
            return Ok(cached);
        }

        let response = self.inner.handle(request, context).await?;
        self.cache.insert(key, response.clone()).await;

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicU32, Ordering};

    use serde::Serialize;

    use crate::Request;

    #[derive(Clone, Serialize)]
    struct PlotsByDistrict {
        district_id: u32,
    }

    impl Request for PlotsByDistrict {
        type Response = Vec<String>;

        fn request_type() -> &'static str {
            "PlotsByDistrict"
        }
    }

    impl Query for PlotsByDistrict {}

    #[derive(Default)]
    struct CountingHandler {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Handler<PlotsByDistrict> for CountingHandler {
        async fn handle(
            &self,
            request: PlotsByDistrict,
            _context: &RequestContext,
        ) -> Result<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![format!("plot-{}", request.district_id)])
        }
    }

    #[test]
    fn test_cache_key_includes_type_and_fields() {
        let key = PlotsByDistrict { district_id: 7 }.cache_key().unwrap();

        assert_eq!(key, r#"PlotsByDistrict:{"district_id":7}"#);
    }

    #[tokio::test]
    async fn test_hit_skips_inner_handler() {
        let inner = std::sync::Arc::new(CountingHandler::default());
        let handler = CachingHandler::new(inner.clone(), &CacheOptions::default());
        let context = RequestContext::new();

        let first = handler.handle(PlotsByDistrict { district_id: 1 }, &context).await.unwrap();
        let second = handler.handle(PlotsByDistrict { district_id: 1 }, &context).await.unwrap();
        handler.handle(PlotsByDistrict { district_id: 2 }, &context).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }
}
