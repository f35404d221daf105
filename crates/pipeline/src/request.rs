//! Request marker traits.

use serde::Serialize;

/// A request that expects a single response.
pub trait Request: Clone + Send + Sync + 'static {
    /// The response type for this request.
    type Response: Send + Sync + 'static;

    /// Unique type name for this request.
    fn request_type() -> &'static str;
}

/// A request that changes state. Commands may be retried and run inside a
/// unit of work.
pub trait Command: Request {}

/// A request that only reads state. Query responses may be cached.
pub trait Query: Request + Serialize {
    /// Deterministic cache key built from the query type and its identifying
    /// fields. `None` disables caching for this instance.
    fn cache_key(&self) -> Option<String> {
        serde_json::to_string(self)
            .ok()
            .map(|fields| format!("{}:{fields}", Self::request_type()))
    }
}
