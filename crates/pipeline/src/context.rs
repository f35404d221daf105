use std::time::SystemTime;

use uuid::Uuid;

/// Metadata carried alongside every request through the pipeline.
#[derive(Clone, Debug)]
pub struct RequestContext {
    /// Identifier tying together every log line for one request.
    pub correlation_id: Uuid,

    /// When the request entered the pipeline.
    pub received_at: SystemTime,
}

impl RequestContext {
    /// Create a context with a fresh correlation id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            received_at: SystemTime::now(),
        }
    }

    /// Use an existing correlation id, e.g. one received from upstream.
    #[must_use]
    pub const fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
