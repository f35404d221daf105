use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::{CircuitBreaker, Classify, Error, RetryPolicy};

/// Retry policy and circuit breaker composed around one target.
///
/// Every attempt is admitted by the breaker and recorded as one observation;
/// transient failures are retried per the policy; an open circuit ends the
/// loop immediately without attempting the call.
#[derive(Clone, Debug)]
pub struct ResiliencePipeline {
    attempt_timeout: Option<Duration>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
}

impl ResiliencePipeline {
    /// Create a pipeline over `breaker` using `retry`.
    #[must_use]
    pub const fn new(breaker: Arc<CircuitBreaker>, retry: RetryPolicy) -> Self {
        Self {
            attempt_timeout: None,
            breaker,
            retry,
        }
    }

    /// Bound every attempt by `timeout`. An attempt that runs over counts as
    /// a transient failure.
    #[must_use]
    pub const fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// The breaker guarding this pipeline.
    #[must_use]
    pub const fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Run `operation` through the breaker and retry policy. The closure
    /// receives the zero-based attempt number and is only invoked once the
    /// breaker has admitted the attempt.
    pub async fn execute<T, E, F, Fut>(&self, mut operation: F) -> Result<T, Error<E>>
    where
        E: Classify + Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let name = self.breaker.name();
        let mut attempt = 0;

        loop {
            let Some(permit) = self.breaker.try_acquire() else {
                debug!(circuit = name, attempt, "call rejected, circuit open");
                return Err(Error::CircuitOpen {
                    name: name.to_string(),
                });
            };

            let result = match self.attempt_timeout {
                Some(limit) => match tokio::time::timeout(limit, operation(attempt)).await {
                    Ok(outcome) => outcome.map_err(Error::Operation),
                    Err(_) => Err(Error::Timeout {
                        name: name.to_string(),
                        after: limit,
                    }),
                },
                None => operation(attempt).await.map_err(Error::Operation),
            };

            let error = match result {
                Ok(value) => {
                    permit.success();
                    return Ok(value);
                }
                Err(e) => e,
            };

            if !error.is_transient() {
                permit.ignore();
                return Err(error);
            }
            permit.failure();

            if attempt >= self.retry.max_retries {
                return Err(error);
            }

            let delay = self.retry.delay_for(attempt);
            debug!(circuit = name, attempt, ?delay, error = %error, "retrying after transient failure");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
