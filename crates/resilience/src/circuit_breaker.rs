//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: calls pass through and every outcome lands in a rolling window
//! - Open: the target is assumed down and calls fail fast
//! - Half-Open: a bounded number of trial calls probe for recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: calls >= minimum_throughput and failure ratio >= threshold
//!                within sampling_duration
//! Open → Half-Open: first call after break_duration
//! Half-Open → Closed: a trial call succeeds
//! Half-Open → Open: a trial call fails (break timer restarts)
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

/// State of a circuit.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through.
    Closed,

    /// Calls are rejected without being attempted.
    Open,

    /// A limited number of trial calls are admitted.
    HalfOpen,
}

/// Thresholds for a circuit breaker.
#[derive(Clone, Debug, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Failure ratio (0.0–1.0) at or above which the circuit opens.
    pub failure_ratio: f64,

    /// Observations required within the sampling window before tripping.
    pub minimum_throughput: u32,

    /// Length of the rolling window of observations.
    pub sampling_duration: Duration,

    /// Time the circuit stays open before admitting trial calls.
    pub break_duration: Duration,

    /// Concurrent trial calls admitted while half-open.
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_ratio: 0.5,
            minimum_throughput: 5,
            sampling_duration: Duration::from_secs(30),
            break_duration: Duration::from_secs(30),
            half_open_max_calls: 1,
        }
    }
}

/// Point-in-time view of a circuit, for metrics and status pages.
#[derive(Clone, Debug, Serialize)]
pub struct CircuitSnapshot {
    /// Name of the protected target.
    pub name: String,

    /// Current state.
    pub state: CircuitState,

    /// Observations in the rolling window.
    pub calls: usize,

    /// Failed observations in the rolling window.
    pub failures: usize,
}

#[derive(Debug)]
struct Observation {
    at: Instant,
    failed: bool,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    window: VecDeque<Observation>,
    failures: usize,
    opened_at: Option<Instant>,
    trials_in_flight: u32,
}

impl Inner {
    fn observe(&mut self, now: Instant, failed: bool, sampling: Duration) {
        self.window.push_back(Observation { at: now, failed });
        if failed {
            self.failures += 1;
        }
        self.prune(now, sampling);
    }

    fn prune(&mut self, now: Instant, sampling: Duration) {
        while let Some(front) = self.window.front() {
            if now.duration_since(front.at) <= sampling {
                break;
            }
            if front.failed {
                self.failures -= 1;
            }
            self.window.pop_front();
        }
    }

    fn reset(&mut self) {
        self.window.clear();
        self.failures = 0;
    }
}

/// Per-target fault detector. Shared behind an [`Arc`]; all state changes go
/// through the internal lock.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

/// Admission to make one call through a [`CircuitBreaker`].
///
/// Report the outcome with [`success`](Self::success),
/// [`failure`](Self::failure) or [`ignore`](Self::ignore). A permit dropped
/// without a report (for example because the caller was cancelled) releases
/// its trial slot without counting as an observation.
#[derive(Debug)]
pub struct CallPermit {
    breaker: Arc<CircuitBreaker>,
    trial: bool,
    reported: bool,
}

impl CallPermit {
    /// Record a successful call.
    pub fn success(mut self) {
        self.reported = true;
        self.breaker.on_success(self.trial);
    }

    /// Record a failed call.
    pub fn failure(mut self) {
        self.reported = true;
        self.breaker.on_failure(self.trial);
    }

    /// Release the permit without recording an observation. Used for
    /// outcomes that say nothing about the target's health.
    pub fn ignore(mut self) {
        self.reported = true;
        self.breaker.release_trial(self.trial);
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        if !self.reported {
            self.breaker.release_trial(self.trial);
        }
    }
}

impl CircuitBreaker {
    /// Create a closed circuit for the named target.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                window: VecDeque::new(),
                failures: 0,
                opened_at: None,
                trials_in_flight: 0,
            }),
        }
    }

    /// Name of the protected target.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Thresholds in effect.
    #[must_use]
    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state, without side effects.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Ask to make a call. Returns `None` while the circuit is open, or while
    /// half-open with every trial slot taken. Moves Open → HalfOpen once the
    /// break duration has elapsed.
    #[must_use]
    pub fn try_acquire(self: &Arc<Self>) -> Option<CallPermit> {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        let trial = match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map_or(Duration::MAX, |at| now.duration_since(at));
                if elapsed < self.config.break_duration {
                    return None;
                }
                info!(circuit = %self.name, "circuit half-open, admitting trial call");
                inner.state = CircuitState::HalfOpen;
                inner.trials_in_flight = 1;
                true
            }
            CircuitState::HalfOpen => {
                if inner.trials_in_flight >= self.config.half_open_max_calls.max(1) {
                    return None;
                }
                inner.trials_in_flight += 1;
                true
            }
        };

        Some(CallPermit {
            breaker: self.clone(),
            trial,
            reported: false,
        })
    }

    /// Snapshot of the current state and window.
    #[must_use]
    pub fn snapshot(&self) -> CircuitSnapshot {
        let mut inner = self.inner.lock();
        inner.prune(Instant::now(), self.config.sampling_duration);

        CircuitSnapshot {
            name: self.name.clone(),
            state: inner.state,
            calls: inner.window.len(),
            failures: inner.failures,
        }
    }

    fn on_success(&self, trial: bool) {
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::Closed if !trial => {
                inner.observe(Instant::now(), false, self.config.sampling_duration);
            }
            CircuitState::HalfOpen if trial => {
                info!(circuit = %self.name, "trial call succeeded, circuit closed");
                inner.state = CircuitState::Closed;
                inner.reset();
                inner.opened_at = None;
                inner.trials_in_flight = 0;
            }
            // Late results from calls admitted under a previous state.
            _ => {}
        }
    }

    fn on_failure(&self, trial: bool) {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        match inner.state {
            CircuitState::Closed if !trial => {
                inner.observe(now, true, self.config.sampling_duration);

                let calls = inner.window.len();
                let failures = inner.failures;
                #[allow(clippy::cast_precision_loss)]
                let ratio = failures as f64 / calls as f64;

                if calls >= self.config.minimum_throughput as usize
                    && ratio >= self.config.failure_ratio
                {
                    warn!(
                        circuit = %self.name,
                        calls,
                        failures,
                        "failure ratio {:.2} over threshold, circuit opened",
                        ratio
                    );
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(now);
                }
            }
            CircuitState::HalfOpen if trial => {
                warn!(circuit = %self.name, "trial call failed, circuit re-opened");
                inner.state = CircuitState::Open;
                inner.opened_at = Some(now);
                inner.trials_in_flight = 0;
            }
            _ => {}
        }
    }

    fn release_trial(&self, trial: bool) {
        if !trial {
            return;
        }

        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.trials_in_flight = inner.trials_in_flight.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(
            "legacy",
            CircuitBreakerConfig {
                failure_ratio: 0.5,
                minimum_throughput: 5,
                sampling_duration: Duration::from_secs(30),
                break_duration: Duration::from_secs(60),
                half_open_max_calls: 1,
            },
        ))
    }

    fn fail_times(breaker: &Arc<CircuitBreaker>, times: usize) {
        for _ in 0..times {
            breaker.try_acquire().expect("circuit should admit").failure();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stays_closed_below_minimum_throughput() {
        let breaker = breaker();

        fail_times(&breaker, 4);

        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stays_closed_below_failure_ratio() {
        let breaker = breaker();

        for _ in 0..4 {
            breaker.try_acquire().unwrap().success();
        }
        fail_times(&breaker, 3);

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.snapshot().failures, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_lifecycle() {
        let breaker = breaker();

        fail_times(&breaker, 5);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.try_acquire().is_none());

        tokio::time::advance(Duration::from_secs(61)).await;
        let trial = breaker.try_acquire().expect("trial after break");
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.try_acquire().is_none(), "only one trial call");

        trial.failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.try_acquire().is_none(), "break timer restarted");

        tokio::time::advance(Duration::from_secs(61)).await;
        breaker.try_acquire().unwrap().success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.snapshot().calls, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_old_observations_leave_the_window() {
        let breaker = breaker();

        fail_times(&breaker, 4);
        tokio::time::advance(Duration::from_secs(31)).await;
        fail_times(&breaker, 1);

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.snapshot().calls, 1);
        assert_eq!(breaker.snapshot().failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_count_follows_the_window() {
        let breaker = Arc::new(CircuitBreaker::new(
            "new",
            CircuitBreakerConfig {
                minimum_throughput: 1_000_000,
                ..CircuitBreakerConfig::default()
            },
        ));

        for _ in 0..300_000 {
            breaker.try_acquire().unwrap().success();
        }
        fail_times(&breaker, 2_000);

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.calls, 302_000);
        assert_eq!(snapshot.failures, 2_000);

        tokio::time::advance(Duration::from_secs(10)).await;
        fail_times(&breaker, 3);
        tokio::time::advance(Duration::from_secs(25)).await;

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.calls, 3);
        assert_eq!(snapshot.failures, 3);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_trial_permit_frees_the_slot() {
        let breaker = breaker();

        fail_times(&breaker, 5);
        tokio::time::advance(Duration::from_secs(61)).await;

        drop(breaker.try_acquire().unwrap());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.try_acquire().expect("slot released").success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
