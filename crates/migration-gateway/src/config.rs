//! Gateway configuration, loaded once at startup from a JSON file.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use kgv_resilience::{CircuitBreakerConfig, RetryPolicy};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::route::MigrationRoute;

/// Base URLs of the two backends.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct BackendsConfig {
    /// Base URL of the legacy system.
    pub legacy: String,

    /// Base URL of the new system.
    pub new: String,
}

/// Retry configuration for backend calls
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Initial backoff delay in milliseconds
    pub base_delay_ms: u64,
    /// Maximum backoff delay in milliseconds
    pub max_delay_ms: u64,
    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            backoff_multiplier: config.backoff_multiplier,
        }
    }
}

/// Circuit breaker configuration, applied to each backend
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Failure share (0.0–1.0) of sampled calls that opens the circuit
    pub failure_ratio: f64,
    /// Calls needed in the window before the ratio is considered
    pub minimum_throughput: u32,
    /// Length of the sampling window in milliseconds
    pub sampling_duration_ms: u64,
    /// How long the circuit stays open in milliseconds
    pub break_duration_ms: u64,
    /// Trial calls admitted while half-open
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_ratio: 0.5,
            minimum_throughput: 5,
            sampling_duration_ms: 30_000,
            break_duration_ms: 30_000,
            half_open_max_calls: 1,
        }
    }
}

impl From<&CircuitBreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &CircuitBreakerSettings) -> Self {
        Self {
            failure_ratio: settings.failure_ratio,
            minimum_throughput: settings.minimum_throughput,
            sampling_duration: Duration::from_millis(settings.sampling_duration_ms),
            break_duration: Duration::from_millis(settings.break_duration_ms),
            half_open_max_calls: settings.half_open_max_calls,
        }
    }
}

/// Time budgets for backend calls, in milliseconds
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Budget for a single attempt
    pub attempt_ms: u64,
    /// Budget for replicating a dual-write to legacy, retries included
    pub replica_ms: u64,
    /// Budget for the mirrored call in shadow mode, retries included
    pub shadow_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            attempt_ms: 10_000,
            replica_ms: 30_000,
            shadow_ms: 30_000,
        }
    }
}

impl TimeoutConfig {
    /// Budget for a single attempt.
    #[must_use]
    pub const fn attempt(&self) -> Duration {
        Duration::from_millis(self.attempt_ms)
    }

    /// Budget for dual-write replication.
    #[must_use]
    pub const fn replica(&self) -> Duration {
        Duration::from_millis(self.replica_ms)
    }

    /// Budget for the mirrored shadow call.
    #[must_use]
    pub const fn shadow(&self) -> Duration {
        Duration::from_millis(self.shadow_ms)
    }
}

const fn default_listen_addr() -> SocketAddr {
    SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED), 8080)
}

const fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

/// Complete gateway configuration.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct GatewayConfig {
    /// Address the gateway listens on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Backend base URLs.
    pub backends: BackendsConfig,

    /// Ordered migration routes; the first applicable one wins.
    #[serde(default)]
    pub routes: Vec<MigrationRoute>,

    /// Retry settings.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Circuit breaker settings.
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,

    /// Call time budgets.
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// JSON-lines file shadow comparisons are appended to; kept in memory
    /// when unset.
    #[serde(default)]
    pub comparison_log: Option<PathBuf>,

    /// Largest request body accepted.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Fixed seed for percentage routing, for reproducible runs.
    #[serde(default)]
    pub decision_seed: Option<u64>,
}

impl GatewayConfig {
    /// Load configuration from the JSON file at `path`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Io("error reading config file", e))?;

        Self::from_json(&contents)
    }

    /// Parse configuration from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = GatewayConfig::from_json(
            r#"{"backends": {"legacy": "http://legacy:8080", "new": "http://new:8080"}}"#,
        )
        .unwrap();

        assert_eq!(config.listen_addr.port(), 8080);
        assert!(config.routes.is_empty());
        assert_eq!(RetryPolicy::from(&config.retry), RetryPolicy::default());
        assert_eq!(config.timeouts.attempt(), Duration::from_secs(10));
        assert!(config.comparison_log.is_none());
        assert_eq!(config.max_body_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn test_full_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.json");
        std::fs::write(
            &path,
            r#"{
                "listen_addr": "127.0.0.1:9000",
                "backends": {"legacy": "http://legacy", "new": "http://new"},
                "routes": [
                    {"pattern": "/orders/.*", "methods": ["POST"], "dual_write_enabled": true},
                    {"pattern": "/reports/.*", "migration_percentage": 25}
                ],
                "retry": {"max_retries": 1},
                "circuit_breaker": {"break_duration_ms": 1000},
                "timeouts": {"shadow_ms": 500},
                "comparison_log": "/var/log/kgv/shadow.jsonl",
                "decision_seed": 7
            }"#,
        )
        .unwrap();

        let config = GatewayConfig::from_file(&path).unwrap();

        assert_eq!(config.routes.len(), 2);
        assert_eq!(config.routes[1].migration_percentage, 25);
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.retry.base_delay_ms, 200);
        assert_eq!(
            CircuitBreakerConfig::from(&config.circuit_breaker).break_duration,
            Duration::from_secs(1)
        );
        assert_eq!(config.timeouts.shadow(), Duration::from_millis(500));
        assert_eq!(config.timeouts.replica_ms, 30_000);
        assert_eq!(config.decision_seed, Some(7));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = GatewayConfig::from_file("/nonexistent/gateway.json");

        assert!(matches!(result, Err(Error::Io(..))));
    }
}
