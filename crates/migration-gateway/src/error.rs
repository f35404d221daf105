use std::time::Duration;

use http::StatusCode;
use http::header::HeaderValue;
use kgv_resilience::Classify;
use thiserror::Error;

use crate::response::ProxiedResponse;
use crate::upstream::BackendKind;

/// Header naming the gateway failure class on responses the gateway itself
/// produced.
pub const GATEWAY_ERROR_HEADER: &str = "x-gateway-error";

/// Errors from configuring or running the gateway.
#[derive(Debug, Error)]
pub enum Error {
    /// Already started.
    #[error("already started")]
    AlreadyStarted,

    /// A backend base URL is unusable.
    #[error("invalid base url for backend '{backend}': {url}")]
    BackendUrl {
        /// Which backend.
        backend: BackendKind,
        /// The rejected URL.
        url: String,
    },

    /// The outbound HTTP client could not be built.
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),

    /// A migration route is malformed.
    #[error("invalid route #{index} ('{pattern}'): {reason}")]
    InvalidRoute {
        /// Position of the route in the configured list.
        index: usize,
        /// The route's pattern.
        pattern: String,
        /// What is wrong with it.
        reason: String,
    },

    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure of a single outbound call through the proxy executor.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The backend's circuit is open; no network call was made.
    #[error("circuit for backend '{backend}' is open")]
    CircuitOpen {
        /// Which backend.
        backend: BackendKind,
    },

    /// The request could not be sent as built (not a backend fault).
    #[error("invalid request for backend '{backend}': {reason}")]
    InvalidRequest {
        /// Which backend.
        backend: BackendKind,
        /// Why the request was rejected.
        reason: String,
    },

    /// An attempt exceeded its time budget.
    #[error("backend '{backend}' timed out after {after:?}")]
    Timeout {
        /// Which backend.
        backend: BackendKind,
        /// The budget that elapsed.
        after: Duration,
    },

    /// The backend could not be reached.
    #[error("backend '{backend}' unreachable: {reason}")]
    Transport {
        /// Which backend.
        backend: BackendKind,
        /// Underlying cause.
        reason: String,
    },

    /// The backend answered with a status that signals temporary
    /// unavailability (5xx, 408, 429).
    #[error("backend '{backend}' responded with {}", .response.status)]
    UpstreamStatus {
        /// Which backend.
        backend: BackendKind,
        /// The backend's last response.
        response: ProxiedResponse,
    },
}

impl Classify for ProxyError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Transport { .. } | Self::UpstreamStatus { .. }
        )
    }
}

impl ProxyError {
    /// The backend involved.
    #[must_use]
    pub const fn backend(&self) -> BackendKind {
        match self {
            Self::CircuitOpen { backend }
            | Self::InvalidRequest { backend, .. }
            | Self::Timeout { backend, .. }
            | Self::Transport { backend, .. }
            | Self::UpstreamStatus { backend, .. } => *backend,
        }
    }

    /// The backend's own response, when it produced one.
    #[must_use]
    pub const fn upstream_response(&self) -> Option<&ProxiedResponse> {
        match self {
            Self::UpstreamStatus { response, .. } => Some(response),
            _ => None,
        }
    }

    /// Short machine-readable failure class.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::CircuitOpen { .. } => "circuit-open",
            Self::InvalidRequest { .. } => "invalid-request",
            Self::Timeout { .. } => "timeout",
            Self::Transport { .. } => "upstream-unreachable",
            Self::UpstreamStatus { .. } => "upstream-unavailable",
        }
    }

    /// Status the client sees: `504` for timeouts, `502` otherwise.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }

    /// Render as the gateway's own error response.
    #[must_use]
    pub fn into_response(self) -> ProxiedResponse {
        let mut response = ProxiedResponse::text(self.status_code(), self.to_string());
        response
            .headers
            .insert(GATEWAY_ERROR_HEADER, HeaderValue::from_static(self.kind()));
        response
    }
}
