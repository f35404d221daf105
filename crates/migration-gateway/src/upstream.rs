//! Outbound side: the two backends and the HTTP client that reaches them.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::header;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::error::Error;
use crate::request::{ProxiedRequest, strip_hop_by_hop};
use crate::response::ProxiedResponse;

/// Logical backend name.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// The system being replaced.
    Legacy,

    /// The replacement system.
    New,
}

impl BackendKind {
    /// Name used for circuit breakers, logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::New => "new",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure to obtain any response from a backend.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The request could not be built or sent as specified.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Connection, protocol or read failure.
    #[error("transport error: {0}")]
    Transport(String),
}

/// A backend the gateway can send requests to.
#[async_trait]
pub trait Upstream: Send + Sync + 'static {
    /// Send `request` and buffer the whole response.
    async fn send(&self, request: &ProxiedRequest) -> Result<ProxiedResponse, UpstreamError>;
}

/// Backend reached over HTTP at a fixed base address.
#[derive(Clone, Debug)]
pub struct HttpUpstream {
    base_url: String,
    client: Client,
}

impl HttpUpstream {
    /// Create an upstream for `base_url`. `timeout` bounds each request end
    /// to end, independent of the gateway's own per-attempt timeout.
    pub fn new(
        backend: BackendKind,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let base_url = base_url.into();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::BackendUrl {
                backend,
                url: base_url,
            });
        }

        // Bodies are relayed byte for byte, so no transparent decompression.
        let client = Client::builder()
            .timeout(timeout)
            .no_gzip()
            .no_brotli()
            .build()
            .map_err(Error::Client)?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn send(&self, request: &ProxiedRequest) -> Result<ProxiedResponse, UpstreamError> {
        debug!(
            "proxying request: {} {}{}",
            request.method, self.base_url, request.path_and_query
        );

        let mut http_request = self
            .client
            .request(
                request.method.clone(),
                format!("{}{}", self.base_url, request.path_and_query),
            )
            .headers(request.headers.clone());

        if !request.body.is_empty() {
            http_request = http_request.body(request.body.clone());
        }

        let proxy_response = http_request.send().await.map_err(|e| {
            if e.is_builder() {
                UpstreamError::InvalidRequest(e.to_string())
            } else {
                UpstreamError::Transport(e.to_string())
            }
        })?;

        let status = proxy_response.status();
        let mut headers = proxy_response.headers().clone();
        strip_hop_by_hop(&mut headers);
        headers.remove(header::CONTENT_LENGTH);

        let body = proxy_response
            .bytes()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        Ok(ProxiedResponse {
            body,
            headers,
            status,
        })
    }
}

/// The pair of backends taking part in the migration.
#[derive(Clone)]
pub struct Backends {
    legacy: Arc<dyn Upstream>,
    new: Arc<dyn Upstream>,
}

impl Backends {
    /// Pair a legacy and a new backend.
    pub fn new(legacy: Arc<dyn Upstream>, new: Arc<dyn Upstream>) -> Self {
        Self { legacy, new }
    }

    /// The backend with the given name.
    #[must_use]
    pub fn get(&self, kind: BackendKind) -> &Arc<dyn Upstream> {
        match kind {
            BackendKind::Legacy => &self.legacy,
            BackendKind::New => &self.new,
        }
    }
}
