//! Buffered snapshot of an inbound request.

use bytes::Bytes;
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, Method, Uri};
use uuid::Uuid;

/// Header carrying the correlation id between the gateway and both backends.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Headers scoped to a single connection; never forwarded in either
/// direction.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub(crate) fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Immutable request snapshot with a fully buffered body, so it can be sent
/// to more than one backend.
#[derive(Clone, Debug)]
pub struct ProxiedRequest {
    /// Correlation id, taken from the inbound header when it is a valid UUID.
    pub id: Uuid,

    /// The body of the request.
    pub body: Bytes,

    /// Forwardable headers of the request.
    pub headers: HeaderMap,

    /// The method of the request.
    pub method: Method,

    /// Path and query of the request.
    pub path_and_query: String,
}

impl ProxiedRequest {
    /// Snapshot an inbound request. Drops `Host`, `Content-Length` and
    /// hop-by-hop headers, and stamps the correlation id header.
    #[must_use]
    pub fn new(method: Method, uri: &Uri, mut headers: HeaderMap, body: Bytes) -> Self {
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);
        headers.remove(header::CONTENT_LENGTH);

        let id = headers
            .get(CORRELATION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value).ok())
            .unwrap_or_else(Uuid::new_v4);

        if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
            headers.insert(CORRELATION_ID_HEADER, value);
        }

        let path_and_query = uri
            .path_and_query()
            .map_or_else(|| uri.path().to_string(), ToString::to_string);

        Self {
            id,
            body,
            headers,
            method,
            path_and_query,
        }
    }

    /// Path without the query string.
    #[must_use]
    pub fn path(&self) -> &str {
        self.path_and_query
            .split_once('?')
            .map_or(self.path_and_query.as_str(), |(path, _)| path)
    }

    /// Whether the method changes data on the backend.
    #[must_use]
    pub fn is_mutating(&self) -> bool {
        is_mutating(&self.method)
    }
}

/// POST, PUT, PATCH and DELETE change data; everything else is a read.
#[must_use]
pub fn is_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}
