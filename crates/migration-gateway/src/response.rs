use axum::body::Body;
use axum::response::{IntoResponse as IntoAxumResponse, Response as AxumResponse};
use bytes::Bytes;
use http::header::{self, HeaderValue};
use http::{HeaderMap, StatusCode};

/// A fully buffered response from a backend, or one produced by the gateway.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProxiedResponse {
    /// The body of the response.
    pub body: Bytes,

    /// The headers of the response.
    pub headers: HeaderMap,

    /// The status code of the response.
    pub status: StatusCode,
}

impl ProxiedResponse {
    /// A plain-text response.
    #[must_use]
    pub fn text(status: StatusCode, message: impl Into<String>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );

        Self {
            body: Bytes::from(message.into()),
            headers,
            status,
        }
    }
}

impl IntoAxumResponse for ProxiedResponse {
    fn into_response(self) -> AxumResponse {
        (self.status, self.headers, Body::from(self.body)).into_response()
    }
}
