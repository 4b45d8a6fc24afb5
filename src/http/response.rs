use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;
use serde::Serialize;

/// Decoded request handed to route handlers: head plus the full body.
pub type HttpRequest = http::Request<Bytes>;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const APPLICATION_JSON: &str = "application/json";

/// A complete response, written verbatim by the server.
#[derive(Clone, Debug, PartialEq)]
pub struct HttpResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl HttpResponse {
    /// Empty response with `status`.
    pub fn new(status: StatusCode) -> Self {
        Self { status, headers: HeaderMap::new(), body: Bytes::new() }
    }

    /// Plain-text response.
    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self::new(status).with_body(HeaderValue::from_static(TEXT_PLAIN), body.into())
    }

    /// Compact JSON response.
    pub fn json<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> Result<Self, HandlerError> {
        let bytes = serde_json::to_vec(body).map_err(HandlerError::unexpected)?;
        Ok(Self::new(status).with_body(HeaderValue::from_static(APPLICATION_JSON), bytes))
    }

    /// Pretty-printed JSON response.
    pub fn json_pretty<T: Serialize + ?Sized>(
        status: StatusCode,
        body: &T,
    ) -> Result<Self, HandlerError> {
        let bytes = serde_json::to_vec_pretty(body).map_err(HandlerError::unexpected)?;
        Ok(Self::new(status).with_body(HeaderValue::from_static(APPLICATION_JSON), bytes))
    }

    /// Replace the body and its content type.
    pub fn with_body(mut self, content_type: HeaderValue, body: impl Into<Bytes>) -> Self {
        self.headers.insert(CONTENT_TYPE, content_type);
        self.body = body.into();
        self
    }

    /// Set a header, replacing any previous value.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Response status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Headers set so far. `Content-Length` and `Connection` are added on the wire.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Full response body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Convert for the wire: computed `Content-Length`, `Connection: close`.
    pub(crate) fn into_wire(self) -> http::Response<Full<Bytes>> {
        let mut response = http::Response::new(Full::new(self.body.clone()));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response.headers_mut().insert(CONTENT_LENGTH, HeaderValue::from(self.body.len()));
        response.headers_mut().insert(CONNECTION, HeaderValue::from_static("close"));
        response
    }
}

/// A handler-signaled outcome with an explicit status.
///
/// Only the short `message` reaches the client.
#[derive(thiserror::Error, Clone, Debug, PartialEq)]
#[error("{status}: {message}")]
pub struct RequestFailure {
    /// Status sent to the client.
    pub status: StatusCode,
    /// Short text body, sent with a trailing newline.
    pub message: String,
    /// Extra response headers, such as `WWW-Authenticate` or `Allow`.
    pub headers: HeaderMap,
}

impl RequestFailure {
    /// Failure with `status` and a short `message`.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into(), headers: HeaderMap::new() }
    }

    /// `400` with a caller-chosen message.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// `401 Unauthorized`. Callers add the challenge header.
    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized")
    }

    /// `404 Not Found`.
    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Not Found")
    }

    /// `405 Method Not Allowed`. Callers add the `Allow` header.
    pub fn method_not_allowed() -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
    }

    /// Add a header to the failure response (e.g. an auth challenge).
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub(crate) fn into_response(self) -> HttpResponse {
        let mut response = HttpResponse::text(self.status, format!("{}\n", self.message));
        for (name, value) in &self.headers {
            response.headers.insert(name.clone(), value.clone());
        }
        response
    }
}

/// How a route handler can fail.
#[derive(thiserror::Error, Debug)]
pub enum HandlerError {
    /// Expected failure: answer with its status.
    #[error(transparent)]
    Request(#[from] RequestFailure),
    /// Anything else: answered with 500, detail logged server-side only.
    #[error("unexpected: {0}")]
    Unexpected(Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    /// Wrap any error as an unexpected failure.
    pub fn unexpected<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Unexpected(err.into())
    }

    /// Status the client will see.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Request(f) => f.status,
            Self::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_response_has_length_and_close() {
        let response = HttpResponse::text(StatusCode::OK, "ok\n").into_wire();
        assert_eq!(response.headers()[CONTENT_LENGTH], "3");
        assert_eq!(response.headers()[CONNECTION], "close");
        assert_eq!(response.headers()[CONTENT_TYPE], TEXT_PLAIN);
    }

    #[test]
    fn failure_renders_short_text_with_headers() {
        let failure = RequestFailure::unauthorized().with_header(
            http::header::WWW_AUTHENTICATE,
            HeaderValue::from_static("Basic realm=\"test\""),
        );
        let response = failure.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.body().as_ref(), b"Unauthorized\n");
        assert!(response.headers().contains_key(http::header::WWW_AUTHENTICATE));
    }

    #[test]
    fn unexpected_maps_to_500() {
        let err = HandlerError::unexpected("boom");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let err: HandlerError = RequestFailure::not_found().into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
