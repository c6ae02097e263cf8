//! # HTTP Response
//!
//! The (status, headers, body) triple handed back to the transport layer.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use hyper::StatusCode;
use serde::Serialize;
use tracing::{error, warn};

/// Outgoing response
#[derive(Debug, Clone)]
pub struct Response {
    /// `None` until a status is set; read back as 200
    status: Option<u16>,
    headers: HeaderMap,
    body: Bytes,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }
}

impl Response {
    /// Serialize `value` as a JSON response.
    ///
    /// A value that cannot be serialized yields a bare 500.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self::bytes(body, "application/json"),
            Err(e) => {
                error!(error = %e, "Failed to serialize JSON response body");
                Self::empty(500)
            }
        }
    }

    /// Plain text response
    pub fn text(body: impl Into<String>) -> Self {
        Self::bytes(Into::<String>::into(body), "text/plain; charset=utf-8")
    }

    /// HTML response
    pub fn html(body: impl Into<String>) -> Self {
        Self::bytes(Into::<String>::into(body), "text/html; charset=utf-8")
    }

    /// Raw body with an explicit content type
    pub fn bytes(body: impl Into<Bytes>, content_type: &str) -> Self {
        Self::default()
            .with_body(body)
            .with_header("content-type", content_type)
    }

    /// Response without a body
    #[must_use]
    pub fn empty(status: u16) -> Self {
        Self::default().with_status(status)
    }

    /// Status code
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self.status {
            Some(status) => status,
            None => 200,
        }
    }

    /// Whether a status was set explicitly, even if it is 200
    #[must_use]
    pub const fn has_explicit_status(&self) -> bool {
        self.status.is_some()
    }

    /// Set status code
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Mutably set status code
    pub fn set_status(&mut self, status: u16) {
        self.status = Some(status);
    }

    /// Builder-style header setter
    #[must_use]
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.set_header(key, value);
        self
    }

    /// Set or override a header; invalid names or values are dropped
    pub fn set_header(&mut self, key: &str, value: &str) {
        match (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(n), Ok(v)) => {
                self.headers.insert(n, v);
            }
            _ => warn!(header = %key, "Ignoring invalid response header"),
        }
    }

    /// Header value by name (case-insensitive)
    #[must_use]
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(|v| v.to_str().ok())
    }

    /// All headers
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// `Content-Type` header, if any
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Body bytes
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body as UTF-8 text
    #[must_use]
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Builder-style body setter
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Replace the body
    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
    }

    /// Convert to hyper Response
    #[must_use]
    pub fn into_hyper(self) -> hyper::Response<Full<Bytes>> {
        let status = StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = hyper::Response::new(Full::new(self.body));
        *response.status_mut() = status;
        *response.headers_mut() = self.headers;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_response() {
        let resp = Response::json(&json!({"status": "ok"}));
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.content_type(), Some("application/json"));
        assert_eq!(resp.body_str(), Some(r#"{"status":"ok"}"#));
    }

    #[test]
    fn test_with_status() {
        let resp = Response::text("Not Found").with_status(404);
        assert_eq!(resp.status(), 404);
        assert_eq!(resp.content_type(), Some("text/plain; charset=utf-8"));
    }

    #[test]
    fn test_explicit_status_is_tracked() {
        let resp = Response::text("ok");
        assert_eq!(resp.status(), 200);
        assert!(!resp.has_explicit_status());

        let resp = Response::text("ok").with_status(200);
        assert_eq!(resp.status(), 200);
        assert!(resp.has_explicit_status());
    }

    #[test]
    fn test_set_header_overrides() {
        let mut resp = Response::text("x");
        resp.set_header("Content-Type", "text/csv");
        assert_eq!(resp.header("content-type"), Some("text/csv"));
        assert_eq!(resp.headers().len(), 1);
    }

    #[test]
    fn test_into_hyper() {
        let resp = Response::text("hi").with_status(201).with_header("x-trace", "abc");
        let hyper_resp = resp.into_hyper();
        assert_eq!(hyper_resp.status(), StatusCode::CREATED);
        assert_eq!(hyper_resp.headers()["x-trace"], "abc");
    }

    #[test]
    fn test_invalid_status_becomes_500() {
        let hyper_resp = Response::empty(1000).into_hyper();
        assert_eq!(hyper_resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
