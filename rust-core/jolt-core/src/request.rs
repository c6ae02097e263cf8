//! # HTTP Request
//!
//! Transport-independent request passed through hooks and handlers.
//!
//! The server adapter fills method, path, headers, query string and body;
//! the dispatcher adds typed path captures, the decoded payload and the
//! shared application state.

use crate::error::{Error, HandlerError, Result};
use crate::state::{AppState, Extensions};
use crate::types::ParamValue;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Incoming request
#[derive(Debug)]
pub struct Request {
    method: hyper::Method,
    path: String,
    query_string: Option<String>,
    query_params: HashMap<String, String>,
    headers: HeaderMap,
    body: Bytes,
    params: HashMap<String, ParamValue>,
    payload: Option<Value>,
    claims: Option<Value>,
    state: Arc<AppState>,
    extensions: Extensions,
}

impl Request {
    /// Create a request from a method and a path with optional query string
    pub fn new(method: impl Into<hyper::Method>, path: impl Into<String>) -> Self {
        let path = path.into();
        let (path, query_string) = match path.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (path, None),
        };
        let query_params = parse_query_string(query_string.as_deref());

        Self {
            method: method.into(),
            path,
            query_string,
            query_params,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            params: HashMap::new(),
            payload: None,
            claims: None,
            state: Arc::default(),
            extensions: Extensions::new(),
        }
    }

    /// Builder-style header setter
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.set_header(name, value);
        self
    }

    /// Builder-style body setter
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// JSON body with a matching content type
    #[must_use]
    pub fn with_json(self, value: &Value) -> Self {
        self.with_header("content-type", "application/json")
            .with_body(value.to_string())
    }

    /// Create from a hyper request, rejecting bodies above `max_body_size`
    ///
    /// # Errors
    ///
    /// `Error::PayloadTooLarge` when the declared or streamed body exceeds
    /// the limit, `Error::Http` when the body stream fails.
    pub async fn from_hyper_with_limit(
        req: hyper::Request<hyper::body::Incoming>,
        max_body_size: usize,
    ) -> Result<Self> {
        let declared = req
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if let Some(actual) = declared.filter(|len| *len > max_body_size) {
            return Err(Error::PayloadTooLarge {
                limit: max_body_size,
                actual: Some(actual),
            });
        }

        let (parts, body) = req.into_parts();
        let body = read_body_limited(body, max_body_size).await?;

        let query_string = parts.uri.query().map(String::from);
        Ok(Self {
            method: parts.method,
            path: parts.uri.path().to_string(),
            query_params: parse_query_string(query_string.as_deref()),
            query_string,
            headers: parts.headers,
            body,
            params: HashMap::new(),
            payload: None,
            claims: None,
            state: Arc::default(),
            extensions: Extensions::new(),
        })
    }

    /// HTTP method as received
    #[must_use]
    pub const fn method(&self) -> &hyper::Method {
        &self.method
    }

    /// Request path without the query string
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw query string
    #[must_use]
    pub fn query_string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }

    /// Decoded query parameter (last value wins for repeated keys)
    #[must_use]
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query_params.get(name).map(String::as_str)
    }

    /// All decoded query parameters
    #[must_use]
    pub const fn query_map(&self) -> &HashMap<String, String> {
        &self.query_params
    }

    /// Get a header value by name (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// All headers
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Set or override a header; invalid names or values are dropped
    pub fn set_header(&mut self, name: &str, value: &str) {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(n), Ok(v)) => {
                self.headers.insert(n, v);
            }
            _ => warn!(header = %name, "Ignoring invalid request header"),
        }
    }

    /// `Content-Type` header, if any
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Request id assigned by the dispatcher (or sent by the client)
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.header("x-request-id")
    }

    /// Raw body
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body as UTF-8 text
    #[must_use]
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Typed path captures
    #[must_use]
    pub const fn params(&self) -> &HashMap<String, ParamValue> {
        &self.params
    }

    /// Single path capture
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }

    /// Integer path capture
    #[must_use]
    pub fn param_int(&self, name: &str) -> Option<i64> {
        self.params.get(name).and_then(ParamValue::as_int)
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, ParamValue>) {
        self.params = params;
    }

    /// Payload decoded and validated against the route's consumes contract
    #[must_use]
    pub const fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    /// Deserialize the validated payload into `T`
    ///
    /// # Errors
    ///
    /// Unexpected handler error when the route declared no consumes contract
    /// or the payload does not fit `T`.
    pub fn payload_as<T: DeserializeOwned>(&self) -> std::result::Result<T, HandlerError> {
        let payload = self
            .payload
            .clone()
            .ok_or_else(|| HandlerError::unexpected(anyhow::anyhow!("route has no decoded payload")))?;
        serde_json::from_value(payload).map_err(HandlerError::unexpected)
    }

    pub(crate) fn set_payload(&mut self, payload: Value) {
        self.payload = Some(payload);
    }

    /// Claims stored by an authentication gate
    #[must_use]
    pub const fn claims(&self) -> Option<&Value> {
        self.claims.as_ref()
    }

    /// Store authenticated claims
    pub fn set_claims(&mut self, claims: Value) {
        self.claims = Some(claims);
    }

    /// Shared value of type `T` from the application state
    #[must_use]
    pub fn state<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.state.get::<T>()
    }

    pub(crate) fn set_state(&mut self, state: Arc<AppState>) {
        self.state = state;
    }

    /// Per-request values set by hooks
    #[must_use]
    pub const fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Mutable per-request values
    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }
}

/// Collect a body, stopping as soon as it passes `limit` bytes
async fn read_body_limited<B>(body: B, limit: usize) -> Result<Bytes>
where
    B: hyper::body::Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => Err(Error::PayloadTooLarge {
            limit,
            actual: None,
        }),
        Err(e) => match e.downcast::<hyper::Error>() {
            Ok(e) => Err(Error::Http(*e)),
            Err(e) => Err(Error::Io(std::io::Error::other(e))),
        },
    }
}

/// Parse a query string into a map; repeated keys keep the last value
fn parse_query_string(query: Option<&str>) -> HashMap<String, String> {
    query
        .and_then(|q| serde_urlencoded::from_str::<Vec<(String, String)>>(q).ok())
        .map(|pairs| pairs.into_iter().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::Method;
    use futures_util::stream;
    use http_body_util::StreamBody;
    use hyper::body::Frame;
    use serde::Deserialize;
    use serde_json::json;
    use std::convert::Infallible;

    type Chunks = stream::Iter<std::vec::IntoIter<std::result::Result<Frame<Bytes>, Infallible>>>;

    fn chunked(parts: &[&'static str]) -> StreamBody<Chunks> {
        let frames: Vec<_> = parts
            .iter()
            .map(|p| Ok(Frame::data(Bytes::from_static(p.as_bytes()))))
            .collect();
        StreamBody::new(stream::iter(frames))
    }

    #[tokio::test]
    async fn test_streamed_body_cut_off_at_limit() {
        let err = read_body_limited(chunked(&["hello ", "world!"]), 8)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PayloadTooLarge { limit: 8, actual: None }));

        let body = read_body_limited(chunked(&["hello ", "world!"]), 64).await.unwrap();
        assert_eq!(&body[..], b"hello world!");
    }

    #[tokio::test]
    async fn test_stream_failure_is_not_payload_too_large() {
        let failing = StreamBody::new(stream::iter(vec![Err::<Frame<Bytes>, _>(
            std::io::Error::other("reset"),
        )]));
        let err = read_body_limited(failing, 64).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_new_splits_query() {
        let req = Request::new(Method::Get, "/search?page=1&limit=10");
        assert_eq!(req.path(), "/search");
        assert_eq!(req.query_string(), Some("page=1&limit=10"));
        assert_eq!(req.query("page"), Some("1"));
        assert_eq!(req.query("limit"), Some("10"));
    }

    #[test]
    fn test_parse_query_string_empty() {
        assert!(parse_query_string(None).is_empty());
    }

    #[test]
    fn test_parse_query_string_url_encoded() {
        let result = parse_query_string(Some("name=John+Doe&city=New%20York&city=Boston"));
        assert_eq!(result.get("name").map(String::as_str), Some("John Doe"));
        assert_eq!(result.get("city").map(String::as_str), Some("Boston"));
    }

    #[test]
    fn test_headers_case_insensitive() {
        let req = Request::new(Method::Post, "/").with_header("Content-Type", "text/plain");
        assert_eq!(req.header("content-type"), Some("text/plain"));
        assert_eq!(req.content_type(), Some("text/plain"));
    }

    #[test]
    fn test_invalid_header_dropped() {
        let req = Request::new(Method::Get, "/").with_header("bad header", "x");
        assert!(req.headers().is_empty());
    }

    #[test]
    fn test_payload_as() {
        #[derive(Deserialize)]
        struct Item {
            name: String,
        }

        let mut req = Request::new(Method::Post, "/items");
        assert!(req.payload_as::<Item>().is_err());

        req.set_payload(json!({"name": "lamp"}));
        assert_eq!(req.payload_as::<Item>().unwrap().name, "lamp");
    }

    #[test]
    fn test_with_json_sets_content_type() {
        let req = Request::new(Method::Post, "/items").with_json(&json!({"a": 1}));
        assert_eq!(req.content_type(), Some("application/json"));
        assert_eq!(req.body_str(), Some(r#"{"a":1}"#));
    }
}
