//! # Content Negotiation
//!
//! Request and response media-type contracts.
//!
//! - [`accept_incoming`] decides whether a request `Content-Type` satisfies a
//!   route's [`Consumes`] contract.
//! - [`decode`] turns the body into a dynamic value (JSON, urlencoded form,
//!   multipart or plain text) and runs the declared schema over it.
//! - [`annotate_outgoing`] enforces a [`Produces`] contract on the handler's
//!   response.

use crate::json;
use crate::request::Request;
use crate::response::Response;
use crate::schema::Schema;
use crate::validation::{FieldError, ValidationCode, ValidationErrors};
use futures_util::future::ready;
use futures_util::stream::once;
use mime::Mime;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// A parsed media type such as `application/json`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType(Mime);

impl MediaType {
    /// `application/json`
    #[must_use]
    pub fn json() -> Self {
        Self(mime::APPLICATION_JSON)
    }

    /// `application/x-www-form-urlencoded`
    #[must_use]
    pub fn form() -> Self {
        Self(mime::APPLICATION_WWW_FORM_URLENCODED)
    }

    /// `multipart/form-data`
    #[must_use]
    pub fn multipart() -> Self {
        Self(mime::MULTIPART_FORM_DATA)
    }

    /// `text/plain; charset=utf-8`
    #[must_use]
    pub fn text() -> Self {
        Self(mime::TEXT_PLAIN_UTF_8)
    }

    /// `text/html; charset=utf-8`
    #[must_use]
    pub fn html() -> Self {
        Self(mime::TEXT_HTML_UTF_8)
    }

    /// Type and subtype without parameters
    #[must_use]
    pub fn essence(&self) -> &str {
        self.0.essence_str()
    }

    /// Full value as written to a header
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_ref()
    }

    /// Underlying `mime` value
    #[must_use]
    pub const fn mime(&self) -> &Mime {
        &self.0
    }

    /// `application/json` or any `+json` structured suffix
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.0.subtype() == mime::JSON
            || self.0.suffix() == Some(mime::JSON)
            || json::is_json_suffix(self.0.subtype().as_str())
    }

    fn is_form(&self) -> bool {
        self.0.type_() == mime::APPLICATION && self.0.subtype() == mime::WWW_FORM_URLENCODED
    }

    fn is_multipart(&self) -> bool {
        self.0.type_() == mime::MULTIPART && self.0.subtype() == mime::FORM_DATA
    }
}

impl FromStr for MediaType {
    type Err = mime::FromStrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Mime> for MediaType {
    fn from(mime: Mime) -> Self {
        Self(mime)
    }
}

/// What a route accepts as request body
#[derive(Clone)]
pub struct Consumes {
    /// Declared media type
    pub media_type: MediaType,
    /// Schema applied to the decoded payload
    pub schema: Option<Arc<dyn Schema>>,
}

impl Consumes {
    /// Contract without a schema
    #[must_use]
    pub const fn new(media_type: MediaType) -> Self {
        Self {
            media_type,
            schema: None,
        }
    }

    /// Validate decoded payloads with `schema`
    #[must_use]
    pub fn with_schema(mut self, schema: impl Schema + 'static) -> Self {
        self.schema = Some(Arc::new(schema));
        self
    }
}

impl fmt::Debug for Consumes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumes")
            .field("media_type", &self.media_type.as_str())
            .field("schema", &self.schema.as_ref().map(|s| s.name()))
            .finish()
    }
}

/// What a route produces
#[derive(Clone)]
pub struct Produces {
    /// Declared media type, forced onto every successful response
    pub media_type: MediaType,
    /// Schema the response body is checked against (logged, never enforced)
    pub schema: Option<Arc<dyn Schema>>,
    /// Status used when the handler never set one
    pub status: Option<u16>,
}

impl Produces {
    /// Contract without schema or default status
    #[must_use]
    pub const fn new(media_type: MediaType) -> Self {
        Self {
            media_type,
            schema: None,
            status: None,
        }
    }

    /// Check response bodies against `schema`
    #[must_use]
    pub fn with_schema(mut self, schema: impl Schema + 'static) -> Self {
        self.schema = Some(Arc::new(schema));
        self
    }

    /// Default status code for successful responses
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

impl fmt::Debug for Produces {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Produces")
            .field("media_type", &self.media_type.as_str())
            .field("schema", &self.schema.as_ref().map(|s| s.name()))
            .field("status", &self.status)
            .finish()
    }
}

/// Whether a request `Content-Type` satisfies `declared`.
///
/// Comparison ignores case and parameters. A JSON declaration also accepts
/// any `+json` subtype, and `*` in the declaration matches anything. A
/// missing or unparsable header never matches.
#[must_use]
pub fn accept_incoming(content_type: Option<&str>, declared: &MediaType) -> bool {
    let Some(incoming) = content_type
        .map(str::trim)
        .filter(|ct| !ct.is_empty())
        .and_then(|ct| ct.parse::<Mime>().ok())
    else {
        return false;
    };
    let declared = declared.mime();

    if declared.type_() != mime::STAR
        && !declared
            .type_()
            .as_str()
            .eq_ignore_ascii_case(incoming.type_().as_str())
    {
        return false;
    }
    if declared.subtype() == mime::STAR {
        return true;
    }
    if same_subtype(declared, &incoming) {
        return true;
    }

    declared.subtype() == mime::JSON
        && (incoming.suffix() == Some(mime::JSON)
            || json::is_json_suffix(incoming.subtype().as_str()))
}

/// Subtype and structured suffix both agree, ignoring case
fn same_subtype(declared: &Mime, incoming: &Mime) -> bool {
    let suffixes_match = match (declared.suffix(), incoming.suffix()) {
        (None, None) => true,
        (Some(a), Some(b)) => a.as_str().eq_ignore_ascii_case(b.as_str()),
        _ => false,
    };
    suffixes_match
        && declared
            .subtype()
            .as_str()
            .eq_ignore_ascii_case(incoming.subtype().as_str())
}

/// Decode the request body per `contract`, then validate it.
///
/// # Errors
///
/// A `body` field error when the body is empty or malformed, otherwise
/// every field error reported by the contract's schema.
pub async fn decode(req: &Request, contract: &Consumes) -> Result<Value, ValidationErrors> {
    if req.body().is_empty() {
        return Err(ValidationErrors::single(FieldError::required("body")));
    }

    let declared = &contract.media_type;
    let value = if declared.is_json() {
        json::parse_value(req.body()).map_err(|e| malformed(&format!("invalid JSON: {e}")))?
    } else if declared.is_form() {
        decode_form(req)?
    } else if declared.is_multipart() {
        decode_multipart(req).await?
    } else {
        let text = req
            .body_str()
            .ok_or_else(|| malformed("body is not valid UTF-8"))?;
        Value::String(text.to_string())
    };

    if let Some(schema) = &contract.schema {
        if let Err(errors) = schema.validate(&value) {
            debug!(schema = schema.name(), errors = errors.len(), "Payload failed validation");
            return Err(errors);
        }
    }
    Ok(value)
}

/// Enforce a produces contract on a successful response.
///
/// The declared type always wins over whatever the handler set; a
/// conflicting value is logged. A declared status only fills in for a
/// response whose status was never set, so an explicit 200 stays 200.
/// The body is left untouched.
pub fn annotate_outgoing(res: &mut Response, declared: &Produces, route: &str) {
    let expected = &declared.media_type;
    match res.content_type().map(str::parse::<MediaType>) {
        Some(Ok(actual)) if actual.essence().eq_ignore_ascii_case(expected.essence()) => {}
        Some(_) => warn!(
            route = %route,
            declared = %expected,
            actual = res.content_type().unwrap_or_default(),
            "Response content type does not match the produces contract; overriding"
        ),
        None => {}
    }
    res.set_header("content-type", expected.as_str());

    if let Some(status) = declared.status.filter(|_| !res.has_explicit_status()) {
        res.set_status(status);
    }

    if let Some(schema) = &declared.schema {
        if let Ok(body) = json::parse_value(res.body()) {
            if let Err(errors) = schema.validate(&body) {
                warn!(
                    route = %route,
                    schema = schema.name(),
                    errors = %errors,
                    "Response body does not match the declared schema"
                );
            }
        }
    }
}

fn malformed(message: &str) -> ValidationErrors {
    ValidationErrors::single(FieldError::new(
        "body",
        message,
        ValidationCode::InvalidFormat,
    ))
}

/// Insert, turning repeated keys into arrays
fn insert_repeated(map: &mut Map<String, Value>, key: String, value: Value) {
    match map.get_mut(&key) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            map.insert(key, value);
        }
    }
}

fn decode_form(req: &Request) -> Result<Value, ValidationErrors> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(req.body())
        .map_err(|e| malformed(&format!("invalid form body: {e}")))?;

    let mut map = Map::new();
    for (key, value) in pairs {
        insert_repeated(&mut map, key, Value::String(value));
    }
    Ok(Value::Object(map))
}

async fn decode_multipart(req: &Request) -> Result<Value, ValidationErrors> {
    let boundary = req
        .content_type()
        .ok_or_else(|| malformed("missing multipart boundary"))
        .and_then(|ct| {
            multer::parse_boundary(ct).map_err(|e| malformed(&format!("invalid multipart boundary: {e}")))
        })?;

    let body = req.body().clone();
    let stream = once(ready(Ok::<_, std::io::Error>(body)));
    let mut multipart = multer::Multipart::new(stream, boundary);

    let multipart_error = |e: multer::Error| malformed(&format!("invalid multipart body: {e}"));
    let mut map = Map::new();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        let value = match field.file_name().map(str::to_string) {
            Some(filename) => {
                let content_type = field.content_type().map(ToString::to_string);
                let data = field.bytes().await.map_err(multipart_error)?;
                serde_json::json!({
                    "filename": filename,
                    "content_type": content_type,
                    "size": data.len(),
                })
            }
            None => Value::String(field.text().await.map_err(multipart_error)?),
        };
        insert_repeated(&mut map, name, value);
    }
    Ok(Value::Object(map))
}
