//! # Error Handling
//!
//! Two families of errors live here:
//!
//! - [`Error`]: startup and transport errors. Route-table misconfiguration
//!   (duplicate routes, malformed templates) is never recovered and aborts
//!   application boot.
//! - [`DispatchError`]: per-request terminal states. These are always caught
//!   at the dispatcher boundary and turned into a structured response.
//!
//! Uses `thiserror` for the enums and `anyhow` to carry user errors that the
//! error table does not recognise.

use crate::router::Method;
use crate::validation::ValidationErrors;
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

/// Result type alias for Jolt startup operations
pub type Result<T> = std::result::Result<T, Error>;

/// Startup and transport errors
#[derive(Error, Debug)]
pub enum Error {
    /// Server failed to bind to the specified address
    #[error("Failed to bind server to {address}: {source}")]
    BindError {
        /// The address we tried to bind to
        address: String,
        /// The underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Same method and compiled template registered twice
    #[error("Duplicate route {method} {template} (conflicts with {existing})")]
    DuplicateRoute {
        /// HTTP method of the rejected route
        method: Method,
        /// Template as written by the caller
        template: String,
        /// Template of the route that was registered first
        existing: String,
    },

    /// Path template could not be compiled
    #[error("Invalid route pattern: {pattern}: {reason}")]
    InvalidRoutePattern {
        /// The invalid pattern
        pattern: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Route definition is inconsistent (e.g. GET declaring a request body)
    #[error("Invalid route {method} {path}: {reason}")]
    InvalidRoute {
        /// HTTP method of the route
        method: Method,
        /// Path template of the route
        path: String,
        /// What is wrong with it
        reason: String,
    },

    /// Route builder finished without a handler
    #[error("Route {method} {path} has no handler")]
    MissingHandler {
        /// HTTP method of the route
        method: Method,
        /// Path template of the route
        path: String,
    },

    /// HTTP protocol error
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Request payload too large
    #[error("Payload too large: limit={limit} bytes")]
    PayloadTooLarge {
        /// Max allowed size
        limit: usize,
        /// Size from `Content-Length`; `None` for streamed bodies cut off at the limit
        actual: Option<usize>,
    },
}

/// A recognised application error.
///
/// The `kind` is looked up in the [`ErrorTable`](crate::dispatcher::ErrorTable)
/// to obtain a status code and default message. Kinds missing from the table
/// are treated like any other unexpected error.
#[derive(Debug, Clone)]
pub struct DomainError {
    /// Key into the error table
    pub kind: Cow<'static, str>,
    /// Message shown to the client; falls back to the table default
    pub message: Option<String>,
    /// Extra structured payload for the `data` field
    pub data: Option<Value>,
}

impl DomainError {
    /// Create a domain error of the given kind
    pub fn new(kind: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind: kind.into(),
            message: None,
            data: None,
        }
    }

    /// Override the table's default message
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attach structured data to the error body
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {message}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for DomainError {}

/// Error raised by user code (handlers and hooks)
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Recognised error, translated through the error table
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Anything else; surfaces as a generic 500
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl HandlerError {
    /// Wrap any error as unexpected
    pub fn unexpected(err: impl Into<anyhow::Error>) -> Self {
        Self::Unexpected(err.into())
    }

    /// Shorthand for a domain error of the given kind
    pub fn domain(kind: impl Into<Cow<'static, str>>) -> Self {
        Self::Domain(DomainError::new(kind))
    }
}

/// Per-request terminal error states
#[derive(Error, Debug)]
pub enum DispatchError {
    /// No template matches the path
    #[error("No route found for path: {path}")]
    NotFound {
        /// The path that wasn't matched
        path: String,
    },

    /// A template matches the path but not the method
    #[error("Method {method} not allowed for path: {path}")]
    MethodNotAllowed {
        /// Request method as received
        method: String,
        /// The request path
        path: String,
        /// Methods registered for the matching templates
        allowed: Vec<Method>,
    },

    /// Request content type does not satisfy the consumes contract
    #[error("Unsupported media type: expected {expected}, received {}", .received.as_deref().unwrap_or("none"))]
    UnsupportedMediaType {
        /// Declared media type
        expected: String,
        /// Content-Type header as received
        received: Option<String>,
    },

    /// Payload failed decoding or schema validation
    #[error("Request validation failed with {} error(s)", .0.len())]
    Validation(ValidationErrors),

    /// Authentication gate rejected the request
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Message for the client
        message: String,
    },

    /// Authenticated but lacking the required roles
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Message for the client
        message: String,
        /// Roles the route requires
        required: Vec<String>,
    },

    /// Error raised by a hook or handler
    #[error(transparent)]
    Handler(#[from] HandlerError),
}

impl DispatchError {
    /// Convenience constructor for authentication failures
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(err: DomainError) -> Self {
        Self::Handler(HandlerError::Domain(err))
    }
}

impl From<ValidationErrors> for DispatchError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_route_message() {
        let err = Error::DuplicateRoute {
            method: Method::Get,
            template: "/users/<int:uid>".to_string(),
            existing: "/users/<int:id>".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("GET"));
        assert!(msg.contains("/users/<int:uid>"));
        assert!(msg.contains("/users/<int:id>"));
    }

    #[test]
    fn test_bind_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use");
        let err = Error::BindError {
            address: "0.0.0.0:8000".to_string(),
            source: io_err,
        };
        assert!(err.to_string().contains("0.0.0.0:8000"));
    }

    #[test]
    fn test_domain_error_display() {
        let err = DomainError::new("not_found").with_message("user 7 does not exist");
        assert_eq!(err.to_string(), "not_found: user 7 does not exist");
        assert_eq!(DomainError::new("conflict").to_string(), "conflict");
    }

    #[test]
    fn test_handler_error_conversions() {
        let err: HandlerError = DomainError::new("conflict").into();
        assert!(matches!(err, HandlerError::Domain(_)));

        let err = HandlerError::unexpected(std::io::Error::other("disk on fire"));
        assert!(matches!(err, HandlerError::Unexpected(_)));
        assert!(err.to_string().contains("disk on fire"));
    }

    #[test]
    fn test_unsupported_media_type_message() {
        let err = DispatchError::UnsupportedMediaType {
            expected: "application/json".to_string(),
            received: None,
        };
        assert!(err.to_string().contains("none"));
    }
}
