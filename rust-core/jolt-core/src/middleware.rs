//! # Built-in Hooks
//!
//! Ready-made hooks for logging, timing and CORS. Register them on a route
//! or controller, or application-wide with `AppBuilder::hook`.

use crate::error::DispatchError;
use crate::hooks::{Flow, Hook};
use crate::request::Request;
use crate::response::Response;
use async_trait::async_trait;
use hyper::header::{HeaderMap, AUTHORIZATION, COOKIE, PROXY_AUTHORIZATION, SET_COOKIE};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info};

/// Logs requests and responses as structured tracing events
#[derive(Debug, Default, Clone)]
pub struct RequestLogHook {
    log_headers: bool,
}

impl RequestLogHook {
    /// Create a new logging hook
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Also log request headers, with credentials redacted
    #[must_use]
    pub const fn with_headers(mut self) -> Self {
        self.log_headers = true;
        self
    }
}

#[async_trait]
impl Hook for RequestLogHook {
    async fn before(&self, req: &mut Request) -> Result<Flow, DispatchError> {
        let request_id = req.request_id().unwrap_or("-");
        if self.log_headers {
            info!(
                method = %req.method(),
                path = %req.path(),
                request_id = %request_id,
                headers = ?redacted_headers(req.headers()),
                "Request received"
            );
        } else {
            info!(
                method = %req.method(),
                path = %req.path(),
                request_id = %request_id,
                "Request received"
            );
        }
        Ok(Flow::Continue)
    }

    async fn after(&self, req: &Request, res: &mut Response) -> Result<(), DispatchError> {
        info!(
            method = %req.method(),
            path = %req.path(),
            status = res.status(),
            request_id = %req.request_id().unwrap_or("-"),
            "Response sent"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "request_log"
    }
}

const REDACTED: &str = "[redacted]";

/// Header map for logs; credential values are masked
fn redacted_headers(headers: &HeaderMap) -> BTreeMap<&str, &str> {
    headers
        .iter()
        .map(|(name, value)| {
            let sensitive = [AUTHORIZATION, PROXY_AUTHORIZATION, COOKIE, SET_COOKIE].contains(name);
            let shown = if sensitive {
                REDACTED
            } else {
                value.to_str().unwrap_or("<binary>")
            };
            (name.as_str(), shown)
        })
        .collect()
}

/// Start instant kept in the request extensions
#[derive(Debug, Clone, Copy)]
struct RequestStart(Instant);

/// Measures handler time and reports it in `x-response-time` (milliseconds).
///
/// Needs both stages; register it with `RouteBuilder::around` or as an
/// application hook.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimingHook;

impl TimingHook {
    /// Create a new timing hook
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Hook for TimingHook {
    async fn before(&self, req: &mut Request) -> Result<Flow, DispatchError> {
        req.extensions_mut().insert(RequestStart(Instant::now()));
        Ok(Flow::Continue)
    }

    async fn after(&self, req: &Request, res: &mut Response) -> Result<(), DispatchError> {
        if let Some(RequestStart(start)) = req.extensions().get::<RequestStart>() {
            let elapsed = start.elapsed();
            debug!(
                method = %req.method(),
                path = %req.path(),
                duration_ms = %elapsed.as_millis(),
                "Request timing"
            );
            res.set_header(
                "x-response-time",
                &format!("{:.3}", elapsed.as_secs_f64() * 1000.0),
            );
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "timing"
    }
}

/// Adds Cross-Origin Resource Sharing headers
#[derive(Debug, Clone)]
pub struct CorsHook {
    allow_origin: String,
    allow_methods: String,
    allow_headers: String,
}

impl Default for CorsHook {
    fn default() -> Self {
        Self {
            allow_origin: "*".to_string(),
            allow_methods: "GET, POST, PUT, DELETE, PATCH, OPTIONS".to_string(),
            allow_headers: "Content-Type, Authorization".to_string(),
        }
    }
}

impl CorsHook {
    /// Create a CORS hook with permissive defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set allowed origin
    #[must_use]
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        self.allow_origin = origin.into();
        self
    }

    /// Set allowed methods
    #[must_use]
    pub fn allow_methods(mut self, methods: impl Into<String>) -> Self {
        self.allow_methods = methods.into();
        self
    }

    /// Set allowed headers
    #[must_use]
    pub fn allow_headers(mut self, headers: impl Into<String>) -> Self {
        self.allow_headers = headers.into();
        self
    }

    /// Access-Control-Allow-Origin value
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.allow_origin
    }

    /// Write the CORS headers onto `res`
    pub fn apply(&self, res: &mut Response) {
        res.set_header("access-control-allow-origin", &self.allow_origin);
        res.set_header("access-control-allow-methods", &self.allow_methods);
        res.set_header("access-control-allow-headers", &self.allow_headers);
    }
}

#[async_trait]
impl Hook for CorsHook {
    async fn after(&self, _req: &Request, res: &mut Response) -> Result<(), DispatchError> {
        self.apply(res);
        Ok(())
    }

    fn name(&self) -> &str {
        "cors"
    }
}
