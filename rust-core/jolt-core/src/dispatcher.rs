//! # Dispatcher
//!
//! Application assembly and the per-request state machine.
//!
//! ```text
//! Received -> Matched -> ContentChecked -> Authorized -> Handled -> Responded
//!     |          |             |               |            |
//!   404/405     415/422       401/403       error table / 500
//! ```
//!
//! Every terminal error becomes a structured body
//! `{"status": "error", "message": ..., "data": ...}`. Nothing escapes
//! [`App::dispatch`]; unexpected errors are logged with their full chain
//! and the client sees a generic 500.

use crate::config::AppConfig;
use crate::controller::{Controller, RouteBuilder};
use crate::error::{DispatchError, HandlerError, Result};
use crate::hooks::{Hook, HookEntry, HookStage};
use crate::negotiation::{accept_incoming, annotate_outgoing, decode};
use crate::request::Request;
use crate::response::Response;
use crate::router::{Match, MatchError, Method, Router};
use crate::state::AppState;
use crate::static_files::StaticDir;
use futures_util::FutureExt;
use hyper::body::Bytes;
use serde_json::{json, Value};
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("opaque panic payload")
}

/// Message for errors the table does not recognise
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// Domain error kind to (status, default message)
#[derive(Debug, Clone, Default)]
pub struct ErrorTable {
    entries: HashMap<String, (u16, String)>,
}

impl ErrorTable {
    /// Empty table; every domain error becomes a 500
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with the common kinds
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new()
            .with("bad_request", 400, "Bad request")
            .with("forbidden", 403, "Forbidden")
            .with("not_found", 404, "Not found")
            .with("conflict", 409, "Conflict")
            .with("unprocessable", 422, "Unprocessable entity")
    }

    /// Register or replace a kind
    #[must_use]
    pub fn with(mut self, kind: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        self.insert(kind, status, message);
        self
    }

    /// Register or replace a kind in place
    pub fn insert(&mut self, kind: impl Into<String>, status: u16, message: impl Into<String>) {
        self.entries.insert(kind.into(), (status, message.into()));
    }

    /// Status and default message for `kind`
    #[must_use]
    pub fn lookup(&self, kind: &str) -> Option<(u16, &str)> {
        self.entries
            .get(kind)
            .map(|(status, message)| (*status, message.as_str()))
    }
}

/// Collects routes, hooks and shared state, then freezes them into an [`App`]
pub struct AppBuilder {
    config: AppConfig,
    controllers: Vec<Controller>,
    hooks: Vec<HookEntry>,
    state: AppState,
    errors: ErrorTable,
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new(AppConfig::default())
    }
}

impl AppBuilder {
    /// Start an application with the given settings
    #[must_use]
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            controllers: Vec::new(),
            hooks: Vec::new(),
            state: AppState::new(),
            errors: ErrorTable::with_defaults(),
        }
    }

    /// Mount a controller
    #[must_use]
    pub fn controller(mut self, controller: Controller) -> Self {
        self.controllers.push(controller);
        self
    }

    /// Register a single route at the root
    #[must_use]
    pub fn route(mut self, route: RouteBuilder) -> Self {
        self.controllers.push(Controller::new("").route(route));
        self
    }

    /// Application-wide hook, ahead of controller and route hooks
    #[must_use]
    pub fn hook(mut self, entry: HookEntry) -> Self {
        self.hooks.push(entry);
        self
    }

    /// Application-wide hook in both the before and after stages
    #[must_use]
    pub fn around(mut self, hook: impl Hook + 'static) -> Self {
        let hook: Arc<dyn Hook> = Arc::new(hook);
        self.hooks.push(HookEntry {
            stage: HookStage::Before,
            hook: Arc::clone(&hook),
        });
        self.hooks.push(HookEntry {
            stage: HookStage::After,
            hook,
        });
        self
    }

    /// Shared value available to every request
    #[must_use]
    pub fn state<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.state.insert(value);
        self
    }

    /// Serve files from `dir` at `GET {url}/<path:path>`
    #[must_use]
    pub fn static_dir(self, url: &str, dir: impl Into<PathBuf>) -> Self {
        let assets = Arc::new(StaticDir::new(dir));
        let template = format!("{}/<path:path>", url.trim_end_matches('/'));
        self.route(RouteBuilder::get(template).handler(move |req| {
            let assets = Arc::clone(&assets);
            async move { assets.serve(&req).await }
        }))
    }

    /// Replace the error table
    #[must_use]
    pub fn error_table(mut self, errors: ErrorTable) -> Self {
        self.errors = errors;
        self
    }

    /// Map an extra domain error kind
    #[must_use]
    pub fn error(mut self, kind: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        self.errors.insert(kind, status, message);
        self
    }

    /// Register every route and freeze the table.
    ///
    /// # Errors
    ///
    /// The first route misconfiguration: missing handler, malformed
    /// template, duplicate route, or a body contract on GET/HEAD.
    pub fn build(self) -> Result<App> {
        let Self {
            config,
            controllers,
            hooks,
            state,
            errors,
        } = self;

        let mut router = Router::new(config.trailing_slash());
        for controller in controllers {
            for mut definition in controller.into_definitions()? {
                definition.prepend_hooks(&hooks);
                router.register_route(definition)?;
            }
        }

        info!(
            routes = router.len(),
            trailing_slash = ?router.trailing_slash(),
            "Application routes frozen"
        );

        Ok(App {
            inner: Arc::new(AppInner {
                config,
                router,
                state: Arc::new(state),
                errors,
            }),
        })
    }
}

struct AppInner {
    config: AppConfig,
    router: Router,
    state: Arc<AppState>,
    errors: ErrorTable,
}

/// Frozen application. Cheap to clone; safe to share across tasks.
#[derive(Clone)]
pub struct App {
    inner: Arc<AppInner>,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("routes", &self.inner.router.len())
            .field("state", &self.inner.state)
            .finish_non_exhaustive()
    }
}

impl App {
    /// Start building an application
    #[must_use]
    pub fn builder(config: AppConfig) -> AppBuilder {
        AppBuilder::new(config)
    }

    /// Route table
    #[must_use]
    pub fn router(&self) -> &Router {
        &self.inner.router
    }

    /// Settings the application was built with
    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    /// Shared state
    #[must_use]
    pub fn state(&self) -> &AppState {
        &self.inner.state
    }

    /// Turn one request into exactly one response
    pub async fn dispatch(&self, mut req: Request) -> Response {
        let request_id = req
            .request_id()
            .map_or_else(generate_request_id, str::to_string);
        req.set_header("x-request-id", &request_id);

        let is_head = req.method() == hyper::Method::HEAD;
        let method = req.method().to_string();
        let path = req.path().to_string();

        let mut res = match self.process(req).await {
            Ok(res) => res,
            Err(err) => self.error_response(err, &method, &path, &request_id),
        };

        res.set_header("x-request-id", &request_id);
        if is_head {
            res.set_body(Bytes::new());
        }
        res
    }

    async fn process(&self, mut req: Request) -> std::result::Result<Response, DispatchError> {
        let Match { route, params } = self.resolve(&req)?;

        req.set_params(params);
        req.set_state(Arc::clone(&self.inner.state));

        if let Some(consumes) = &route.consumes {
            if !accept_incoming(req.content_type(), &consumes.media_type) {
                return Err(DispatchError::UnsupportedMediaType {
                    expected: consumes.media_type.to_string(),
                    received: req.content_type().map(str::to_string),
                });
            }
            let payload = decode(&req, consumes).await?;
            req.set_payload(payload);
        }

        let mut res = AssertUnwindSafe(route.handler.run(req))
            .catch_unwind()
            .await
            .map_err(|panic| {
                HandlerError::unexpected(anyhow::anyhow!("handler panicked: {}", panic_message(&*panic)))
            })??;

        if let Some(produces) = &route.produces {
            annotate_outgoing(&mut res, produces, &route.label());
        }
        Ok(res)
    }

    fn resolve(&self, req: &Request) -> std::result::Result<Match<'_>, DispatchError> {
        let router = &self.inner.router;
        let path = req.path();

        let not_allowed = |allowed| DispatchError::MethodNotAllowed {
            method: req.method().to_string(),
            path: path.to_string(),
            allowed,
        };

        let Some(method) = Method::from_http(req.method()) else {
            let allowed = router.allowed_methods(path);
            if allowed.is_empty() {
                return Err(DispatchError::NotFound {
                    path: path.to_string(),
                });
            }
            return Err(not_allowed(allowed));
        };

        router.match_route(method, path).map_err(|e| match e {
            MatchError::NotFound => DispatchError::NotFound {
                path: path.to_string(),
            },
            MatchError::MethodNotAllowed { allowed } => not_allowed(allowed),
        })
    }

    fn error_response(&self, err: DispatchError, method: &str, path: &str, request_id: &str) -> Response {
        match err {
            DispatchError::NotFound { .. } => {
                debug!(method, path, request_id, "No route matched");
                error_body(404, "Not found", Value::Null)
            }
            DispatchError::MethodNotAllowed { allowed, .. } => {
                let allow = allowed
                    .iter()
                    .map(Method::as_str)
                    .collect::<Vec<_>>()
                    .join(", ");
                debug!(method, path, request_id, allow = %allow, "Method not allowed");
                error_body(405, "Method not allowed", Value::Null).with_header("allow", &allow)
            }
            DispatchError::UnsupportedMediaType { expected, received } => error_body(
                415,
                "Unsupported media type",
                json!({"expected": expected, "received": received}),
            ),
            DispatchError::Validation(errors) => {
                debug!(method, path, request_id, errors = errors.len(), "Request validation failed");
                error_body(422, "Validation failed", errors.to_value())
            }
            DispatchError::Unauthorized { message } => error_body(401, &message, Value::Null),
            DispatchError::Forbidden { message, required } => {
                error_body(403, &message, json!({"required_roles": required}))
            }
            DispatchError::Handler(HandlerError::Domain(domain)) => {
                match self.inner.errors.lookup(&domain.kind) {
                    Some((status, default_message)) => error_body(
                        status,
                        domain.message.as_deref().unwrap_or(default_message),
                        domain.data.unwrap_or(Value::Null),
                    ),
                    None => {
                        warn!(
                            method,
                            path,
                            request_id,
                            kind = %domain.kind,
                            "Domain error kind missing from the error table"
                        );
                        error_body(500, INTERNAL_ERROR_MESSAGE, Value::Null)
                    }
                }
            }
            DispatchError::Handler(HandlerError::Unexpected(e)) => {
                let chain = format!("{e:#}");
                error!(method, path, request_id, error = %chain, "Unhandled error in request");
                error_body(500, INTERNAL_ERROR_MESSAGE, Value::Null)
            }
        }
    }
}

/// Uniform error envelope
pub(crate) fn error_body(status: u16, message: &str, data: Value) -> Response {
    Response::json(&json!({
        "status": "error",
        "message": message,
        "data": data,
    }))
    .with_status(status)
}

static REQUEST_COUNTER: AtomicUsize = AtomicUsize::new(1);

fn generate_request_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let counter = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{:x}-{:x}", now.as_nanos(), counter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DomainError;

    fn body(res: &Response) -> Value {
        serde_json::from_slice(res.body()).unwrap()
    }

    fn app(route: RouteBuilder) -> App {
        AppBuilder::default().route(route).build().unwrap()
    }

    #[test]
    fn test_error_table_defaults() {
        let table = ErrorTable::with_defaults();
        assert_eq!(table.lookup("conflict"), Some((409, "Conflict")));
        assert_eq!(table.lookup("not_found").map(|(s, _)| s), Some(404));
        assert!(table.lookup("teapot").is_none());

        let table = table.with("teapot", 418, "I'm a teapot");
        assert_eq!(table.lookup("teapot"), Some((418, "I'm a teapot")));
    }

    #[tokio::test]
    async fn test_async_handler_panic_becomes_500() {
        let app = app(RouteBuilder::get("/boom").handler(|_req| async {
            let empty: Vec<u8> = Vec::new();
            Ok(Response::text(empty[0].to_string()))
        }));

        let res = app.dispatch(Request::new(Method::Get, "/boom")).await;
        assert_eq!(res.status(), 500);
        assert_eq!(body(&res)["message"], INTERNAL_ERROR_MESSAGE);
        assert!(res.header("x-request-id").is_some());
    }

    #[test]
    fn test_panic_message_payloads() {
        let boxed: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(&*boxed), "static");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*boxed), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(&*boxed), "opaque panic payload");
    }

    #[test]
    fn test_request_ids_are_unique() {
        assert_ne!(generate_request_id(), generate_request_id());
    }

    #[tokio::test]
    async fn test_request_id_propagated() {
        let app = app(RouteBuilder::get("/").handler(|_req| async { Ok(Response::text("hi")) }));

        let res = app
            .dispatch(Request::new(Method::Get, "/").with_header("x-request-id", "abc-123"))
            .await;
        assert_eq!(res.header("x-request-id"), Some("abc-123"));

        let res = app.dispatch(Request::new(Method::Get, "/missing")).await;
        assert!(res.header("x-request-id").is_some());
    }

    #[tokio::test]
    async fn test_domain_error_uses_table() {
        let app = app(RouteBuilder::post("/users").handler(|_req| async {
            Err::<Response, _>(HandlerError::from(
                DomainError::new("conflict").with_data(json!({"field": "email"})),
            ))
        }));

        let res = app.dispatch(Request::new(Method::Post, "/users")).await;
        assert_eq!(res.status(), 409);
        assert_eq!(
            body(&res),
            json!({"status": "error", "message": "Conflict", "data": {"field": "email"}})
        );
    }

    #[tokio::test]
    async fn test_unknown_kind_and_unexpected_are_500() {
        let app = AppBuilder::default()
            .route(RouteBuilder::get("/kind").handler(|_req| async {
                Err::<Response, _>(HandlerError::domain("mystery"))
            }))
            .route(RouteBuilder::get("/boom").handler(|_req| async {
                Err::<Response, _>(HandlerError::unexpected(anyhow::anyhow!("db down")))
            }))
            .build()
            .unwrap();

        for path in ["/kind", "/boom"] {
            let res = app.dispatch(Request::new(Method::Get, path)).await;
            assert_eq!(res.status(), 500);
            assert_eq!(
                body(&res),
                json!({"status": "error", "message": INTERNAL_ERROR_MESSAGE, "data": null})
            );
        }
    }

    #[tokio::test]
    async fn test_unknown_http_method() {
        let app = app(RouteBuilder::get("/items").handler(|_req| async { Ok(Response::text("x")) }));

        let res = app.dispatch(Request::new(hyper::Method::TRACE, "/items")).await;
        assert_eq!(res.status(), 405);
        assert_eq!(res.header("allow"), Some("GET, HEAD"));

        let res = app.dispatch(Request::new(hyper::Method::TRACE, "/nope")).await;
        assert_eq!(res.status(), 404);
    }

    #[tokio::test]
    async fn test_head_drops_body() {
        let app = app(RouteBuilder::get("/doc").handler(|_req| async { Ok(Response::text("content")) }));

        let res = app.dispatch(Request::new(Method::Head, "/doc")).await;
        assert_eq!(res.status(), 200);
        assert!(res.body().is_empty());
        assert_eq!(res.content_type(), Some("text/plain; charset=utf-8"));
    }

    #[tokio::test]
    async fn test_state_reaches_handler() {
        struct Greeting(&'static str);

        let app = AppBuilder::default()
            .state(Greeting("hello"))
            .route(RouteBuilder::get("/").handler(|req| async move {
                let greeting = req.state::<Greeting>().map_or("none", |g| g.0);
                Ok(Response::text(greeting))
            }))
            .build()
            .unwrap();

        let res = app.dispatch(Request::new(Method::Get, "/")).await;
        assert_eq!(res.body_str(), Some("hello"));
        assert!(app.state().contains::<Greeting>());
    }

    #[test]
    fn test_build_rejects_duplicates() {
        let err = AppBuilder::default()
            .route(RouteBuilder::get("/a/<int:x>").handler(|_req| async { Ok(Response::text("1")) }))
            .route(RouteBuilder::get("/a/<int:y>").handler(|_req| async { Ok(Response::text("2")) }))
            .build()
            .unwrap_err();
        assert!(matches!(err, crate::error::Error::DuplicateRoute { .. }));
    }
}
