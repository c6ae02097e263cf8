//! # Controllers
//!
//! Explicit route registration. A [`RouteBuilder`] describes one endpoint
//! (method, path, handler, hooks, media-type contracts); a [`Controller`]
//! groups endpoints under a path prefix and adds class-level hooks that run
//! before each route's own hooks.
//!
//! ```rust,ignore
//! let users = Controller::new("/users")
//!     .pre_auth(BearerAuth::hs256(secret))
//!     .route(RouteBuilder::get("/<int:id>").handler(show_user))
//!     .route(
//!         RouteBuilder::post("/")
//!             .consumes(Consumes::new(MediaType::json()).with_schema(new_user))
//!             .produces(Produces::new(MediaType::json()).with_status(201))
//!             .handler(create_user),
//!     );
//! ```

use crate::error::{Error, HandlerError, Result};
use crate::handler::{Handler, HandlerResult};
use crate::hooks::{Hook, HookEntry, HookStage};
use crate::negotiation::{Consumes, Produces};
use crate::request::Request;
use crate::response::Response;
use crate::router::Method;
use std::future::Future;
use std::sync::Arc;

/// Everything the router needs to register one route
#[derive(Debug)]
pub struct RouteDefinition {
    /// HTTP method
    pub method: Method,
    /// Path template, e.g. `/users/<int:id>`
    pub path: String,
    /// Endpoint callable
    pub handler: Handler,
    /// Hooks in declaration order
    pub hooks: Vec<HookEntry>,
    /// Request body contract
    pub consumes: Option<Consumes>,
    /// Response contract
    pub produces: Option<Produces>,
    /// Optional route name
    pub name: Option<String>,
}

impl RouteDefinition {
    /// Bare route without hooks or contracts
    pub fn new(method: Method, path: impl Into<String>, handler: Handler) -> Self {
        Self {
            method,
            path: path.into(),
            handler,
            hooks: Vec::new(),
            consumes: None,
            produces: None,
            name: None,
        }
    }

    /// Set the request body contract
    #[must_use]
    pub fn with_consumes(mut self, consumes: Consumes) -> Self {
        self.consumes = Some(consumes);
        self
    }

    /// Set the response contract
    #[must_use]
    pub fn with_produces(mut self, produces: Produces) -> Self {
        self.produces = Some(produces);
        self
    }

    /// Put `hooks` ahead of the route's own hooks
    pub(crate) fn prepend_hooks(&mut self, hooks: &[HookEntry]) {
        let mut merged = hooks.to_vec();
        merged.append(&mut self.hooks);
        self.hooks = merged;
    }
}

/// Fluent description of one endpoint
#[derive(Debug)]
pub struct RouteBuilder {
    method: Method,
    path: String,
    handler: Option<Handler>,
    hooks: Vec<HookEntry>,
    consumes: Option<Consumes>,
    produces: Option<Produces>,
    name: Option<String>,
}

impl RouteBuilder {
    /// Start a route for `method` at `path`
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            handler: None,
            hooks: Vec::new(),
            consumes: None,
            produces: None,
            name: None,
        }
    }

    /// GET route
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    /// POST route
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    /// PUT route
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    /// PATCH route
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::Patch, path)
    }

    /// DELETE route
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    /// Async handler
    #[must_use]
    pub fn handler<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<Request>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.handler = Some(Handler::from_async(f));
        self
    }

    /// Blocking handler, run on the blocking pool
    #[must_use]
    pub fn blocking<F>(mut self, f: F) -> Self
    where
        F: Fn(&Request) -> std::result::Result<Response, HandlerError> + Send + Sync + 'static,
    {
        self.handler = Some(Handler::blocking(f));
        self
    }

    /// Prebuilt handler
    #[must_use]
    pub fn with_handler(mut self, handler: Handler) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Add a pre-auth gate
    #[must_use]
    pub fn pre_auth(self, hook: impl Hook + 'static) -> Self {
        self.hook(HookStage::PreAuth, hook)
    }

    /// Add a before hook
    #[must_use]
    pub fn before(self, hook: impl Hook + 'static) -> Self {
        self.hook(HookStage::Before, hook)
    }

    /// Add an after hook
    #[must_use]
    pub fn after(self, hook: impl Hook + 'static) -> Self {
        self.hook(HookStage::After, hook)
    }

    /// Add one hook to both the before and after stages
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

    fn hook(mut self, stage: HookStage, hook: impl Hook + 'static) -> Self {
        self.hooks.push(HookEntry::new(stage, hook));
        self
    }

    /// Declare the accepted request body
    #[must_use]
    pub fn consumes(mut self, consumes: Consumes) -> Self {
        self.consumes = Some(consumes);
        self
    }

    /// Declare the produced response
    #[must_use]
    pub fn produces(mut self, produces: Produces) -> Self {
        self.produces = Some(produces);
        self
    }

    /// Name the route
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Finish the definition.
    ///
    /// # Errors
    ///
    /// `Error::MissingHandler` if no handler was set.
    pub fn build(self) -> Result<RouteDefinition> {
        let handler = self.handler.ok_or_else(|| Error::MissingHandler {
            method: self.method,
            path: self.path.clone(),
        })?;
        Ok(RouteDefinition {
            method: self.method,
            path: self.path,
            handler,
            hooks: self.hooks,
            consumes: self.consumes,
            produces: self.produces,
            name: self.name,
        })
    }
}

/// Routes sharing a path prefix and class-level hooks
#[derive(Debug, Default)]
pub struct Controller {
    prefix: String,
    hooks: Vec<HookEntry>,
    routes: Vec<RouteBuilder>,
}

impl Controller {
    /// Create a controller mounted at `prefix` (`""` or `/` for the root)
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            hooks: Vec::new(),
            routes: Vec::new(),
        }
    }

    /// Mount prefix
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Class-level pre-auth gate
    #[must_use]
    pub fn pre_auth(mut self, hook: impl Hook + 'static) -> Self {
        self.hooks.push(HookEntry::pre_auth(hook));
        self
    }

    /// Class-level before hook
    #[must_use]
    pub fn before(mut self, hook: impl Hook + 'static) -> Self {
        self.hooks.push(HookEntry::before(hook));
        self
    }

    /// Class-level after hook
    #[must_use]
    pub fn after(mut self, hook: impl Hook + 'static) -> Self {
        self.hooks.push(HookEntry::after(hook));
        self
    }

    /// Add an endpoint
    #[must_use]
    pub fn route(mut self, route: RouteBuilder) -> Self {
        self.routes.push(route);
        self
    }

    /// Resolve every endpoint into a registrable definition.
    ///
    /// # Errors
    ///
    /// `Error::MissingHandler` for the first endpoint without a handler.
    pub fn into_definitions(self) -> Result<Vec<RouteDefinition>> {
        let Self {
            prefix,
            hooks,
            routes,
        } = self;
        routes
            .into_iter()
            .map(|route| {
                let mut definition = route.build()?;
                definition.path = join_paths(&prefix, &definition.path);
                definition.prepend_hooks(&hooks);
                Ok(definition)
            })
            .collect()
    }
}

/// Join a mount prefix and a route path with exactly one `/` between them.
///
/// A route path of `/` maps to the bare prefix, so `Controller::new("/users")`
/// with `get("/")` serves `/users`.
fn join_paths(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    match (prefix.is_empty(), path.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => format!("/{path}"),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{prefix}/{path}"),
    }
}
