//! # Router
//!
//! Route table and path matcher.
//!
//! ## Matching
//!
//! Templates are grouped by their canonical pattern and kept sorted by
//! specificity (fewer captures, more literals, non-greedy first), with
//! registration order as the final tie-break. A request walks the groups in
//! that order and takes the first one that matches by shape and owns the
//! method. When some group matched by shape but none owns the method the
//! result is [`MatchError::MethodNotAllowed`], which is distinct from
//! [`MatchError::NotFound`] (405 vs 404 on the wire).
//!
//! The table is append-only while the application is being built and is
//! frozen behind an `Arc` afterwards, so lookups never take a lock.

use crate::controller::RouteDefinition;
use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::hooks::HookChain;
use crate::route::{PathTemplate, Route, RouteId};
use crate::types::ParamValue;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// HTTP methods supported by the router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Method {
    /// HTTP GET
    Get,
    /// HTTP HEAD
    Head,
    /// HTTP POST
    Post,
    /// HTTP PUT
    Put,
    /// HTTP PATCH
    Patch,
    /// HTTP DELETE
    Delete,
    /// HTTP OPTIONS
    Options,
}

impl Method {
    /// Upper-case wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
        }
    }

    /// Map a hyper method; `None` for methods no route can declare
    #[must_use]
    pub fn from_http(method: &hyper::Method) -> Option<Self> {
        method.as_str().parse().ok()
    }

    /// Whether requests with this method may carry a consumed body
    #[must_use]
    pub const fn accepts_body(&self) -> bool {
        !matches!(self, Self::Get | Self::Head)
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "HEAD" => Ok(Self::Head),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "OPTIONS" => Ok(Self::Options),
            _ => Err(()),
        }
    }
}

impl From<Method> for hyper::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => Self::GET,
            Method::Head => Self::HEAD,
            Method::Post => Self::POST,
            Method::Put => Self::PUT,
            Method::Patch => Self::PATCH,
            Method::Delete => Self::DELETE,
            Method::Options => Self::OPTIONS,
        }
    }
}

/// Trailing-slash policy, global to a router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrailingSlash {
    /// `/users/` and `/users` are different paths
    Strict,
    /// A trailing slash is ignored on templates and requests
    #[default]
    Lenient,
}

impl TrailingSlash {
    /// Policy matching a `strict_slashes` flag
    #[must_use]
    pub const fn from_strict(strict: bool) -> Self {
        if strict {
            Self::Strict
        } else {
            Self::Lenient
        }
    }
}

/// Why a request did not resolve to a route
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatchError {
    /// No template matches the path
    #[error("not found")]
    NotFound,
    /// Some template matches the path, none for this method
    #[error("method not allowed (allowed: {allowed:?})")]
    MethodNotAllowed {
        /// Methods that would have matched, sorted
        allowed: Vec<Method>,
    },
}

/// Resolved route with converted captures
#[derive(Debug)]
pub struct Match<'a> {
    /// The matched route
    pub route: &'a Route,
    /// Captures by name, already typed
    pub params: HashMap<String, ParamValue>,
}

impl Match<'_> {
    /// Get a capture as i64
    #[must_use]
    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.params.get(name).and_then(ParamValue::as_int)
    }

    /// Get a capture as f64
    #[must_use]
    pub fn get_float(&self, name: &str) -> Option<f64> {
        self.params.get(name).and_then(ParamValue::as_float)
    }

    /// Get a string or path capture
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(ParamValue::as_str)
    }
}

/// Routes sharing one canonical pattern
struct PatternGroup {
    canonical: String,
    template: PathTemplate,
    first_registered: usize,
    methods: Vec<(Method, RouteId)>,
}

impl PatternGroup {
    fn route_for(&self, method: Method) -> Option<RouteId> {
        let find = |m: Method| {
            self.methods
                .iter()
                .find(|(registered, _)| *registered == m)
                .map(|(_, id)| *id)
        };
        find(method).or_else(|| {
            if method == Method::Head {
                find(Method::Get)
            } else {
                None
            }
        })
    }
}

/// Route table and matcher
pub struct Router {
    routes: Vec<Route>,
    groups: Vec<PatternGroup>,
    trailing_slash: TrailingSlash,
}

impl Default for Router {
    fn default() -> Self {
        Self::new(TrailingSlash::default())
    }
}

impl Router {
    /// Create an empty router with the given trailing-slash policy
    #[must_use]
    pub const fn new(trailing_slash: TrailingSlash) -> Self {
        Self {
            routes: Vec::new(),
            groups: Vec::new(),
            trailing_slash,
        }
    }

    /// Active trailing-slash policy
    #[must_use]
    pub const fn trailing_slash(&self) -> TrailingSlash {
        self.trailing_slash
    }

    /// Register a route without hooks or contracts
    ///
    /// # Errors
    ///
    /// See [`Router::register_route`].
    pub fn register(&mut self, method: Method, template: &str, handler: Handler) -> Result<RouteId> {
        self.register_route(RouteDefinition::new(method, template, handler))
    }

    /// Register a fully described route.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidRoutePattern` if the template does not compile
    /// - `Error::InvalidRoute` if a GET/HEAD route declares a consumes contract
    /// - `Error::DuplicateRoute` if the method and canonical pattern are taken
    pub fn register_route(&mut self, definition: RouteDefinition) -> Result<RouteId> {
        let RouteDefinition {
            method,
            path,
            handler,
            hooks,
            consumes,
            produces,
            name,
        } = definition;

        let template = PathTemplate::parse(&path)?;

        if consumes.is_some() && !method.accepts_body() {
            return Err(Error::InvalidRoute {
                method,
                path,
                reason: format!("{method} endpoints can't consume request bodies"),
            });
        }

        let canonical = template.canonical(self.trailing_slash);
        let route_id = self.routes.len();

        let group_idx = match self.groups.iter().position(|g| g.canonical == canonical) {
            Some(idx) => {
                let group = &self.groups[idx];
                if let Some((_, existing)) = group.methods.iter().find(|(m, _)| *m == method) {
                    return Err(Error::DuplicateRoute {
                        method,
                        template: path,
                        existing: self.routes[*existing].template.as_str().to_string(),
                    });
                }
                idx
            }
            None => {
                self.groups.push(PatternGroup {
                    canonical: canonical.clone(),
                    template: template.clone(),
                    first_registered: route_id,
                    methods: Vec::new(),
                });
                self.groups.len() - 1
            }
        };
        self.groups[group_idx].methods.push((method, route_id));
        self.groups
            .sort_by_key(|g| (g.template.specificity(), g.first_registered));

        debug!(
            method = %method,
            template = %template,
            canonical = %canonical,
            hooks = hooks.len(),
            "Route registered"
        );

        self.routes.push(Route {
            id: route_id,
            method,
            template,
            name,
            consumes,
            produces,
            handler: HookChain::from_entries(hooks).compose(handler),
        });

        Ok(route_id)
    }

    /// Resolve a request.
    ///
    /// # Errors
    ///
    /// `MatchError::NotFound` when no template matches the path,
    /// `MatchError::MethodNotAllowed` when one does but not for `method`.
    pub fn match_route(&self, method: Method, path: &str) -> std::result::Result<Match<'_>, MatchError> {
        let (segments, trailing) = split_path(path);

        let mut allowed = Vec::new();
        for group in self.candidates(&segments, trailing) {
            if let Some(route_id) = group.route_for(method) {
                let route = &self.routes[route_id];
                let params = route
                    .template
                    .matches(&segments)
                    .ok_or(MatchError::NotFound)?;
                return Ok(Match {
                    route,
                    params: params.into_iter().collect(),
                });
            }
            allowed.extend(group.methods.iter().map(|(m, _)| *m));
        }

        if allowed.is_empty() {
            Err(MatchError::NotFound)
        } else {
            Err(MatchError::MethodNotAllowed {
                allowed: normalize_allowed(allowed),
            })
        }
    }

    /// Methods registered for templates matching `path`; empty when none
    #[must_use]
    pub fn allowed_methods(&self, path: &str) -> Vec<Method> {
        let (segments, trailing) = split_path(path);
        let methods = self
            .candidates(&segments, trailing)
            .flat_map(|g| g.methods.iter().map(|(m, _)| *m))
            .collect();
        normalize_allowed(methods)
    }

    fn candidates<'a>(
        &'a self,
        segments: &'a [&'a str],
        trailing: bool,
    ) -> impl Iterator<Item = &'a PatternGroup> + 'a {
        let strict = self.trailing_slash == TrailingSlash::Strict;
        self.groups.iter().filter(move |group| {
            if strict && group.template.has_trailing_slash() != trailing {
                return false;
            }
            group.template.matches(segments).is_some()
        })
    }

    /// Route by id
    #[must_use]
    pub fn route(&self, id: RouteId) -> Option<&Route> {
        self.routes.get(id)
    }

    /// All routes in registration order
    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    /// Number of registered routes
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no route is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

fn normalize_allowed(mut methods: Vec<Method>) -> Vec<Method> {
    if methods.contains(&Method::Get) {
        methods.push(Method::Head);
    }
    methods.sort();
    methods.dedup();
    methods
}

/// Split a request path into raw segments plus a trailing-slash flag
fn split_path(path: &str) -> (Vec<&str>, bool) {
    let body = path.strip_prefix('/').unwrap_or(path);
    let trailing = !body.is_empty() && body.ends_with('/');
    let body = body.strip_suffix('/').unwrap_or(body);
    if body.is_empty() {
        return (Vec::new(), trailing);
    }
    (body.split('/').collect(), trailing)
}
