//! # Jolt Core
//!
//! Routing and request-dispatch core of the Jolt web framework.
//!
//! ## Architecture
//!
//! Routes are declared up front (directly or grouped in controllers), then
//! frozen into an immutable [`App`]. Each request flows through one pipeline:
//!
//! 1. the [`Router`] resolves method and path to a route and typed captures,
//! 2. the route's consumes contract checks the content type and decodes the
//!    payload,
//! 3. the composed hook chain runs pre-auth gates, before-hooks, the handler
//!    and after-hooks,
//! 4. the produces contract stamps the outgoing content type.
//!
//! Every failure along the way becomes a structured JSON error response.
//!
//! ## Modules
//!
//! - `router` - Path matcher with typed captures and specificity ordering
//! - `route` - Compiled path templates and registered routes
//! - `types` - Path parameter types and conversion
//! - `hooks` - Hook trait and chain composition
//! - `controller` - Route builders and prefix-grouped controllers
//! - `negotiation` - Consumes/produces contracts and body decoding
//! - `schema` - Payload schemas
//! - `dispatcher` - Application assembly and request dispatch
//! - `auth` - Bearer token and role gates
//! - `middleware` - Built-in logging, timing and CORS hooks
//! - `server` - HTTP server built on Hyper
//! - `static_files` - Development file serving under a URL prefix
//! - `config` / `logging` - Settings and tracing setup

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod auth;
pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod hooks;
pub mod json;
pub mod logging;
pub mod middleware;
pub mod negotiation;
pub mod request;
pub mod response;
pub mod route;
pub mod router;
pub mod schema;
pub mod server;
pub mod state;
pub mod static_files;
pub mod types;
pub mod validation;

pub use auth::{BearerAuth, RoleGate};
pub use config::AppConfig;
pub use controller::{Controller, RouteBuilder, RouteDefinition};
pub use dispatcher::{App, AppBuilder, ErrorTable};
pub use error::{DispatchError, DomainError, Error, HandlerError, Result};
pub use handler::{Handler, HandlerResult};
pub use hooks::{Flow, Hook, HookChain, HookEntry, HookStage};
pub use middleware::{CorsHook, RequestLogHook, TimingHook};
pub use negotiation::{Consumes, MediaType, Produces};
pub use request::Request;
pub use response::Response;
pub use router::{Method, Router, TrailingSlash};
pub use schema::{Field, ObjectSchema, Schema, TypedSchema};
pub use server::Server;
pub use state::AppState;
pub use static_files::StaticDir;
pub use types::{ParamType, ParamValue};
pub use validation::{FieldError, ValidationCode, ValidationErrors, ValidationResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
