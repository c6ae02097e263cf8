//! # Hook Chain
//!
//! Ordered interception around a handler.
//!
//! ```text
//! pre-auth[0..] -> before[0..] -> handler -> after[0..]
//! ```
//!
//! - A hook in the pre-auth or before stage may short-circuit with a
//!   response ([`Flow::Respond`]) or fail; either way nothing later runs,
//!   after hooks included.
//! - A failing handler skips the after hooks; the error goes straight to the
//!   dispatcher.
//! - After hooks run in declaration order and may rewrite the response.
//!
//! Chains are composed once, when the route is registered. Controller-level
//! hooks come before route-level hooks within each stage.

use crate::error::DispatchError;
use crate::handler::Handler;
use crate::request::Request;
use crate::response::Response;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Outcome of a before-stage hook
#[derive(Debug)]
pub enum Flow {
    /// Continue to the next hook or the handler
    Continue,
    /// Short-circuit with this response (skip everything after)
    Respond(Response),
}

/// Request/response interception
#[async_trait]
pub trait Hook: Send + Sync {
    /// Called in the pre-auth and before stages
    async fn before(&self, _req: &mut Request) -> Result<Flow, DispatchError> {
        Ok(Flow::Continue)
    }

    /// Called in the after stage
    async fn after(&self, _req: &Request, _res: &mut Response) -> Result<(), DispatchError> {
        Ok(())
    }

    /// Hook name for logging
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Where in the chain a hook runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    /// Authentication and authorization gates, first of all
    PreAuth,
    /// Before the handler
    Before,
    /// After a successful handler
    After,
}

/// A hook bound to a stage
#[derive(Clone)]
pub struct HookEntry {
    /// Stage the hook runs in
    pub stage: HookStage,
    /// The hook itself
    pub hook: Arc<dyn Hook>,
}

impl HookEntry {
    /// Bind a hook to a stage
    pub fn new(stage: HookStage, hook: impl Hook + 'static) -> Self {
        Self {
            stage,
            hook: Arc::new(hook),
        }
    }

    /// Pre-auth entry
    pub fn pre_auth(hook: impl Hook + 'static) -> Self {
        Self::new(HookStage::PreAuth, hook)
    }

    /// Before entry
    pub fn before(hook: impl Hook + 'static) -> Self {
        Self::new(HookStage::Before, hook)
    }

    /// After entry
    pub fn after(hook: impl Hook + 'static) -> Self {
        Self::new(HookStage::After, hook)
    }
}

impl std::fmt::Debug for HookEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookEntry")
            .field("stage", &self.stage)
            .field("hook", &self.hook.name())
            .finish()
    }
}

/// Hooks grouped by stage, in declaration order
#[derive(Default, Clone)]
pub struct HookChain {
    pre_auth: Vec<Arc<dyn Hook>>,
    before: Vec<Arc<dyn Hook>>,
    after: Vec<Arc<dyn Hook>>,
}

impl HookChain {
    /// Create an empty chain
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Group entries by stage, keeping their relative order
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = HookEntry>) -> Self {
        let mut chain = Self::new();
        for entry in entries {
            chain.push(entry);
        }
        chain
    }

    /// Append an entry to its stage
    pub fn push(&mut self, entry: HookEntry) {
        match entry.stage {
            HookStage::PreAuth => self.pre_auth.push(entry.hook),
            HookStage::Before => self.before.push(entry.hook),
            HookStage::After => self.after.push(entry.hook),
        }
    }

    /// Total number of hooks
    #[must_use]
    pub fn len(&self) -> usize {
        self.pre_auth.len() + self.before.len() + self.after.len()
    }

    /// Check if chain is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wrap a handler with this chain
    #[must_use]
    pub fn compose(self, handler: Handler) -> ComposedHandler {
        compose(self.pre_auth, self.before, handler, self.after)
    }
}

/// Build the single callable for a route
#[must_use]
pub fn compose(
    pre_auth: Vec<Arc<dyn Hook>>,
    before: Vec<Arc<dyn Hook>>,
    handler: Handler,
    after: Vec<Arc<dyn Hook>>,
) -> ComposedHandler {
    ComposedHandler {
        pre_auth: pre_auth.into(),
        before: before.into(),
        handler,
        after: after.into(),
    }
}

/// Handler wrapped with its hooks
#[derive(Clone)]
pub struct ComposedHandler {
    pre_auth: Arc<[Arc<dyn Hook>]>,
    before: Arc<[Arc<dyn Hook>]>,
    handler: Handler,
    after: Arc<[Arc<dyn Hook>]>,
}

impl ComposedHandler {
    /// Run the chain for one request.
    ///
    /// # Errors
    ///
    /// The first error raised by a hook or the handler, unchanged.
    pub async fn run(&self, mut req: Request) -> Result<Response, DispatchError> {
        for hook in self.pre_auth.iter().chain(self.before.iter()) {
            if let Flow::Respond(res) = hook.before(&mut req).await? {
                debug!(hook = hook.name(), status = res.status(), "Hook short-circuited request");
                return Ok(res);
            }
        }

        let req = Arc::new(req);
        let mut res = self.handler.invoke(Arc::clone(&req)).await?;

        for hook in self.after.iter() {
            hook.after(&req, &mut res).await?;
        }
        Ok(res)
    }

    /// Hook names by stage, for diagnostics
    #[must_use]
    pub fn hook_names(&self) -> Vec<String> {
        let tagged = |prefix: &str, hooks: &[Arc<dyn Hook>]| {
            hooks
                .iter()
                .map(|h| format!("{prefix}:{}", h.name()))
                .collect::<Vec<_>>()
        };
        let mut names = tagged("pre_auth", &self.pre_auth[..]);
        names.extend(tagged("before", &self.before[..]));
        names.extend(tagged("after", &self.after[..]));
        names
    }
}
