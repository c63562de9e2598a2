//! Transition middleware.
//!
//! Unlike a [`guard`](crate::guard), middleware runs once per transition (not per route) in
//! registration order, and its rejections are non-fatal: they are logged and the transition
//! continues. A redirect from middleware restarts the whole pipeline from the same-state check
//! with the new target (see design note on this policy).

use std::fmt;
use std::sync::Arc;

use crate::guard::{GuardContext, GuardFuture, GuardOutcome};

/// A hook that observes (and may redirect or non-fatally object to) every transition.
pub trait Middleware: Send + Sync {
    fn run(&self, ctx: GuardContext) -> GuardFuture;

    fn name(&self) -> &str {
        "middleware"
    }
}

impl fmt::Debug for dyn Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Middleware({})", self.name())
    }
}

/// Wraps a plain synchronous closure as middleware.
pub struct FnMiddleware<F> {
    name: String,
    run_fn: F,
}

impl<F> FnMiddleware<F>
where
    F: Fn(&GuardContext) -> GuardOutcome + Send + Sync,
{
    pub fn new(name: impl Into<String>, run_fn: F) -> Self {
        Self {
            name: name.into(),
            run_fn,
        }
    }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(&GuardContext) -> GuardOutcome + Send + Sync,
{
    fn run(&self, ctx: GuardContext) -> GuardFuture {
        crate::guard::ready((self.run_fn)(&ctx))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// The outcome of running the full middleware pipeline for one transition.
#[derive(Debug)]
pub enum MiddlewareOutcome {
    /// Every middleware continued.
    Continue,
    /// One middleware redirected; the pipeline should restart against this target.
    Redirect(crate::state::State),
}

/// An ordered (registration-order) pipeline of middleware, run once per transition.
#[derive(Clone, Default)]
pub struct MiddlewarePipeline {
    stages: Vec<Arc<dyn Middleware>>,
}

impl fmt::Debug for MiddlewarePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.stages.iter().map(|m| m.name())).finish()
    }
}

impl MiddlewarePipeline {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    pub fn register(&mut self, middleware: Arc<dyn Middleware>) {
        self.stages.push(middleware);
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs every stage in registration order. A `Reject` is logged and does not stop the walk;
    /// a `Redirect` stops the walk immediately and is returned to the caller so it can restart
    /// the transition pipeline.
    pub async fn run(&self, ctx: &GuardContext) -> MiddlewareOutcome {
        for stage in &self.stages {
            match stage.run(ctx.clone()).await {
                GuardOutcome::Continue => continue,
                GuardOutcome::Reject(err) => {
                    tracing::warn!(
                        middleware = stage.name(),
                        error = %err,
                        "middleware rejection is non-fatal; continuing transition"
                    );
                    continue;
                }
                GuardOutcome::Redirect(target) => {
                    tracing::debug!(middleware = stage.name(), to = %target.name, "middleware redirect");
                    return MiddlewareOutcome::Redirect(target);
                }
            }
        }
        MiddlewareOutcome::Continue
    }
}
