//! Navigation guards.
//!
//! A guard runs at one of the two guarded phases of a transition (deactivating the routes being
//! left, activating the routes being entered) and returns a [`GuardOutcome`] — either
//! synchronously or via a boxed future, the "deferred value" of the design. A guard rejection is
//! fatal to the transition; see [`crate::middleware`] for the non-fatal counterpart.

use std::fmt;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

use crate::error::RouterError;
use crate::state::State;

/// The outcome of a guard (or middleware) check.
#[derive(Debug, Clone)]
pub enum GuardOutcome {
    /// Allow the transition to proceed.
    Continue,
    /// Abandon the current target and navigate to `State` instead.
    Redirect(State),
    /// Reject the transition with the given error.
    Reject(RouterError),
}

impl GuardOutcome {
    pub fn is_continue(&self) -> bool {
        matches!(self, GuardOutcome::Continue)
    }

    pub fn redirect_target(&self) -> Option<&State> {
        match self {
            GuardOutcome::Redirect(state) => Some(state),
            _ => None,
        }
    }
}

/// A guard or middleware result that may not be ready synchronously.
pub type GuardFuture = BoxFuture<'static, GuardOutcome>;

/// Wraps an already-known outcome as a ready [`GuardFuture`], for guards with no asynchronous
/// work to do.
pub fn ready(outcome: GuardOutcome) -> GuardFuture {
    futures::future::ready(outcome).boxed()
}

/// Context given to a guard: the state being left (if any) and the state being entered.
#[derive(Debug, Clone)]
pub struct GuardContext {
    pub from: Option<State>,
    pub to: State,
}

impl GuardContext {
    pub fn new(to: State, from: Option<State>) -> Self {
        Self { to, from }
    }

    pub fn param(&self, name: &str) -> Option<&serde_json::Value> {
        self.to.params.get(name)
    }
}

/// A navigation guard attached to a route's `canActivate`/`canDeactivate` list.
pub trait NavigationGuard: Send + Sync {
    /// Checks whether the transition may proceed, returning a (possibly deferred) outcome.
    fn check(&self, ctx: GuardContext) -> GuardFuture;

    /// Name used in diagnostics and in `CannotActivate`/`CannotDeactivate` causes.
    fn name(&self) -> &str {
        "guard"
    }

    /// Guards with a higher priority run before lower-priority ones at the same phase.
    fn priority(&self) -> i32 {
        0
    }
}

impl fmt::Debug for dyn NavigationGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NavigationGuard({})", self.name())
    }
}

/// An ergonomic async-native guard trait, available under the `async-guards` feature for
/// consumers who would rather write `async fn check` than hand-box a future.
#[cfg(feature = "async-guards")]
#[async_trait::async_trait]
pub trait AsyncNavigationGuard: Send + Sync {
    async fn check(&self, ctx: GuardContext) -> GuardOutcome;

    fn name(&self) -> &str {
        "async-guard"
    }

    fn priority(&self) -> i32 {
        0
    }
}

/// Adapts an [`AsyncNavigationGuard`] into a [`NavigationGuard`].
#[cfg(feature = "async-guards")]
pub struct AsyncGuardAdapter<G>(pub Arc<G>);

#[cfg(feature = "async-guards")]
impl<G: AsyncNavigationGuard + 'static> NavigationGuard for AsyncGuardAdapter<G> {
    fn check(&self, ctx: GuardContext) -> GuardFuture {
        let guard = self.0.clone();
        async move { guard.check(ctx).await }.boxed()
    }

    fn name(&self) -> &str {
        self.0.name()
    }

    fn priority(&self) -> i32 {
        self.0.priority()
    }
}

/// A guard that always continues.
#[derive(Debug, Default)]
pub struct AllowGuard;

impl NavigationGuard for AllowGuard {
    fn check(&self, _ctx: GuardContext) -> GuardFuture {
        ready(GuardOutcome::Continue)
    }

    fn name(&self) -> &str {
        "AllowGuard"
    }
}

/// A guard that always rejects with a fixed message.
#[derive(Debug, Clone)]
pub struct DenyGuard {
    message: String,
}

impl DenyGuard {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl NavigationGuard for DenyGuard {
    fn check(&self, _ctx: GuardContext) -> GuardFuture {
        ready(GuardOutcome::Reject(RouterError::cannot_activate(
            self.message.clone(),
        )))
    }

    fn name(&self) -> &str {
        "DenyGuard"
    }
}

/// A guard that always redirects to a fixed target state.
#[derive(Debug, Clone)]
pub struct RedirectGuard {
    target: State,
}

impl RedirectGuard {
    pub fn new(target: State) -> Self {
        Self { target }
    }
}

impl NavigationGuard for RedirectGuard {
    fn check(&self, _ctx: GuardContext) -> GuardFuture {
        ready(GuardOutcome::Redirect(self.target.clone()))
    }

    fn name(&self) -> &str {
        "RedirectGuard"
    }
}

/// Wraps a plain synchronous closure as a guard.
pub struct ConditionalGuard<F> {
    name: String,
    check_fn: F,
}

impl<F> ConditionalGuard<F>
where
    F: Fn(&GuardContext) -> GuardOutcome + Send + Sync,
{
    pub fn new(name: impl Into<String>, check_fn: F) -> Self {
        Self {
            name: name.into(),
            check_fn,
        }
    }
}

impl<F> NavigationGuard for ConditionalGuard<F>
where
    F: Fn(&GuardContext) -> GuardOutcome + Send + Sync,
{
    fn check(&self, ctx: GuardContext) -> GuardFuture {
        ready((self.check_fn)(&ctx))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// An ordered, shareable list of guards attached to one route, sorted by descending priority.
#[derive(Clone, Default)]
pub struct GuardChain {
    guards: Vec<Arc<dyn NavigationGuard>>,
}

impl fmt::Debug for GuardChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.guards.iter().map(|g| g.name())).finish()
    }
}

impl GuardChain {
    pub fn new(mut guards: Vec<Arc<dyn NavigationGuard>>) -> Self {
        guards.sort_by_key(|g| std::cmp::Reverse(g.priority()));
        Self { guards }
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn NavigationGuard>> {
        self.guards.iter()
    }
}
