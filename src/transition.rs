//! The single-flight transition engine.
//!
//! Drives one navigation through deactivate-guards → activate-guards → middleware, with
//! cancellation on supersession (a newer `navigate` call always wins), a bounded redirect-restart
//! loop, and event emission around each stage.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::error::{RouterError, TransitionError};
use crate::events::{EventBus, RouterEvent};
use crate::guard::{GuardChain, GuardContext, GuardOutcome};
use crate::middleware::{MiddlewareOutcome, MiddlewarePipeline};
use crate::options::MAX_REDIRECTS;
use crate::route_tree::RouteTree;
use crate::state::{NavigationOptions, State, StateBuilder};

/// Which side of the route's guard list is being run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GuardSide {
    Deactivate,
    Activate,
}

enum StepOutcome {
    Continue,
    Redirect(State),
    Reject { route: String, error: RouterError },
}

/// Owns the authoritative "current state" and drives navigations through the guarded pipeline.
pub struct TransitionEngine {
    route_tree: Arc<RwLock<RouteTree>>,
    state_builder: StateBuilder,
    events: EventBus,
    middleware: RwLock<MiddlewarePipeline>,
    current: Mutex<Option<State>>,
    generation: AtomicU64,
    in_flight: AtomicBool,
}

/// Clears [`TransitionEngine::in_flight`] when dropped, regardless of which `return` the
/// pipeline took.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl TransitionEngine {
    pub fn new(
        route_tree: Arc<RwLock<RouteTree>>,
        state_builder: StateBuilder,
        events: EventBus,
        middleware: MiddlewarePipeline,
    ) -> Self {
        Self {
            route_tree,
            state_builder,
            events,
            middleware: RwLock::new(middleware),
            current: Mutex::new(None),
            generation: AtomicU64::new(0),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Whether a navigation is currently running its guard/middleware pipeline. Consulted by
    /// the route tree's mutation methods to decide whether to log a diagnostic.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn current_state(&self) -> Option<State> {
        self.current.lock().expect("transition engine lock poisoned").clone()
    }

    /// Forcibly sets the current state without running the pipeline (used for `Router::start`'s
    /// bootstrap navigation and for `skip_transition`).
    pub fn commit_without_pipeline(&self, state: State) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.current.lock().expect("transition engine lock poisoned") = Some(state);
    }

    /// Cancels any in-flight transition by invalidating its generation; used by `Router::stop`.
    pub fn cancel_in_flight(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Appends `middleware` to the pipeline run on every future transition.
    pub fn register_middleware(&self, middleware: Arc<dyn crate::middleware::Middleware>) {
        self.middleware
            .write()
            .expect("middleware lock poisoned")
            .register(middleware);
    }

    fn superseded(&self, my_generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) != my_generation
    }

    fn emit_cancel(&self, to: &State, from: &Option<State>) {
        self.events.emit(RouterEvent::TransitionCancel {
            to: to.clone(),
            from: from.clone(),
        });
    }

    fn emit_error(&self, to: &State, from: &Option<State>, error: &RouterError) {
        self.events.emit(RouterEvent::TransitionError {
            to: to.clone(),
            from: from.clone(),
            error: error.clone(),
        });
    }

    /// Runs the full navigation pipeline to `to`, returning the committed state or a typed
    /// transition error.
    pub async fn navigate(&self, to: State, options: NavigationOptions) -> Result<State, TransitionError> {
        let from = self.current_state();

        if !self.route_tree.read().expect("route tree lock poisoned").has_route(&to.name) {
            // Precondition failure, same class as a `ValidationError`: rejected synchronously,
            // before `TRANSITION_START` has ever fired for this record, so no event is emitted.
            let error = RouterError::RouteNotFound(to.name.clone());
            return Err(TransitionError { to, from, error });
        }

        let query_keys = self
            .route_tree
            .read()
            .expect("route tree lock poisoned")
            .declared_query_params(&to.name);

        if !options.force
            && !options.reload
            && from
                .as_ref()
                .map(|f| StateBuilder::are_states_equal(f, &to, &query_keys))
                .unwrap_or(false)
        {
            // Rejected before `TRANSITION_START` fires for this record: spec §4.4 step 2 is
            // explicit that a same-state rejection emits no events at all.
            let error = RouterError::SameStates;
            return Err(TransitionError { to, from, error });
        }

        let my_generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.in_flight.store(true, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.in_flight);
        let original_name = to.name.clone();
        let mut to = to;
        let mut redirects = 0usize;

        'restart: loop {
            self.events.emit(RouterEvent::TransitionStart {
                to: to.clone(),
                from: from.clone(),
            });

            let plan = self
                .state_builder
                .build_navigation_plan(&to, from.as_ref(), options.reload);

            for route_name in &plan.to_deactivate {
                if self.superseded(my_generation) {
                    self.emit_cancel(&to, &from);
                    return Err(TransitionError {
                        to,
                        from,
                        error: RouterError::TransitionCancelled,
                    });
                }

                match self.run_phase(route_name, GuardSide::Deactivate, &to, &from).await {
                    StepOutcome::Continue => {}
                    StepOutcome::Reject { route, error } => {
                        let error = RouterError::cannot_deactivate_with_cause(
                            format!("route '{route}' rejected deactivation"),
                            error,
                        );
                        self.emit_error(&to, &from, &error);
                        return Err(TransitionError { to, from, error });
                    }
                    StepOutcome::Redirect(redirect_to) => {
                        redirects += 1;
                        if redirects > MAX_REDIRECTS {
                            let error = RouterError::cannot_deactivate("exceeded maximum redirect count");
                            self.emit_error(&to, &from, &error);
                            return Err(TransitionError { to, from, error });
                        }
                        to = redirect_to;
                        self.state_builder.mark_redirected(&mut to, &original_name);
                        continue 'restart;
                    }
                }
            }

            for route_name in &plan.to_activate {
                if self.superseded(my_generation) {
                    self.emit_cancel(&to, &from);
                    return Err(TransitionError {
                        to,
                        from,
                        error: RouterError::TransitionCancelled,
                    });
                }

                match self.run_phase(route_name, GuardSide::Activate, &to, &from).await {
                    StepOutcome::Continue => {}
                    StepOutcome::Reject { route, error } => {
                        let error = RouterError::cannot_activate_with_cause(
                            format!("route '{route}' rejected activation"),
                            error,
                        );
                        self.emit_error(&to, &from, &error);
                        return Err(TransitionError { to, from, error });
                    }
                    StepOutcome::Redirect(redirect_to) => {
                        redirects += 1;
                        if redirects > MAX_REDIRECTS {
                            let error = RouterError::cannot_activate("exceeded maximum redirect count");
                            self.emit_error(&to, &from, &error);
                            return Err(TransitionError { to, from, error });
                        }
                        to = redirect_to;
                        self.state_builder.mark_redirected(&mut to, &original_name);
                        continue 'restart;
                    }
                }
            }

            if self.superseded(my_generation) {
                self.emit_cancel(&to, &from);
                return Err(TransitionError {
                    to,
                    from,
                    error: RouterError::TransitionCancelled,
                });
            }

            let pipeline = self.middleware.read().expect("middleware lock poisoned").clone();
            if !pipeline.is_empty() {
                let ctx = GuardContext::new(to.clone(), from.clone());
                match pipeline.run(&ctx).await {
                    MiddlewareOutcome::Continue => {}
                    MiddlewareOutcome::Redirect(redirect_to) => {
                        redirects += 1;
                        if redirects > MAX_REDIRECTS {
                            let error = RouterError::cannot_activate("exceeded maximum redirect count");
                            self.emit_error(&to, &from, &error);
                            return Err(TransitionError { to, from, error });
                        }
                        to = redirect_to;
                        self.state_builder.mark_redirected(&mut to, &original_name);
                        continue 'restart;
                    }
                }
            }

            if self.superseded(my_generation) {
                self.emit_cancel(&to, &from);
                return Err(TransitionError {
                    to,
                    from,
                    error: RouterError::TransitionCancelled,
                });
            }

            *self.current.lock().expect("transition engine lock poisoned") = Some(to.clone());
            self.events.emit(RouterEvent::TransitionSuccess {
                to: to.clone(),
                from,
                options,
            });
            return Ok(to);
        }
    }

    async fn run_phase(
        &self,
        route_name: &str,
        side: GuardSide,
        to: &State,
        from: &Option<State>,
    ) -> StepOutcome {
        let guards = {
            let tree = self.route_tree.read().expect("route tree lock poisoned");
            match tree.route(route_name) {
                Some(node) => {
                    let list = match side {
                        GuardSide::Deactivate => node.can_deactivate.clone(),
                        GuardSide::Activate => node.can_activate.clone(),
                    };
                    GuardChain::new(list)
                }
                None => return StepOutcome::Continue,
            }
        };

        if guards.is_empty() {
            return StepOutcome::Continue;
        }

        let ctx = GuardContext::new(to.clone(), from.clone());
        for guard in guards.iter() {
            match guard.check(ctx.clone()).await {
                GuardOutcome::Continue => continue,
                GuardOutcome::Reject(error) => {
                    return StepOutcome::Reject {
                        route: route_name.to_string(),
                        error,
                    }
                }
                GuardOutcome::Redirect(target) => return StepOutcome::Redirect(target),
            }
        }

        StepOutcome::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::AtomicIdClock;
    use crate::events::EventKind;
    use crate::guard::{ConditionalGuard, RedirectGuard};
    use crate::route_tree::RouteDecl;
    use std::sync::atomic::AtomicUsize;

    fn make_engine() -> (Arc<RwLock<RouteTree>>, TransitionEngine) {
        let mut tree = RouteTree::new();
        tree.add(RouteDecl::new("home", "/"), None).unwrap();
        tree.add(RouteDecl::new("admin", "/admin"), None).unwrap();
        let tree = Arc::new(RwLock::new(tree));
        let engine = TransitionEngine::new(
            tree.clone(),
            StateBuilder::new(Arc::new(AtomicIdClock::new())),
            EventBus::new(),
            MiddlewarePipeline::new(),
        );
        (tree, engine)
    }

    fn state(name: &str, path: &str) -> State {
        State::new(name, Default::default(), path)
    }

    #[tokio::test]
    async fn first_navigation_succeeds_with_no_from_state() {
        let (_, engine) = make_engine();
        let result = engine.navigate(state("home", "/"), NavigationOptions::default()).await;
        assert!(result.is_ok());
        assert_eq!(engine.current_state().unwrap().name, "home");
    }

    #[tokio::test]
    async fn same_state_navigation_is_rejected_without_force() {
        let (_, engine) = make_engine();
        engine.navigate(state("home", "/"), NavigationOptions::default()).await.unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        let e1 = events.clone();
        engine.events.on(EventKind::TransitionStart, move |_| {
            e1.lock().unwrap().push(EventKind::TransitionStart);
        });
        let e2 = events.clone();
        engine.events.on(EventKind::TransitionError, move |_| {
            e2.lock().unwrap().push(EventKind::TransitionError);
        });

        let err = engine
            .navigate(state("home", "/"), NavigationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err.error, RouterError::SameStates));
        assert!(events.lock().unwrap().is_empty(), "a same-state rejection must emit no events");
    }

    #[tokio::test]
    async fn route_not_found_is_rejected_without_events() {
        let (_, engine) = make_engine();

        let events = Arc::new(Mutex::new(Vec::new()));
        let e1 = events.clone();
        engine.events.on(EventKind::TransitionStart, move |_| {
            e1.lock().unwrap().push(EventKind::TransitionStart);
        });
        let e2 = events.clone();
        engine.events.on(EventKind::TransitionError, move |_| {
            e2.lock().unwrap().push(EventKind::TransitionError);
        });

        let err = engine
            .navigate(state("nonexistent", "/nonexistent"), NavigationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err.error, RouterError::RouteNotFound(_)));
        assert!(events.lock().unwrap().is_empty(), "a precondition failure must emit no events");
    }

    #[tokio::test]
    async fn force_allows_same_state_navigation() {
        let (_, engine) = make_engine();
        engine.navigate(state("home", "/"), NavigationOptions::default()).await.unwrap();
        let result = engine
            .navigate(
                state("home", "/"),
                NavigationOptions {
                    force: true,
                    ..Default::default()
                },
            )
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn activate_guard_rejection_is_fatal() {
        let (tree, engine) = make_engine();
        tree.write().unwrap().update(
            "admin",
            crate::route_tree::RouteUpdate {
                can_activate: Some(vec![Arc::new(ConditionalGuard::new("deny", |_| {
                    GuardOutcome::Reject(RouterError::cannot_activate("no"))
                }))]),
                ..Default::default()
            },
            false,
        ).unwrap();

        let err = engine
            .navigate(state("admin", "/admin"), NavigationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err.error, RouterError::CannotActivate { .. }));
        assert!(engine.current_state().is_none());
    }

    #[tokio::test]
    async fn activate_guard_redirect_restarts_pipeline_and_reruns_guards() {
        let (tree, engine) = make_engine();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();

        tree.write().unwrap().update(
            "admin",
            crate::route_tree::RouteUpdate {
                can_activate: Some(vec![Arc::new(RedirectGuard::new(state("home", "/")))]),
                ..Default::default()
            },
            false,
        ).unwrap();
        tree.write().unwrap().update(
            "home",
            crate::route_tree::RouteUpdate {
                can_activate: Some(vec![Arc::new(ConditionalGuard::new("count", move |_| {
                    calls2.fetch_add(1, Ordering::SeqCst);
                    GuardOutcome::Continue
                }))]),
                ..Default::default()
            },
            false,
        ).unwrap();

        let result = engine
            .navigate(state("admin", "/admin"), NavigationOptions::default())
            .await
            .unwrap();
        assert_eq!(result.name, "home");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.meta.unwrap().redirected, Some("admin".to_string()));
    }

    #[tokio::test]
    async fn transition_start_precedes_success() {
        let (_, engine) = make_engine();
        let order = Arc::new(Mutex::new(Vec::new()));
        let o1 = order.clone();
        let o2 = order.clone();
        engine.events.on(EventKind::TransitionStart, move |_| {
            o1.lock().unwrap().push("start");
        });
        engine.events.on(EventKind::TransitionSuccess, move |_| {
            o2.lock().unwrap().push("success");
        });
        engine.navigate(state("home", "/"), NavigationOptions::default()).await.unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["start", "success"]);
    }

    #[tokio::test]
    async fn stopping_cancels_current_generation() {
        let (_, engine) = make_engine();
        engine.cancel_in_flight();
        // A subsequent navigate still works: cancellation only affects in-flight records at
        // their next suspension point, not future calls.
        let result = engine.navigate(state("home", "/"), NavigationOptions::default()).await;
        assert!(result.is_ok());
    }
}
