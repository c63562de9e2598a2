//! The `Router` facade: binds the matcher, route tree, state builder, transition engine, and
//! event bus into the single object applications drive.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::clock::SharedIdClock;
use crate::error::RouterError;
use crate::events::{EventBus, RouterEvent};
use crate::matcher::{MatchOutcome, PathMatcher};
use crate::middleware::Middleware;
use crate::options::{RouterOptions, UNKNOWN_ROUTE};
use crate::params::Params;
use crate::route_tree::{RouteDecl, RouteTree, RouteUpdate};
use crate::state::{NavigationOptions, State, StateBuilder};
use crate::transition::TransitionEngine;

/// The router facade applications construct and drive. Cheaply `Clone`-able (every field is an
/// `Arc`-backed handle), so the same router can be shared across tasks.
#[derive(Clone)]
pub struct Router {
    matcher: Arc<RwLock<PathMatcher>>,
    route_tree: Arc<RwLock<RouteTree>>,
    state_builder: StateBuilder,
    engine: Arc<TransitionEngine>,
    events: EventBus,
    options: RouterOptions,
    started: Arc<AtomicBool>,
    disposed: Arc<AtomicBool>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("started", &self.started.load(Ordering::SeqCst))
            .field("disposed", &self.disposed.load(Ordering::SeqCst))
            .field("current_state", &self.engine.current_state())
            .finish()
    }
}

impl Router {
    pub fn new(options: RouterOptions) -> Self {
        Self::with_clock(options, crate::clock::default_clock())
    }

    /// Constructs a router with an injected [`SharedIdClock`], for deterministic id sequences in
    /// tests.
    pub fn with_clock(options: RouterOptions, clock: SharedIdClock) -> Self {
        Self::with_collaborators(options, clock, crate::params::default_query_parser())
    }

    /// Constructs a router with an injected [`SharedQueryParser`] (§1's "query parsers" external
    /// collaborator), leaving the id clock at its default.
    pub fn with_query_parser(
        options: RouterOptions,
        query_parser: crate::params::SharedQueryParser,
    ) -> Self {
        Self::with_collaborators(options, crate::clock::default_clock(), query_parser)
    }

    /// Constructs a router with both external collaborators injected explicitly.
    pub fn with_collaborators(
        options: RouterOptions,
        clock: SharedIdClock,
        query_parser: crate::params::SharedQueryParser,
    ) -> Self {
        let route_tree = Arc::new(RwLock::new(RouteTree::new()));
        let state_builder = StateBuilder::new(clock);
        let events = EventBus::new();
        let middleware = crate::middleware::MiddlewarePipeline::new();
        let engine = Arc::new(TransitionEngine::new(
            route_tree.clone(),
            state_builder.clone(),
            events.clone(),
            middleware,
        ));

        Self {
            matcher: Arc::new(RwLock::new(PathMatcher::with_query_parser(
                options.clone(),
                query_parser,
            ))),
            route_tree,
            state_builder,
            engine,
            events,
            options,
            started: Arc::new(AtomicBool::new(false)),
            disposed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn current_state(&self) -> Option<State> {
        self.engine.current_state()
    }

    fn check_active(&self) -> Result<(), RouterError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(RouterError::RouterDisposed);
        }
        if !self.started.load(Ordering::SeqCst) {
            return Err(RouterError::RouterNotStarted);
        }
        Ok(())
    }

    fn check_not_disposed(&self) -> Result<(), RouterError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(RouterError::RouterDisposed);
        }
        Ok(())
    }

    fn rebuild_matcher(&self) -> Result<(), RouterError> {
        let inputs = self.route_tree.read().expect("route tree lock poisoned").to_match_inputs();
        self.matcher
            .write()
            .expect("matcher lock poisoned")
            .register_tree(&inputs)
            .map_err(RouterError::from)
    }

    /// Adds a route (and its subtree) to the tree, then rebuilds the matcher from the whole tree.
    pub fn add_route(&self, decl: RouteDecl, parent: Option<&str>) -> Result<(), RouterError> {
        self.check_not_disposed()?;
        self.route_tree.write().expect("route tree lock poisoned").add(decl, parent)?;
        self.rebuild_matcher()
    }

    pub fn remove_route(&self, name: &str) -> Result<(), RouterError> {
        self.check_not_disposed()?;
        let in_flight = self.engine.is_in_flight();
        self.route_tree
            .write()
            .expect("route tree lock poisoned")
            .remove(name, in_flight)?;
        self.rebuild_matcher()
    }

    pub fn update_route(&self, name: &str, update: RouteUpdate) -> Result<(), RouterError> {
        self.check_not_disposed()?;
        let in_flight = self.engine.is_in_flight();
        let path_changed = update.path.is_some();
        self.route_tree
            .write()
            .expect("route tree lock poisoned")
            .update(name, update, in_flight)?;
        if path_changed {
            self.rebuild_matcher()?;
        }
        Ok(())
    }

    /// Drops every declared route, guard, default, and forward edge, then rebuilds the (now
    /// empty) matcher.
    pub fn clear_routes(&self) -> Result<(), RouterError> {
        self.check_not_disposed()?;
        let in_flight = self.engine.is_in_flight();
        self.route_tree
            .write()
            .expect("route tree lock poisoned")
            .clear_routes(in_flight);
        self.rebuild_matcher()
    }

    /// Appends `middleware` to the pipeline run on every future transition.
    pub fn register_middleware(&self, middleware: Arc<dyn Middleware>) {
        self.engine.register_middleware(middleware);
    }

    /// Starts the router, running a bootstrap navigation (`replace: true`, `skip_transition:
    /// true`) to `initial_path` if given, or to `default_route` otherwise.
    pub fn start(&self, initial_path: Option<&str>) -> Result<State, RouterError> {
        self.check_not_disposed()?;

        let bootstrap_options = NavigationOptions {
            replace: true,
            skip_transition: true,
            ..Default::default()
        };

        let state = match initial_path {
            Some(path) => match self.matcher.read().expect("matcher lock poisoned").match_path(path) {
                Some(outcome) => self.build_matched_state(outcome, bootstrap_options)?,
                None if self.options.allow_not_found => {
                    self.state_builder.make_state(
                        UNKNOWN_ROUTE,
                        Params::new(),
                        path,
                        bootstrap_options,
                        None,
                        None,
                    )
                }
                None => match self.options.default_route.clone() {
                    Some(default) => self.build_state(&default, Params::new(), bootstrap_options)?,
                    None => return Err(RouterError::RouteNotFound(path.to_string())),
                },
            },
            None => {
                let name = self
                    .options
                    .default_route
                    .clone()
                    .ok_or(RouterError::RouterNotStarted)?;
                self.build_state(&name, Params::new(), bootstrap_options)?
            }
        };

        self.engine.commit_without_pipeline(state.clone());
        self.started.store(true, Ordering::SeqCst);
        self.events.emit(RouterEvent::RouterStart);
        Ok(state)
    }

    /// Stops the router: cancels any in-flight transition and marks the router as not-started
    /// (subsequent `navigate*` calls fail with `RouterNotStarted` until `start` runs again).
    pub fn stop(&self) -> Result<(), RouterError> {
        self.check_not_disposed()?;
        self.engine.cancel_in_flight();
        self.started.store(false, Ordering::SeqCst);
        self.events.emit(RouterEvent::RouterStop);
        Ok(())
    }

    /// Permanently disposes the router. Pure read operations ([`Router::match_path`],
    /// [`Router::build_path`], introspection) remain available; all `navigate*`, lifecycle, and
    /// tree-mutation calls fail with [`RouterError::RouterDisposed`] from this point on.
    pub fn dispose(&self) {
        self.engine.cancel_in_flight();
        self.disposed.store(true, Ordering::SeqCst);
        self.started.store(false, Ordering::SeqCst);
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Matches a raw URL path against the compiled routes. A pure read operation: available even
    /// after `dispose()`.
    pub fn match_path(&self, raw_path: &str) -> Option<MatchOutcome> {
        self.matcher.read().expect("matcher lock poisoned").match_path(raw_path)
    }

    /// Builds a canonical URL for a named route. A pure read operation: available even after
    /// `dispose()`.
    pub fn build_path(&self, name: &str, params: &Params) -> Result<String, RouterError> {
        self.build_path_with_trailing_slash(name, params, None)
    }

    /// Builds a canonical URL for a named route, overriding the trailing-slash behavior for just
    /// this call (`Some(true)` forces a trailing slash, `Some(false)` strips one, `None` falls
    /// back to the router-wide `trailing_slash` option). A pure read operation: available even
    /// after `dispose()`.
    pub fn build_path_with_trailing_slash(
        &self,
        name: &str,
        params: &Params,
        trailing_slash_override: Option<bool>,
    ) -> Result<String, RouterError> {
        self.matcher
            .read()
            .expect("matcher lock poisoned")
            .build_path(name, params, trailing_slash_override)
            .map_err(RouterError::from)
    }

    /// Whether `name` is a registered route. A pure read operation: available even after
    /// `dispose()`.
    pub fn has_route(&self, name: &str) -> bool {
        self.route_tree.read().expect("route tree lock poisoned").has_route(name)
    }

    /// The compiled segment chain for `name`, or `None` if it isn't a registered route.
    pub fn segments_by_name(&self, name: &str) -> Option<Vec<crate::matcher::PatternSegment>> {
        self.matcher.read().expect("matcher lock poisoned").segments_by_name(name)
    }

    /// The compiled route metadata for `name` (param sources, constraints, declared query
    /// params, build plan), or `None` if it isn't a registered route.
    pub fn meta_by_name(&self, name: &str) -> Option<Arc<crate::matcher::CompiledRoute>> {
        self.matcher.read().expect("matcher lock poisoned").meta_by_name(name)
    }

    /// The arbitrary, non-standard "route config" keys declared on `name`, or `None` if it isn't
    /// a registered route.
    pub fn route_config(&self, name: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
        self.route_tree
            .read()
            .expect("route tree lock poisoned")
            .route_config(name)
            .cloned()
    }

    /// Sets a prefix every matched/built path is expected to carry (and strips/re-adds
    /// transparently). Rebuilds nothing by itself — call before the first `match_path`/`start`.
    pub fn set_root_path(&self, root: impl Into<String>) {
        self.matcher.write().expect("matcher lock poisoned").set_root_path(root);
    }

    /// Constructs a `State` value with no validation and no forward resolution — a plain data
    /// constructor, for callers that already know exactly what they want.
    pub fn make_state(
        &self,
        name: impl Into<String>,
        params: Params,
        path: impl Into<String>,
        options: NavigationOptions,
    ) -> State {
        self.state_builder.make_state(name, params, path, options, None, None)
    }

    /// Validates `name` exists, resolves its `forwardTo` chain, merges default params, and
    /// builds the canonical path — the full state-construction pipeline used by `navigate`.
    pub fn build_state(
        &self,
        name: &str,
        params: Params,
        options: NavigationOptions,
    ) -> Result<State, RouterError> {
        if name.is_empty() {
            return Err(RouterError::ValidationError("route name must not be empty".into()));
        }

        let tree = self.route_tree.read().expect("route tree lock poisoned");
        if !tree.has_route(name) {
            return Err(RouterError::RouteNotFound(name.to_string()));
        }

        let resolved_name = tree.resolve_forward(name, &params)?;
        let node = tree.route(&resolved_name).expect("resolve_forward returns an existing route");
        let merged = StateBuilder::merge_defaults(&params, &node.default_params);
        let build_params = match &node.encode_params {
            Some(encode) => encode(&merged),
            None => merged.clone(),
        };
        drop(tree);

        let path = self
            .matcher
            .read()
            .expect("matcher lock poisoned")
            .build_path(&resolved_name, &build_params, None)?;

        let redirected = if resolved_name != name {
            Some(name.to_string())
        } else {
            None
        };

        Ok(self
            .state_builder
            .make_state(resolved_name, merged, path, options, redirected, None))
    }

    /// Applies the matched route's `decode_params` (if declared) to a fresh match outcome before
    /// running it through the usual forward-resolution/default-merge pipeline.
    fn build_matched_state(
        &self,
        outcome: MatchOutcome,
        options: NavigationOptions,
    ) -> Result<State, RouterError> {
        let decoded = {
            let tree = self.route_tree.read().expect("route tree lock poisoned");
            match tree.route(&outcome.name).and_then(|n| n.decode_params.as_ref()) {
                Some(decode) => decode(&outcome.params),
                None => outcome.params,
            }
        };
        self.build_state(&outcome.name, decoded, options)
    }

    /// Resolves `state.name`'s `forwardTo` chain and rebuilds the state against the final
    /// target, preserving its params and navigation options.
    pub fn forward_state(&self, state: &State) -> Result<State, RouterError> {
        let options = state.meta.as_ref().map(|m| m.options.clone()).unwrap_or_default();
        self.build_state(&state.name, state.params.clone(), options)
    }

    /// Navigates to a named route, building its state (forward resolution, default-merge,
    /// canonical path) before running the guarded transition pipeline.
    pub async fn navigate(
        &self,
        name: &str,
        params: Params,
        options: NavigationOptions,
    ) -> Result<State, crate::error::TransitionError> {
        if let Err(error) = self.check_active() {
            return Err(crate::error::TransitionError {
                to: State::new(name, params, ""),
                from: self.current_state(),
                error,
            });
        }

        let to = match self.build_state(name, params.clone(), options.clone()) {
            Ok(state) => state,
            Err(error) => {
                return Err(crate::error::TransitionError {
                    to: State::new(name, params, ""),
                    from: self.current_state(),
                    error,
                })
            }
        };

        self.engine.navigate(to, options).await
    }

    /// Navigates directly to an already-built `State` (e.g. one produced by `match_path` plus
    /// `forward_state`, or by `build_state`), skipping forward resolution and default-merge.
    pub async fn navigate_to_state(
        &self,
        state: State,
        options: NavigationOptions,
    ) -> Result<State, crate::error::TransitionError> {
        if let Err(error) = self.check_active() {
            return Err(crate::error::TransitionError {
                to: state,
                from: self.current_state(),
                error,
            });
        }

        self.engine.navigate(state, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> Router {
        let router = Router::new(RouterOptions::default());
        router.add_route(RouteDecl::new("home", "/"), None).unwrap();
        router
            .add_route(RouteDecl::new("users", "/users"), None)
            .unwrap();
        router
            .add_route(RouteDecl::new("detail", "/:id"), Some("users"))
            .unwrap();
        router
    }

    #[tokio::test]
    async fn navigate_before_start_fails_with_not_started() {
        let router = router();
        let result = router.navigate("home", Params::new(), NavigationOptions::default()).await;
        assert!(matches!(result.unwrap_err().error, RouterError::RouterNotStarted));
    }

    #[test]
    fn start_commits_bootstrap_state_without_pipeline() {
        let router = router();
        let state = router.start(Some("/")).unwrap();
        assert_eq!(state.name, "home");
        assert_eq!(router.current_state().unwrap().name, "home");
    }

    #[test]
    fn start_with_unmatched_path_fails_by_default() {
        let router = router();
        assert!(router.start(Some("/nowhere")).is_err());
    }

    #[test]
    fn start_with_unmatched_path_falls_back_to_default_route() {
        let router = Router::new(RouterOptions {
            default_route: Some("home".to_string()),
            ..RouterOptions::default()
        });
        router.add_route(RouteDecl::new("home", "/"), None).unwrap();
        let state = router.start(Some("/nowhere")).unwrap();
        assert_eq!(state.name, "home");
    }

    #[test]
    fn start_with_allow_not_found_resolves_to_synthetic_route() {
        let router = Router::new(RouterOptions {
            allow_not_found: true,
            ..RouterOptions::default()
        });
        let state = router.start(Some("/nowhere")).unwrap();
        assert_eq!(state.name, UNKNOWN_ROUTE);
    }

    #[tokio::test]
    async fn navigate_after_start_succeeds_and_updates_current_state() {
        let router = router();
        router.start(Some("/")).unwrap();
        let mut params = Params::new();
        params.insert("id".into(), serde_json::Value::String("42".into()));
        let state = router
            .navigate("users.detail", params, NavigationOptions::default())
            .await
            .unwrap();
        assert_eq!(state.name, "users.detail");
        assert_eq!(router.current_state().unwrap().name, "users.detail");
    }

    #[tokio::test]
    async fn dispose_blocks_navigation_but_not_match_path() {
        let router = router();
        router.start(Some("/")).unwrap();
        router.dispose();
        let result = router.navigate("users", Params::new(), NavigationOptions::default()).await;
        assert!(matches!(result.unwrap_err().error, RouterError::RouterDisposed));
        assert!(router.match_path("/users").is_some());
    }

    #[test]
    fn build_path_reflects_registered_routes() {
        let router = router();
        let mut params = Params::new();
        params.insert("id".into(), serde_json::Value::String("7".into()));
        assert_eq!(router.build_path("users.detail", &params).unwrap(), "/users/7");
    }

    #[test]
    fn introspection_reflects_registered_routes() {
        let router = router();
        assert!(router.has_route("users.detail"));
        assert!(!router.has_route("nowhere"));
        assert!(router.segments_by_name("users.detail").is_some());
        assert!(router.meta_by_name("users.detail").is_some());
        assert!(router.segments_by_name("nowhere").is_none());
    }

    #[test]
    fn route_config_exposes_arbitrary_declared_keys() {
        let router = Router::new(RouterOptions::default());
        router
            .add_route(
                RouteDecl::new("admin", "/admin").config("icon", "shield"),
                None,
            )
            .unwrap();
        let config = router.route_config("admin").unwrap();
        assert_eq!(config.get("icon").unwrap(), &serde_json::Value::String("shield".into()));
        assert!(router.route_config("nowhere").is_none());
    }

    #[test]
    fn clear_routes_drops_everything_and_rebuilds_an_empty_matcher() {
        let router = router();
        assert!(router.has_route("users.detail"));
        router.clear_routes().unwrap();
        assert!(!router.has_route("users.detail"));
        assert!(!router.has_route("home"));
        assert!(router.match_path("/").is_none());
    }

    #[test]
    fn build_path_with_trailing_slash_override_beats_the_router_wide_mode() {
        let router = router();
        assert_eq!(router.build_path("users", &Params::new()).unwrap(), "/users");
        assert_eq!(
            router
                .build_path_with_trailing_slash("users", &Params::new(), Some(true))
                .unwrap(),
            "/users/"
        );
    }

    #[test]
    fn set_root_path_is_honored_by_match_and_build() {
        let router = router();
        router.set_root_path("/app");
        assert_eq!(router.match_path("/app/users").unwrap().name, "users");
        assert!(router.match_path("/users").is_none());
        let mut params = Params::new();
        params.insert("id".into(), serde_json::Value::String("7".into()));
        assert_eq!(router.build_path("users.detail", &params).unwrap(), "/app/users/7");
    }

    #[test]
    fn forward_route_redirects_build_state_transparently() {
        let router = router();
        router
            .update_route(
                "home",
                RouteUpdate {
                    forward_to: Some(Some(crate::route_tree::ForwardTarget::Static("users".into()))),
                    ..Default::default()
                },
            )
            .unwrap();
        let state = router.build_state("home", Params::new(), NavigationOptions::default()).unwrap();
        assert_eq!(state.name, "users");
        assert_eq!(state.meta.unwrap().redirected, Some("home".to_string()));
    }

    #[tokio::test]
    async fn registered_middleware_runs_on_every_transition() {
        let router = router();
        router.start(Some("/")).unwrap();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        router.register_middleware(Arc::new(crate::middleware::FnMiddleware::new(
            "record",
            move |ctx| {
                seen2.lock().unwrap().push(ctx.to.name.clone());
                crate::guard::GuardOutcome::Continue
            },
        )));

        router.navigate("users", Params::new(), NavigationOptions::default()).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["users".to_string()]);
    }

    #[test]
    fn match_path_applies_decode_params_before_building_state() {
        let router = Router::new(RouterOptions::default());
        router
            .add_route(
                RouteDecl::new("scaled", "/scaled/:n").decode_params(|p| {
                    let mut out = p.clone();
                    if let Some(n) = p.get("n").and_then(|v| v.as_str()).and_then(|s| s.parse::<i64>().ok()) {
                        out.insert("n".into(), serde_json::Value::from(n * 2));
                    }
                    out
                }),
                None,
            )
            .unwrap();

        let state = router.start(Some("/scaled/21")).unwrap();
        assert_eq!(state.params.get("n").unwrap(), &serde_json::Value::from(42));
    }

    #[test]
    fn match_path_uses_an_injected_query_parser() {
        struct SemicolonParser;
        impl crate::params::QueryParser for SemicolonParser {
            fn parse(
                &self,
                query: &str,
            ) -> std::result::Result<crate::params::QueryParams, crate::params::ParamsError> {
                crate::params::QueryParams::parse(&query.replace(';', "&"))
            }
        }

        let router = Router::with_query_parser(RouterOptions::default(), Arc::new(SemicolonParser));
        router
            .add_route(RouteDecl::new("home", "/?tab&sort"), None)
            .unwrap();

        let state = router.start(Some("/?tab=info;sort=asc")).unwrap();
        assert_eq!(state.params.get("tab").unwrap(), &serde_json::Value::from("info"));
        assert_eq!(state.params.get("sort").unwrap(), &serde_json::Value::from("asc"));
    }
}
