//! Segment-trie path matching and guarded navigation transitions for client-side routing.
//!
//! A route tree of dotted names compiles into a trie for matching and building URLs; navigating
//! between two named states runs a guarded, cancellable transition pipeline (deactivate guards,
//! activate guards, middleware) before committing and firing events.

pub mod clock;
pub mod error;
pub mod events;
pub mod guard;
pub mod matcher;
pub mod middleware;
pub mod options;
pub mod params;
pub mod route_tree;
pub mod router;
pub mod state;
pub mod transition;

pub use clock::{default_clock, AtomicIdClock, IdClock, SharedIdClock};
pub use error::{BuildError, ForwardError, Result, RouterError, TransitionError};
pub use events::{EventBus, EventKind, RouterEvent, Unsubscribe};
pub use guard::{
    AllowGuard, ConditionalGuard, DenyGuard, GuardChain, GuardContext, GuardFuture, GuardOutcome,
    NavigationGuard, RedirectGuard,
};
pub use matcher::{CompiledRoute, MatchOutcome, PathMatcher, PatternSegment, RouteId, RouteInput};
pub use middleware::{FnMiddleware, Middleware, MiddlewareOutcome, MiddlewarePipeline};
pub use options::{QueryParamsMode, RouterOptions, TrailingSlashMode, MAX_FORWARD_CHAIN, MAX_REDIRECTS, UNKNOWN_ROUTE};
pub use params::{
    default_query_parser, DefaultQueryParser, EncodingStrategy, ParamsError, Params, ParsedPath,
    QueryParams, QueryParser, SharedQueryParser,
};
pub use route_tree::{ForwardTarget, RouteDecl, RouteNode, RouteTree, RouteUpdate};
pub use router::Router;
pub use state::{Meta, NavigationOptions, NavigationPlan, State, StateBuilder};

#[cfg(feature = "async-guards")]
pub use guard::{AsyncGuardAdapter, AsyncNavigationGuard};
