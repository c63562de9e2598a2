//! Router configuration.
//!
//! Arrives entirely through constructor arguments (`RouterOptions` passed to `Router::new`)
//! rather than an external configuration crate — this is a library, not an application, and the
//! teacher crate takes the same approach for its own route/guard configuration.

use crate::params::EncodingStrategy;

/// How declared query parameters are treated when matching a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryParamsMode {
    /// Undeclared query params are accepted and merged in; declared ones are validated.
    #[default]
    Default,
    /// Any query param not declared on the matched route causes the match to fail.
    Strict,
    /// All query params are accepted without declaration, no validation at all.
    Loose,
}

/// How a trailing `/` on the matched path is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrailingSlashMode {
    /// Accept either form; canonical build output matches the route's own declared pattern.
    #[default]
    Default,
    /// Canonical paths always carry a trailing slash (except the root).
    Always,
    /// Canonical paths never carry a trailing slash.
    Never,
    /// The incoming path's trailing slash must exactly match the route's declared pattern.
    Strict,
}

/// Router-wide configuration, recognized keys per the design (§6.2).
#[derive(Debug, Clone)]
pub struct RouterOptions {
    /// Route name to resolve to when no declared route matches `match_path`, if `allow_not_found`.
    pub default_route: Option<String>,
    /// When a path doesn't match any route: if true, resolve to a synthetic
    /// `__UNKNOWN_ROUTE__` state instead of failing.
    pub allow_not_found: bool,
    /// Whether `State::path` is rewritten to the route's canonical build output on match.
    pub rewrite_path_on_match: bool,
    pub query_params_mode: QueryParamsMode,
    pub trailing_slash: TrailingSlashMode,
    pub case_sensitive: bool,
    pub url_params_encoding: EncodingStrategy,
    /// When true, a query param not declared on the matched route causes the match to fail,
    /// independent of `query_params_mode` (the two are separate recognized options; either one
    /// set to strict is enough to reject an undeclared key).
    pub strict_query_params: bool,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            default_route: None,
            allow_not_found: false,
            rewrite_path_on_match: true,
            query_params_mode: QueryParamsMode::default(),
            trailing_slash: TrailingSlashMode::default(),
            case_sensitive: true,
            url_params_encoding: EncodingStrategy::default(),
            strict_query_params: false,
        }
    }
}

/// The synthetic route name used for `allow_not_found` resolutions.
pub const UNKNOWN_ROUTE: &str = "__UNKNOWN_ROUTE__";

/// Maximum length of a `forwardTo` resolution chain before it is rejected as runaway.
pub const MAX_FORWARD_CHAIN: usize = 100;

/// Maximum number of redirects a single transition may follow before failing.
pub const MAX_REDIRECTS: usize = 5;
