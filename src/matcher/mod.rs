//! Segment-trie path matching: compile route patterns, match a URL path, and build a URL from a
//! route name and parameters.

pub mod pattern;
pub mod trie;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;

use crate::error::BuildError;
use crate::options::{QueryParamsMode, RouterOptions, TrailingSlashMode};
use crate::params::{
    default_query_parser, percent_decode, percent_encode, percent_encode_splat,
    value_to_build_string, EncodingStrategy, ParsedPath, Params, SharedQueryParser,
};

pub use pattern::{
    build_plan_from_segments, parse_pattern, BuildPlan, BuildSlot, CompiledRoute, ParamSource,
    PatternSegment, RouteId,
};
pub use trie::Trie;

/// One route as seen by the matcher: a fully-qualified name and its own (ancestor-concatenated)
/// pattern string, as produced by the route tree walking its hierarchy.
#[derive(Debug, Clone)]
pub struct RouteInput {
    pub name: String,
    /// The full pattern string, with ancestor segments already concatenated (unless this
    /// route's own pattern is rooted with `~`, in which case the route tree passes just its own
    /// pattern).
    pub full_pattern: String,
}

/// The result of successfully matching a URL path to a compiled route.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub name: String,
    pub params: Params,
    /// The canonical path (per `rewrite_path_on_match`), or the original clean path.
    pub path: String,
}

/// Compiles route patterns, matches incoming URL paths against them, and builds URLs back out.
pub struct PathMatcher {
    trie: Trie,
    routes_by_name: HashMap<String, Arc<CompiledRoute>>,
    root_path: Option<String>,
    options: RouterOptions,
    query_parser: SharedQueryParser,
}

impl std::fmt::Debug for PathMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathMatcher")
            .field("trie", &self.trie)
            .field("routes_by_name", &self.routes_by_name.keys().collect::<Vec<_>>())
            .field("root_path", &self.root_path)
            .field("options", &self.options)
            .finish()
    }
}

impl PathMatcher {
    pub fn new(options: RouterOptions) -> Self {
        Self::with_query_parser(options, default_query_parser())
    }

    /// Constructs a matcher with an injected [`SharedQueryParser`] (§1's "query parsers"
    /// external collaborator), for consumers who want a non-standard query-string dialect
    /// (e.g. `;`-delimited pairs, bracketed array syntax).
    pub fn with_query_parser(options: RouterOptions, query_parser: SharedQueryParser) -> Self {
        Self {
            trie: Trie::new(options.case_sensitive),
            routes_by_name: HashMap::new(),
            root_path: None,
            options,
            query_parser,
        }
    }

    pub fn set_root_path(&mut self, root: impl Into<String>) {
        self.root_path = Some(root.into());
    }

    pub fn has_route(&self, name: &str) -> bool {
        self.routes_by_name.contains_key(name)
    }

    pub fn meta_by_name(&self, name: &str) -> Option<Arc<CompiledRoute>> {
        self.routes_by_name.get(name).cloned()
    }

    pub fn segments_by_name(&self, name: &str) -> Option<Vec<PatternSegment>> {
        self.routes_by_name
            .get(name)
            .map(|r| r.match_segments.clone())
    }

    /// Compiles and inserts every route described by `inputs`. Consumed once per `RouteTree`
    /// rebuild (add/remove/update all trigger a fresh call).
    pub fn register_tree(&mut self, inputs: &[RouteInput]) -> Result<(), BuildError> {
        self.trie = Trie::new(self.options.case_sensitive);
        self.routes_by_name.clear();

        for input in inputs {
            let (segments, declared_query_params, constraints, trailing_slash, rooted) =
                parse_pattern(&input.full_pattern)?;

            let mut param_sources = HashMap::new();
            for segment in &segments {
                if let PatternSegment::Param { name, .. } = segment {
                    param_sources.insert(name.clone(), ParamSource::Url);
                } else if let PatternSegment::Splat { name } = segment {
                    param_sources.insert(name.clone(), ParamSource::Url);
                }
            }
            for q in &declared_query_params {
                param_sources.insert(q.clone(), ParamSource::Query);
            }

            let build_plan = build_plan_from_segments(&segments);

            let route = Arc::new(CompiledRoute {
                id: RouteId::new(),
                name: input.name.clone(),
                match_segments: segments,
                build_plan,
                param_sources,
                constraints,
                declared_query_params,
                trailing_slash,
                rooted,
            });

            self.routes_by_name.insert(input.name.clone(), route.clone());
            self.trie.insert(route);
        }

        Ok(())
    }

    /// Prepares a raw URL path per the matcher's path-preparation rules (§4.1), returning the
    /// clean/normalized path plus an optional query string. `None` means the path is malformed
    /// and cannot be matched.
    fn prepare_path<'a>(&self, raw: &'a str) -> Option<(String, Option<&'a str>)> {
        let raw = if raw.is_empty() { "/" } else { raw };
        let without_fragment = raw.split('#').next().unwrap_or(raw);

        if without_fragment.chars().any(|c| (c as u32) >= 0x80) {
            return None;
        }

        if !without_fragment.starts_with('/') {
            return None;
        }

        let without_root = if let Some(root) = &self.root_path {
            let stripped = without_fragment.strip_prefix(root.as_str())?;
            if stripped.is_empty() {
                "/"
            } else if stripped.starts_with('/') {
                stripped
            } else {
                return None;
            }
        } else {
            without_fragment
        };

        let (path_part, query_part) = match without_root.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (without_root, None),
        };

        if path_part.contains("//") {
            return None;
        }

        Some((path_part.to_string(), query_part))
    }

    /// Matches a raw URL path against the compiled routes, returning the resolved route name,
    /// merged (percent-decoded) params, and canonical path.
    pub fn match_path(&self, raw_path: &str) -> Option<MatchOutcome> {
        let (path_part, query_part) = self.prepare_path(raw_path)?;
        let parsed = ParsedPath::parse(&path_part);
        let segments = parsed.segments.clone();
        let (route, captures) = self.trie.match_segments(&parsed.normalized, &segments)?;

        if self.options.trailing_slash == TrailingSlashMode::Strict
            && parsed.trailing_slash != route.trailing_slash
        {
            return None;
        }

        let mut params: Params = Params::new();
        for capture in &captures {
            let decoded = percent_decode(&capture.raw_value).ok()?;
            if let Some(constraint) = route.constraints.get(&capture.name) {
                if !constraint.is_match(&decoded) {
                    return None;
                }
            }
            params.insert(capture.name.clone(), Value::String(decoded));
        }

        if let Some(query) = query_part {
            let query_params = self.query_parser.parse(query).ok()?;
            let reject_undeclared =
                self.options.strict_query_params || self.options.query_params_mode == QueryParamsMode::Strict;
            if reject_undeclared {
                for key in query_params.keys() {
                    if !route.declared_query_params.contains(key) {
                        return None;
                    }
                }
            }
            query_params.merge_into(&mut params);
        }

        let path = if self.options.rewrite_path_on_match {
            self.build_path_internal(&route.name, &params, None).ok()?
        } else {
            parsed.clean_path.clone()
        };

        Some(MatchOutcome {
            name: route.name.clone(),
            params,
            path,
        })
    }

    /// Builds a URL for a named route, given its parameters.
    pub fn build_path(
        &self,
        name: &str,
        params: &Params,
        trailing_slash_override: Option<bool>,
    ) -> Result<String, BuildError> {
        self.build_path_internal(name, params, trailing_slash_override)
    }

    fn build_path_internal(
        &self,
        name: &str,
        params: &Params,
        trailing_slash_override: Option<bool>,
    ) -> Result<String, BuildError> {
        let route = self
            .routes_by_name
            .get(name)
            .ok_or_else(|| BuildError::UnknownRoute(name.to_string()))?;

        for (param, value) in params {
            if let Some(constraint) = route.constraints.get(param) {
                let text = value_to_build_string(param, value)?;
                if !constraint.is_match(&text) {
                    return Err(BuildError::ConstraintViolation {
                        param: param.clone(),
                        value: text,
                    });
                }
            }
        }

        let mut out = String::new();
        let plan = &route.build_plan;

        for (i, static_part) in plan.static_parts.iter().enumerate() {
            if !static_part.is_empty() {
                out.push('/');
                out.push_str(static_part);
            }

            if let Some(slot) = plan.param_slots.get(i) {
                match params.get(&slot.param_name) {
                    Some(value) => {
                        let text = value_to_build_string(&slot.param_name, value)?;
                        out.push('/');
                        if slot.is_splat {
                            out.push_str(&percent_encode_splat(&text, self.options.url_params_encoding));
                        } else {
                            out.push_str(&percent_encode(&text, self.options.url_params_encoding));
                        }
                    }
                    None if slot.is_optional => {
                        // Omit; any following static parts attach to the previous segment boundary.
                    }
                    None => return Err(BuildError::MissingParam(slot.param_name.clone())),
                }
            }
        }

        if out.is_empty() {
            out.push('/');
        }

        let trailing_slash = trailing_slash_override.unwrap_or(match self.options.trailing_slash {
            TrailingSlashMode::Always => true,
            TrailingSlashMode::Never => false,
            TrailingSlashMode::Default | TrailingSlashMode::Strict => route.trailing_slash,
        });
        if trailing_slash && !out.ends_with('/') {
            out.push('/');
        }

        if let Some(root) = &self.root_path {
            out = format!("{root}{out}");
        }

        let mut query_pairs: Vec<(String, String)> = Vec::new();
        for key in &route.declared_query_params {
            if let Some(value) = params.get(key) {
                let text = value_to_build_string(key, value)?;
                query_pairs.push((key.clone(), text));
            }
        }

        if self.options.query_params_mode == QueryParamsMode::Loose {
            let url_param_names: HashSet<&str> = plan
                .param_slots
                .iter()
                .map(|slot| slot.param_name.as_str())
                .collect();
            for (key, value) in params {
                if route.declared_query_params.contains(key) || url_param_names.contains(key.as_str()) {
                    continue;
                }
                query_pairs.push((key.clone(), value_to_build_string(key, value)?));
            }
        }

        query_pairs.sort();

        if !query_pairs.is_empty() {
            let query = query_pairs
                .into_iter()
                .map(|(k, v)| {
                    format!(
                        "{}={}",
                        percent_encode(&k, EncodingStrategy::UriComponent),
                        percent_encode(&v, EncodingStrategy::UriComponent)
                    )
                })
                .collect::<Vec<_>>()
                .join("&");
            out.push('?');
            out.push_str(&query);
        }

        Ok(out)
    }

    pub fn route_names(&self) -> HashSet<String> {
        self.routes_by_name.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(routes: &[(&str, &str)]) -> PathMatcher {
        let mut matcher = PathMatcher::new(RouterOptions::default());
        let inputs: Vec<RouteInput> = routes
            .iter()
            .map(|(name, pattern)| RouteInput {
                name: name.to_string(),
                full_pattern: pattern.to_string(),
            })
            .collect();
        matcher.register_tree(&inputs).unwrap();
        matcher
    }

    #[test]
    fn matches_a_static_route() {
        let m = matcher(&[("home", "/")]);
        let outcome = m.match_path("/").unwrap();
        assert_eq!(outcome.name, "home");
    }

    #[test]
    fn matches_and_decodes_a_param_with_query() {
        let m = matcher(&[("users.detail", "/users/:id?tab")]);
        let outcome = m.match_path("/users/john%20doe?tab=info").unwrap();
        assert_eq!(outcome.name, "users.detail");
        assert_eq!(
            outcome.params.get("id").unwrap(),
            &Value::String("john doe".into())
        );
        assert_eq!(
            outcome.params.get("tab").unwrap(),
            &Value::String("info".into())
        );
    }

    #[test]
    fn constraint_violation_rejects_the_match() {
        let m = matcher(&[("users.detail", "/users/:id<[0-9]+>")]);
        assert!(m.match_path("/users/abc").is_none());
        assert!(m.match_path("/users/42").is_some());
    }

    #[test]
    fn build_path_round_trips_a_param() {
        let m = matcher(&[("users.detail", "/users/:id")]);
        let mut params = Params::new();
        params.insert("id".into(), Value::String("42".into()));
        let path = m.build_path("users.detail", &params, None).unwrap();
        assert_eq!(path, "/users/42");
        let outcome = m.match_path(&path).unwrap();
        assert_eq!(outcome.name, "users.detail");
    }

    #[test]
    fn build_path_fails_for_unknown_route() {
        let m = matcher(&[("home", "/")]);
        assert!(matches!(
            m.build_path("missing", &Params::new(), None),
            Err(BuildError::UnknownRoute(_))
        ));
    }

    #[test]
    fn rejects_double_slash_and_raw_non_ascii() {
        let m = matcher(&[("home", "/")]);
        assert!(m.match_path("/users//42").is_none());
        assert!(m.match_path("/café").is_none());
    }

    #[test]
    fn strict_query_mode_rejects_undeclared_params() {
        let mut matcher = PathMatcher::new(RouterOptions {
            query_params_mode: QueryParamsMode::Strict,
            ..RouterOptions::default()
        });
        matcher
            .register_tree(&[RouteInput {
                name: "home".into(),
                full_pattern: "/?tab".into(),
            }])
            .unwrap();
        assert!(matcher.match_path("/?tab=a").is_some());
        assert!(matcher.match_path("/?other=a").is_none());
    }

    #[test]
    fn loose_query_mode_appends_undeclared_params_not_used_in_the_url() {
        let mut matcher = PathMatcher::new(RouterOptions {
            query_params_mode: QueryParamsMode::Loose,
            ..RouterOptions::default()
        });
        matcher
            .register_tree(&[RouteInput {
                name: "users.detail".into(),
                full_pattern: "/users/:id".into(),
            }])
            .unwrap();

        let mut params = Params::new();
        params.insert("id".into(), Value::String("7".into()));
        params.insert("ref".into(), Value::String("email".into()));
        let path = matcher.build_path("users.detail", &params, None).unwrap();
        assert_eq!(path, "/users/7?ref=email");
    }

    #[test]
    fn trailing_slash_mode_always_applies_to_every_build() {
        let mut matcher = PathMatcher::new(RouterOptions {
            trailing_slash: crate::options::TrailingSlashMode::Always,
            ..RouterOptions::default()
        });
        matcher
            .register_tree(&[RouteInput {
                name: "users".into(),
                full_pattern: "/users".into(),
            }])
            .unwrap();
        assert_eq!(matcher.build_path("users", &Params::new(), None).unwrap(), "/users/");
    }

    #[test]
    fn trailing_slash_mode_never_strips_but_keeps_bare_root() {
        let mut matcher = PathMatcher::new(RouterOptions {
            trailing_slash: crate::options::TrailingSlashMode::Never,
            ..RouterOptions::default()
        });
        matcher
            .register_tree(&[
                RouteInput { name: "home".into(), full_pattern: "/".into() },
                RouteInput { name: "users".into(), full_pattern: "/users/".into() },
            ])
            .unwrap();
        assert_eq!(matcher.build_path("home", &Params::new(), None).unwrap(), "/");
        assert_eq!(matcher.build_path("users", &Params::new(), None).unwrap(), "/users");
    }

    #[test]
    fn per_call_trailing_slash_override_wins_over_the_router_wide_mode() {
        let mut matcher = PathMatcher::new(RouterOptions {
            trailing_slash: crate::options::TrailingSlashMode::Always,
            ..RouterOptions::default()
        });
        matcher
            .register_tree(&[RouteInput { name: "users".into(), full_pattern: "/users".into() }])
            .unwrap();
        assert_eq!(
            matcher.build_path("users", &Params::new(), Some(false)).unwrap(),
            "/users"
        );
    }

    #[test]
    fn strict_query_params_flag_rejects_undeclared_params_independently_of_mode() {
        let mut matcher = PathMatcher::new(RouterOptions {
            strict_query_params: true,
            ..RouterOptions::default()
        });
        matcher
            .register_tree(&[RouteInput {
                name: "home".into(),
                full_pattern: "/?tab".into(),
            }])
            .unwrap();
        assert!(matcher.match_path("/?tab=a").is_some());
        assert!(matcher.match_path("/?other=a").is_none());
    }

    #[test]
    fn an_injected_query_parser_is_used_instead_of_the_default() {
        struct SemicolonParser;
        impl crate::params::QueryParser for SemicolonParser {
            fn parse(&self, query: &str) -> Result<crate::params::QueryParams, crate::params::ParamsError> {
                crate::params::QueryParams::parse(&query.replace(';', "&"))
            }
        }

        let mut matcher =
            PathMatcher::with_query_parser(RouterOptions::default(), std::sync::Arc::new(SemicolonParser));
        matcher
            .register_tree(&[RouteInput {
                name: "home".into(),
                full_pattern: "/?tab&sort".into(),
            }])
            .unwrap();

        let outcome = matcher.match_path("/?tab=info;sort=asc").unwrap();
        assert_eq!(outcome.params.get("tab").unwrap(), &Value::String("info".into()));
        assert_eq!(outcome.params.get("sort").unwrap(), &Value::String("asc".into()));
    }
}
