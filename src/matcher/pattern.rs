//! The path-pattern grammar: parsing a route's declared pattern string into matchable segments
//! and a pre-compiled build plan.

use std::collections::{HashMap, HashSet};

use regex::Regex;
use uuid::Uuid;

use crate::error::BuildError;

/// Unique id assigned to each compiled route, mirroring the teacher's `RouteId(Uuid)` newtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct RouteId(pub Uuid);

impl RouteId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RouteId {
    fn default() -> Self {
        Self::new()
    }
}

/// One segment of a compiled path pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum PatternSegment {
    /// A literal segment, matched verbatim (case-folded if the matcher is case-insensitive).
    Static(String),
    /// A named URL parameter, e.g. `:id`.
    Param { name: String, optional: bool },
    /// A splat segment capturing the rest of the path, e.g. `*rest`.
    Splat { name: String },
}

/// Which side of the URL a parameter was captured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamSource {
    Url,
    Query,
}

/// One slot of a [`BuildPlan`]: the parameter to interpolate between two static parts.
#[derive(Debug, Clone)]
pub struct BuildSlot {
    pub param_name: String,
    pub is_optional: bool,
    pub is_splat: bool,
}

/// A pre-compiled recipe for building a URL from a route's declared pattern: alternating static
/// text and parameter slots. Invariant: `static_parts.len() == param_slots.len() + 1`.
#[derive(Debug, Clone)]
pub struct BuildPlan {
    pub static_parts: Vec<String>,
    pub param_slots: Vec<BuildSlot>,
}

/// An immutable, fully compiled route: everything the matcher and builder need, derived once
/// from a route's declared pattern (concatenated with its ancestors').
#[derive(Debug, Clone)]
pub struct CompiledRoute {
    pub id: RouteId,
    pub name: String,
    /// Full ancestor-concatenated segment chain used for trie insertion/matching.
    pub match_segments: Vec<PatternSegment>,
    /// Same chain minus a trailing slash-child segment, used for `build_path`.
    pub build_plan: BuildPlan,
    pub param_sources: HashMap<String, ParamSource>,
    pub constraints: HashMap<String, Regex>,
    pub declared_query_params: HashSet<String>,
    pub trailing_slash: bool,
    pub rooted: bool,
}

impl CompiledRoute {
    /// True if every segment of this route's pattern is a literal (no param/splat), making it
    /// eligible for the matcher's static-path cache.
    pub fn is_fully_static(&self) -> bool {
        self.match_segments
            .iter()
            .all(|s| matches!(s, PatternSegment::Static(_)))
    }
}

/// Parses one route's own (not ancestor-concatenated) pattern string into segments, its declared
/// query-parameter set, whether it ends in a trailing slash, and whether it is rooted (`~`
/// prefix, ignoring ancestors).
pub fn parse_pattern(
    pattern: &str,
) -> Result<(Vec<PatternSegment>, HashSet<String>, HashMap<String, Regex>, bool, bool), BuildError> {
    let mut pattern = pattern;
    let rooted = if let Some(stripped) = pattern.strip_prefix('~') {
        pattern = stripped;
        true
    } else {
        false
    };

    let (path_part, query_part) = match pattern.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (pattern, None),
    };

    let trailing_slash = path_part.len() > 1 && path_part.ends_with('/');

    let mut segments = Vec::new();
    let mut constraints = HashMap::new();
    let raw_segments: Vec<&str> = path_part.split('/').filter(|s| !s.is_empty()).collect();
    let last_index = raw_segments.len().checked_sub(1);

    for (i, raw) in raw_segments.iter().enumerate() {
        if let Some(name) = raw.strip_prefix('*') {
            if i != last_index.unwrap_or(0) {
                return Err(BuildError::InvalidPattern(format!(
                    "splat segment '*{name}' must be the last segment in '{pattern}'"
                )));
            }
            validate_name(name, pattern)?;
            segments.push(PatternSegment::Splat {
                name: name.to_string(),
            });
            continue;
        }

        if let Some(rest) = raw.strip_prefix(':') {
            let (name_and_constraint, optional) = match rest.strip_suffix('?') {
                Some(stripped) => (stripped, true),
                None => (rest, false),
            };

            if optional && Some(i) != last_index {
                return Err(BuildError::InvalidPattern(format!(
                    "optional parameter ':{name_and_constraint}?' must be the last segment in '{pattern}'"
                )));
            }

            let (name, constraint_src) = match name_and_constraint.split_once('<') {
                Some((n, c)) => {
                    let c = c.strip_suffix('>').ok_or_else(|| {
                        BuildError::InvalidPattern(format!(
                            "unterminated constraint on parameter '{n}' in '{pattern}'"
                        ))
                    })?;
                    (n, Some(c))
                }
                None => (name_and_constraint, None),
            };

            validate_name(name, pattern)?;

            if let Some(src) = constraint_src {
                let re = Regex::new(src).map_err(|e| {
                    BuildError::InvalidPattern(format!(
                        "invalid constraint '<{src}>' on parameter '{name}': {e}"
                    ))
                })?;
                constraints.insert(name.to_string(), re);
            }

            segments.push(PatternSegment::Param {
                name: name.to_string(),
                optional,
            });
            continue;
        }

        segments.push(PatternSegment::Static(raw.to_string()));
    }

    let declared_query_params: HashSet<String> = query_part
        .map(|q| {
            q.split('&')
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default();

    Ok((segments, declared_query_params, constraints, trailing_slash, rooted))
}

fn validate_name(name: &str, pattern: &str) -> Result<(), BuildError> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(BuildError::InvalidPattern(format!(
            "invalid parameter name '{name}' in pattern '{pattern}'"
        )));
    }
    Ok(())
}

/// Builds the pre-compiled [`BuildPlan`] for a segment chain, dropping a trailing empty
/// slash-child segment (a route whose own path is empty, attached via `slash_child_route`).
pub fn build_plan_from_segments(segments: &[PatternSegment]) -> BuildPlan {
    let mut static_parts = vec![String::new()];
    let mut param_slots = Vec::new();

    for segment in segments {
        match segment {
            PatternSegment::Static(s) => {
                let last = static_parts.last_mut().unwrap();
                if !last.is_empty() {
                    last.push('/');
                }
                last.push_str(s);
            }
            PatternSegment::Param { name, optional } => {
                param_slots.push(BuildSlot {
                    param_name: name.clone(),
                    is_optional: *optional,
                    is_splat: false,
                });
                static_parts.push(String::new());
            }
            PatternSegment::Splat { name } => {
                param_slots.push(BuildSlot {
                    param_name: name.clone(),
                    is_optional: false,
                    is_splat: true,
                });
                static_parts.push(String::new());
            }
        }
    }

    BuildPlan {
        static_parts,
        param_slots,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_static_segments() {
        let (segs, query, _, trailing, rooted) = parse_pattern("/users/list").unwrap();
        assert_eq!(
            segs,
            vec![
                PatternSegment::Static("users".into()),
                PatternSegment::Static("list".into())
            ]
        );
        assert!(query.is_empty());
        assert!(!trailing);
        assert!(!rooted);
    }

    #[test]
    fn parses_param_and_optional_param() {
        let (segs, ..) = parse_pattern("/users/:id/:tab?").unwrap();
        assert_eq!(
            segs,
            vec![
                PatternSegment::Static("users".into()),
                PatternSegment::Param {
                    name: "id".into(),
                    optional: false
                },
                PatternSegment::Param {
                    name: "tab".into(),
                    optional: true
                },
            ]
        );
    }

    #[test]
    fn rejects_optional_param_not_last() {
        assert!(parse_pattern("/users/:id?/edit").is_err());
    }

    #[test]
    fn parses_splat_and_rejects_non_trailing_splat() {
        let (segs, ..) = parse_pattern("/files/*path").unwrap();
        assert_eq!(
            segs,
            vec![
                PatternSegment::Static("files".into()),
                PatternSegment::Splat { name: "path".into() },
            ]
        );
        assert!(parse_pattern("/files/*path/edit").is_err());
    }

    #[test]
    fn parses_constraint_and_query_and_rooted() {
        let (segs, query, constraints, _, rooted) =
            parse_pattern("~/users/:id<[0-9]+>?page&sort").unwrap();
        assert!(rooted);
        assert!(query.contains("page"));
        assert!(query.contains("sort"));
        assert!(constraints.contains_key("id"));
        assert!(matches!(&segs[1], PatternSegment::Param { name, .. } if name == "id"));
    }

    #[test]
    fn trailing_slash_is_detected() {
        let (_, _, _, trailing, _) = parse_pattern("/users/").unwrap();
        assert!(trailing);
        let (_, _, _, trailing_root, _) = parse_pattern("/").unwrap();
        assert!(!trailing_root);
    }

    #[test]
    fn build_plan_alternates_static_and_slots() {
        let (segs, ..) = parse_pattern("/users/:id/orders/:orderId").unwrap();
        let plan = build_plan_from_segments(&segs);
        assert_eq!(plan.static_parts.len(), plan.param_slots.len() + 1);
        assert_eq!(plan.static_parts[0], "users");
        assert_eq!(plan.static_parts[1], "orders");
    }
}
