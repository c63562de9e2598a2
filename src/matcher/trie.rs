//! The segment trie: static / parameter / splat children, plus the slash-child special case.
//!
//! Grounded on a straightforward prefix-trie router (static children keyed by segment, at most
//! one param child, at most one splat child, backtracking depth-first match), generalized here to
//! attach a `slashChildRoute` when a child's own pattern contributes no segments.

use std::collections::HashMap;
use std::sync::Arc;

use super::pattern::{CompiledRoute, PatternSegment};

#[derive(Debug, Default)]
pub struct TrieNode {
    static_children: HashMap<String, TrieNode>,
    param_child: Option<Box<ParamEdge>>,
    splat_child: Option<Box<SplatEdge>>,
    route: Option<Arc<CompiledRoute>>,
    slash_child_route: Option<Arc<CompiledRoute>>,
}

#[derive(Debug)]
struct ParamEdge {
    name: String,
    node: TrieNode,
}

#[derive(Debug)]
struct SplatEdge {
    name: String,
    node: TrieNode,
}

/// A single captured parameter during a match walk.
#[derive(Debug, Clone)]
pub struct Capture {
    pub name: String,
    pub raw_value: String,
}

/// The trie root plus the static-path fast-path cache.
#[derive(Debug, Default)]
pub struct Trie {
    root: TrieNode,
    static_cache: HashMap<String, Arc<CompiledRoute>>,
    case_sensitive: bool,
}

impl Trie {
    pub fn new(case_sensitive: bool) -> Self {
        Self {
            root: TrieNode::default(),
            static_cache: HashMap::new(),
            case_sensitive,
        }
    }

    fn fold(&self, segment: &str) -> String {
        if self.case_sensitive {
            segment.to_string()
        } else {
            segment.to_lowercase()
        }
    }

    /// Inserts a compiled route. A second route landing on an already-terminal node becomes that
    /// node's `slash_child_route` (the slash-child case: its own pattern contributed zero
    /// segments, so it shares its parent's trie position).
    pub fn insert(&mut self, route: Arc<CompiledRoute>) {
        let case_sensitive = self.case_sensitive;
        let mut node = &mut self.root;

        for segment in &route.match_segments {
            node = match segment {
                PatternSegment::Static(s) => {
                    let key = if case_sensitive { s.clone() } else { s.to_lowercase() };
                    node.static_children.entry(key).or_default()
                }
                PatternSegment::Param { name, .. } => {
                    if node.param_child.is_none() {
                        node.param_child = Some(Box::new(ParamEdge {
                            name: name.clone(),
                            node: TrieNode::default(),
                        }));
                    }
                    &mut node.param_child.as_mut().unwrap().node
                }
                PatternSegment::Splat { name } => {
                    if node.splat_child.is_none() {
                        node.splat_child = Some(Box::new(SplatEdge {
                            name: name.clone(),
                            node: TrieNode::default(),
                        }));
                    }
                    &mut node.splat_child.as_mut().unwrap().node
                }
            };
        }

        if node.route.is_none() {
            node.route = Some(route.clone());
        } else {
            node.slash_child_route = Some(route.clone());
        }

        if route.is_fully_static() {
            let normalized = route
                .match_segments
                .iter()
                .map(|s| match s {
                    PatternSegment::Static(s) => self.fold(s),
                    _ => unreachable!("is_fully_static guarantees only Static segments"),
                })
                .collect::<Vec<_>>()
                .join("/");
            self.static_cache.insert(format!("/{normalized}"), route);
        }
    }

    /// Resolves `path` (already split into non-empty segments) to a compiled route and its raw
    /// (not yet percent-decoded) captured parameter values.
    pub fn match_segments(&self, normalized_path: &str, segments: &[String]) -> Option<(Arc<CompiledRoute>, Vec<Capture>)> {
        let cache_key = if self.case_sensitive {
            normalized_path.to_string()
        } else {
            normalized_path.to_lowercase()
        };
        if let Some(route) = self.static_cache.get(&cache_key) {
            return Some((route.clone(), Vec::new()));
        }

        let mut captures = Vec::new();
        let route = self.walk(&self.root, segments, &mut captures)?;
        Some((route, captures))
    }

    fn walk(
        &self,
        node: &TrieNode,
        segments: &[String],
        captures: &mut Vec<Capture>,
    ) -> Option<Arc<CompiledRoute>> {
        if segments.is_empty() {
            return node
                .slash_child_route
                .clone()
                .or_else(|| node.route.clone());
        }

        let segment = &segments[0];
        let rest = &segments[1..];
        let key = self.fold(segment);

        if let Some(child) = node.static_children.get(&key) {
            if let Some(found) = self.walk(child, rest, captures) {
                return Some(found);
            }
        }

        if let Some(param) = &node.param_child {
            let mark = captures.len();
            captures.push(Capture {
                name: param.name.clone(),
                raw_value: segment.clone(),
            });
            if let Some(found) = self.walk(&param.node, rest, captures) {
                return Some(found);
            }
            captures.truncate(mark);
        }

        if let Some(splat) = &node.splat_child {
            // A splat subtree may itself branch further (e.g. a static route nested past the
            // splat's capture); try the shortest capture first so a more specific continuation
            // wins, falling back to the greedy full-tail capture last.
            let mark = captures.len();
            for k in 1..=segments.len() {
                captures.push(Capture {
                    name: splat.name.clone(),
                    raw_value: segments[..k].join("/"),
                });
                if let Some(found) = self.walk(&splat.node, &segments[k..], captures) {
                    return Some(found);
                }
                captures.truncate(mark);
            }
        }

        None
    }
}
