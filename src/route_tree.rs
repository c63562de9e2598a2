//! Hierarchical named routes, the forwarding graph, and per-route configuration.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::{ForwardError, RouterError};
use crate::guard::NavigationGuard;
use crate::matcher::RouteInput;
use crate::options::MAX_FORWARD_CHAIN;
use crate::params::Params;

/// A `forwardTo` edge target: either another route name, or a function computing one from the
/// current state's name and params at resolve time.
#[derive(Clone)]
pub enum ForwardTarget {
    Static(String),
    Dynamic(Arc<dyn Fn(&str, &Params) -> String + Send + Sync>),
}

impl std::fmt::Debug for ForwardTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForwardTarget::Static(name) => write!(f, "ForwardTarget::Static({name})"),
            ForwardTarget::Dynamic(_) => write!(f, "ForwardTarget::Dynamic(<fn>)"),
        }
    }
}

impl ForwardTarget {
    fn resolve(&self, from: &str, params: &Params) -> String {
        match self {
            ForwardTarget::Static(name) => name.clone(),
            ForwardTarget::Dynamic(f) => f(from, params),
        }
    }
}

/// A route declaration as supplied by a caller building the tree, mirroring the wire-level
/// `Route := {...}` object (§6.1): name, path, children, default params, encode/decode hooks,
/// guards, a forward target, and arbitrary extra config.
pub struct RouteDecl {
    pub name: String,
    pub path: String,
    pub children: Vec<RouteDecl>,
    pub default_params: HashMap<String, Value>,
    pub decode_params: Option<Arc<dyn Fn(&Params) -> Params + Send + Sync>>,
    pub encode_params: Option<Arc<dyn Fn(&Params) -> Params + Send + Sync>>,
    pub can_activate: Vec<Arc<dyn NavigationGuard>>,
    pub can_deactivate: Vec<Arc<dyn NavigationGuard>>,
    pub forward_to: Option<ForwardTarget>,
    pub config: Map<String, Value>,
}

impl RouteDecl {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            children: Vec::new(),
            default_params: HashMap::new(),
            decode_params: None,
            encode_params: None,
            can_activate: Vec::new(),
            can_deactivate: Vec::new(),
            forward_to: None,
            config: Map::new(),
        }
    }

    pub fn child(mut self, child: RouteDecl) -> Self {
        self.children.push(child);
        self
    }

    pub fn default_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.default_params.insert(key.into(), value.into());
        self
    }

    pub fn can_activate(mut self, guard: Arc<dyn NavigationGuard>) -> Self {
        self.can_activate.push(guard);
        self
    }

    pub fn can_deactivate(mut self, guard: Arc<dyn NavigationGuard>) -> Self {
        self.can_deactivate.push(guard);
        self
    }

    /// Attaches an arbitrary, non-standard config key (any key not part of the wire `Route`
    /// shape) — stored opaquely by the route tree and ignored by matching.
    pub fn config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn forward_to(mut self, target: impl Into<String>) -> Self {
        self.forward_to = Some(ForwardTarget::Static(target.into()));
        self
    }

    pub fn forward_to_fn(
        mut self,
        target: impl Fn(&str, &Params) -> String + Send + Sync + 'static,
    ) -> Self {
        self.forward_to = Some(ForwardTarget::Dynamic(Arc::new(target)));
        self
    }

    /// Transforms raw matched params into this route's state params (e.g. string -> typed).
    pub fn decode_params(mut self, f: impl Fn(&Params) -> Params + Send + Sync + 'static) -> Self {
        self.decode_params = Some(Arc::new(f));
        self
    }

    /// The inverse of `decode_params`, applied before building a URL from this route's params.
    pub fn encode_params(mut self, f: impl Fn(&Params) -> Params + Send + Sync + 'static) -> Self {
        self.encode_params = Some(Arc::new(f));
        self
    }
}

/// One compiled node of the route tree: a flat, name-indexed record (never a real parent/child
/// pointer graph, so cyclic or repeated registration can't create dangling references).
#[derive(Clone)]
pub struct RouteNode {
    pub full_name: String,
    pub own_pattern: String,
    pub parent: Option<String>,
    pub children: Vec<String>,
    pub default_params: HashMap<String, Value>,
    pub decode_params: Option<Arc<dyn Fn(&Params) -> Params + Send + Sync>>,
    pub encode_params: Option<Arc<dyn Fn(&Params) -> Params + Send + Sync>>,
    pub can_activate: Vec<Arc<dyn NavigationGuard>>,
    pub can_deactivate: Vec<Arc<dyn NavigationGuard>>,
    pub forward_to: Option<ForwardTarget>,
    pub config: Map<String, Value>,
}

impl std::fmt::Debug for RouteNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteNode")
            .field("full_name", &self.full_name)
            .field("own_pattern", &self.own_pattern)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("forward_to", &self.forward_to)
            .finish()
    }
}

/// Partial, field-by-field update applied atomically by [`RouteTree::update`].
#[derive(Default)]
pub struct RouteUpdate {
    pub path: Option<String>,
    pub default_params: Option<HashMap<String, Value>>,
    pub can_activate: Option<Vec<Arc<dyn NavigationGuard>>>,
    pub can_deactivate: Option<Vec<Arc<dyn NavigationGuard>>>,
    pub forward_to: Option<Option<ForwardTarget>>,
    pub config: Option<Map<String, Value>>,
}

/// The hierarchical, dotted-name route tree: named routes, their forwarding graph, and their
/// per-route configuration. Mutation methods are "navigation-safe": they log a diagnostic (never
/// panic or fail) when called while a transition is in flight, and still apply.
#[derive(Debug, Clone, Default)]
pub struct RouteTree {
    nodes: HashMap<String, RouteNode>,
    root_names: Vec<String>,
}

impl RouteTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, name: &str) -> Option<&RouteNode> {
        self.nodes.get(name)
    }

    pub fn route_config(&self, name: &str) -> Option<&Map<String, Value>> {
        self.nodes.get(name).map(|n| &n.config)
    }

    pub fn has_route(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Inserts `decl` (and its subtree) under `parent` (`None` for a root route). Fails without
    /// mutating anything if any name in the subtree already exists, or `parent` is missing.
    pub fn add(&mut self, decl: RouteDecl, parent: Option<&str>) -> Result<(), RouterError> {
        if let Some(parent) = parent {
            if !self.nodes.contains_key(parent) {
                return Err(RouterError::RouteNotFound(parent.to_string()));
            }
        }

        let mut staged = HashMap::new();
        let mut staged_root_names = Vec::new();
        self.stage_subtree(&decl, parent, &mut staged, &mut staged_root_names)?;

        // Validated — commit atomically.
        if let Some(parent) = parent {
            self.nodes
                .get_mut(parent)
                .expect("checked above")
                .children
                .push(decl.name.clone());
        } else {
            self.root_names.push(staged_root_names[0].clone());
        }
        for (name, node) in staged {
            self.nodes.insert(name, node);
        }

        Ok(())
    }

    fn stage_subtree(
        &self,
        decl: &RouteDecl,
        parent: Option<&str>,
        staged: &mut HashMap<String, RouteNode>,
        staged_root_names: &mut Vec<String>,
    ) -> Result<String, RouterError> {
        if decl.name.is_empty()
            || !decl
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(RouterError::ValidationError(format!(
                "route name segment '{}' must match [A-Za-z0-9_-]+",
                decl.name
            )));
        }

        let full_name = match parent {
            Some(p) => format!("{p}.{}", decl.name),
            None => decl.name.clone(),
        };

        if self.nodes.contains_key(&full_name) || staged.contains_key(&full_name) {
            return Err(RouterError::ValidationError(format!(
                "route '{full_name}' already exists"
            )));
        }

        let mut children = Vec::new();
        for child in &decl.children {
            children.push(self.stage_subtree(child, Some(&full_name), staged, staged_root_names)?);
        }

        staged.insert(
            full_name.clone(),
            RouteNode {
                full_name: full_name.clone(),
                own_pattern: decl.path.clone(),
                parent: parent.map(String::from),
                children,
                default_params: decl.default_params.clone(),
                decode_params: decl.decode_params.clone(),
                encode_params: decl.encode_params.clone(),
                can_activate: decl.can_activate.clone(),
                can_deactivate: decl.can_deactivate.clone(),
                forward_to: decl.forward_to.clone(),
                config: decl.config.clone(),
            },
        );

        if parent.is_none() {
            staged_root_names.push(full_name.clone());
        }

        Ok(full_name)
    }

    /// Removes `name` and its whole subtree, purging config/guards/forwards with it.
    pub fn remove(&mut self, name: &str, transition_in_flight: bool) -> Result<(), RouterError> {
        if !self.nodes.contains_key(name) {
            return Err(RouterError::RouteNotFound(name.to_string()));
        }

        if transition_in_flight {
            tracing::warn!(route = name, "removing a route while a transition is in flight");
        }

        let mut to_remove = vec![name.to_string()];
        let mut frontier = vec![name.to_string()];
        while let Some(current) = frontier.pop() {
            if let Some(node) = self.nodes.get(&current) {
                for child in &node.children {
                    to_remove.push(child.clone());
                    frontier.push(child.clone());
                }
            }
        }

        if let Some(node) = self.nodes.get(name) {
            if let Some(parent) = node.parent.clone() {
                if let Some(parent_node) = self.nodes.get_mut(&parent) {
                    parent_node.children.retain(|c| c != name);
                }
            } else {
                self.root_names.retain(|r| r != name);
            }
        }

        for n in to_remove {
            self.nodes.remove(&n);
        }

        Ok(())
    }

    /// Drops every declared route, config entry, and forward edge, returning the tree to its
    /// just-constructed state. Navigation-safe like `update`/`remove`: logs rather than fails
    /// when called while a transition is in flight.
    pub fn clear_routes(&mut self, transition_in_flight: bool) {
        if transition_in_flight {
            tracing::warn!("clearing all routes while a transition is in flight");
        }
        self.nodes.clear();
        self.root_names.clear();
    }

    /// Applies a partial update atomically: every field is validated before any state mutates.
    pub fn update(
        &mut self,
        name: &str,
        update: RouteUpdate,
        transition_in_flight: bool,
    ) -> Result<(), RouterError> {
        if !self.nodes.contains_key(name) {
            return Err(RouterError::RouteNotFound(name.to_string()));
        }

        if transition_in_flight {
            tracing::warn!(route = name, "updating a route while a transition is in flight");
        }

        // Validation pass: nothing here mutates `self`.
        if let Some(path) = update.path.as_ref() {
            crate::matcher::parse_pattern(path)
                .map_err(|e| RouterError::ValidationError(e.to_string()))?;
        }
        if let Some(ForwardTarget::Static(target)) = update.forward_to.as_ref().and_then(|f| f.as_ref()) {
            self.validate_forward_edge(name, target)?;
            self.validate_forward_param_subset(name, target)?;
        }

        let node = self.nodes.get_mut(name).expect("checked above");
        if let Some(path) = update.path {
            node.own_pattern = path;
        }
        if let Some(defaults) = update.default_params {
            node.default_params = defaults;
        }
        if let Some(can_activate) = update.can_activate {
            node.can_activate = can_activate;
        }
        if let Some(can_deactivate) = update.can_deactivate {
            node.can_deactivate = can_deactivate;
        }
        if let Some(forward_to) = update.forward_to {
            node.forward_to = forward_to;
        }
        if let Some(config) = update.config {
            node.config = config;
        }

        Ok(())
    }

    /// Builds the matcher-facing list of `(name, full_pattern)` pairs for every route, walking
    /// each route's ancestor chain (stopping early at a `~`-rooted pattern).
    pub fn to_match_inputs(&self) -> Vec<RouteInput> {
        self.nodes
            .keys()
            .map(|name| RouteInput {
                name: name.clone(),
                full_pattern: self.full_pattern_for(name),
            })
            .collect()
    }

    fn full_pattern_for(&self, name: &str) -> String {
        let mut chain = Vec::new();
        let mut current = Some(name.to_string());
        while let Some(n) = current {
            let node = match self.nodes.get(&n) {
                Some(node) => node,
                None => break,
            };
            let rooted = node.own_pattern.starts_with('~');
            chain.push(node.own_pattern.clone());
            if rooted {
                break;
            }
            current = node.parent.clone();
        }
        chain.reverse();

        let mut path_acc = String::new();
        let mut queries = Vec::new();
        for raw in chain {
            let raw = raw.strip_prefix('~').unwrap_or(&raw).to_string();
            let (path_part, query_part) = match raw.split_once('?') {
                Some((p, q)) => (p.to_string(), Some(q.to_string())),
                None => (raw, None),
            };
            if let Some(q) = query_part {
                queries.push(q);
            }
            let trimmed = path_part.trim_end_matches('/');
            if !trimmed.is_empty() {
                path_acc.push_str(trimmed);
            }
        }
        if path_acc.is_empty() {
            path_acc.push('/');
        }
        if !queries.is_empty() {
            path_acc.push('?');
            path_acc.push_str(&queries.join("&"));
        }
        path_acc
    }

    /// Walks the forward graph from `name` to its terminal target, rejecting cycles and chains
    /// longer than [`MAX_FORWARD_CHAIN`]. Function edges are invoked with `params` at resolve
    /// time. Returns `name` itself if it has no forward edge.
    pub fn resolve_forward(&self, name: &str, params: &Params) -> Result<String, RouterError> {
        let mut current = name.to_string();
        let mut visited = std::collections::HashSet::new();
        visited.insert(current.clone());

        for _ in 0..MAX_FORWARD_CHAIN {
            let node = self
                .nodes
                .get(&current)
                .ok_or_else(|| RouterError::RouteNotFound(current.clone()))?;

            let Some(forward) = &node.forward_to else {
                return Ok(current);
            };

            let next = forward.resolve(&current, params);

            if !self.nodes.contains_key(&next) {
                return Err(RouterError::InvalidForwardTo(ForwardError::UnknownTarget(next)));
            }

            if !visited.insert(next.clone()) {
                return Err(RouterError::InvalidForwardTo(ForwardError::Cycle {
                    from: current,
                    to: next,
                }));
            }

            current = next;
        }

        Err(RouterError::InvalidForwardTo(ForwardError::ChainTooLong(
            name.to_string(),
            MAX_FORWARD_CHAIN,
        )))
    }

    /// Validates that declaring `forward_to` from `name` to `target` would not create a cycle
    /// and would not exceed the chain bound, without mutating the tree.
    pub fn validate_forward_edge(&self, name: &str, target: &str) -> Result<(), RouterError> {
        if !self.nodes.contains_key(target) {
            return Err(RouterError::InvalidForwardTo(ForwardError::UnknownTarget(
                target.to_string(),
            )));
        }

        let mut current = target.to_string();
        let mut visited = std::collections::HashSet::new();
        visited.insert(name.to_string());

        for _ in 0..MAX_FORWARD_CHAIN {
            if current == name {
                return Err(RouterError::InvalidForwardTo(ForwardError::Cycle {
                    from: name.to_string(),
                    to: target.to_string(),
                }));
            }
            if !visited.insert(current.clone()) {
                return Ok(());
            }
            let Some(node) = self.nodes.get(&current) else {
                return Ok(());
            };
            match &node.forward_to {
                Some(ForwardTarget::Static(next)) => current = next.clone(),
                _ => return Ok(()),
            }
        }

        Err(RouterError::InvalidForwardTo(ForwardError::ChainTooLong(
            name.to_string(),
            MAX_FORWARD_CHAIN,
        )))
    }

    /// The declared query-parameter set for `name`'s ancestor-concatenated pattern (the keys
    /// `StateBuilder::are_states_equal` excludes from its same-state comparison).
    pub fn declared_query_params(&self, name: &str) -> std::collections::HashSet<String> {
        let pattern = self.full_pattern_for(name);
        crate::matcher::parse_pattern(&pattern)
            .map(|(_, query, ..)| query)
            .unwrap_or_default()
    }

    /// All URL (non-query) parameter names appearing anywhere in `name`'s ancestor-concatenated
    /// pattern, required or optional.
    fn url_params(&self, name: &str) -> std::collections::HashSet<String> {
        let pattern = self.full_pattern_for(name);
        let (segments, ..) = crate::matcher::parse_pattern(&pattern).unwrap_or_default();
        segments
            .into_iter()
            .filter_map(|s| match s {
                crate::matcher::PatternSegment::Param { name, .. } => Some(name),
                crate::matcher::PatternSegment::Splat { name } => Some(name),
                crate::matcher::PatternSegment::Static(_) => None,
            })
            .collect()
    }

    /// Just the non-optional URL params of `name`'s ancestor-concatenated pattern — a splat is
    /// always required, a `:name?` is not.
    fn required_url_params(&self, name: &str) -> std::collections::HashSet<String> {
        let pattern = self.full_pattern_for(name);
        let (segments, ..) = crate::matcher::parse_pattern(&pattern).unwrap_or_default();
        segments
            .into_iter()
            .filter_map(|s| match s {
                crate::matcher::PatternSegment::Param { name, optional: false } => Some(name),
                crate::matcher::PatternSegment::Splat { name } => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Validates that `target`'s required URL params are a subset of `name`'s own URL params
    /// union its declared default params' keys.
    fn validate_forward_param_subset(&self, name: &str, target: &str) -> Result<(), RouterError> {
        let mut available = self.url_params(name);
        if let Some(node) = self.nodes.get(name) {
            available.extend(node.default_params.keys().cloned());
        }

        for param in self.required_url_params(target) {
            if !available.contains(&param) {
                return Err(RouterError::InvalidForwardTo(ForwardError::ParamNotSubset {
                    source: name.to_string(),
                    target: target.to_string(),
                    param,
                }));
            }
        }

        Ok(())
    }
}
