//! Navigation state: the value a route resolves to, and its construction.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::clock::SharedIdClock;
use crate::params::Params;

/// Navigation options recognized by the router, as carried on [`Meta::options`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NavigationOptions {
    /// Replace the current history entry instead of pushing a new one (a hint to external
    /// history bindings; the core never interprets it itself).
    #[serde(default)]
    pub replace: bool,
    /// Skip the same-state check and guard/middleware pipeline is still run, but a same-state
    /// navigation is no longer rejected with `SameStates`.
    #[serde(default)]
    pub force: bool,
    /// Re-run activate guards/middleware for the segments shared with the current state too.
    #[serde(default)]
    pub reload: bool,
    /// Commit the new state without running the guard/middleware pipeline at all.
    #[serde(default)]
    pub skip_transition: bool,
}

/// Per-transition metadata carried alongside a [`State`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Meta {
    /// Monotonically non-decreasing id assigned when this state was built; used to detect
    /// supersession of in-flight navigation records.
    pub id: u64,
    /// The params exactly as supplied by the caller, before default-merge.
    pub params: Params,
    /// The navigation options in effect when this state was built.
    pub options: NavigationOptions,
    /// Set when this state is the result of resolving a `forwardTo` edge; names the original
    /// requested route.
    pub redirected: Option<String>,
}

/// A resolved navigation target: a named route plus its merged parameters and canonical path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct State {
    /// Fully-qualified dotted route name.
    pub name: String,
    /// The merged parameter map (URL params + query params + defaults).
    pub params: Params,
    /// The canonical path this state was built from or matched against.
    pub path: String,
    pub meta: Option<Meta>,
}

impl State {
    pub fn new(name: impl Into<String>, params: Params, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params,
            path: path.into(),
            meta: None,
        }
    }

    pub fn meta_id(&self) -> Option<u64> {
        self.meta.as_ref().map(|m| m.id)
    }
}

/// The set of routes to deactivate/activate when transitioning between two states, computed by
/// diffing their dotted-name segment chains.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationPlan {
    /// Route names to deactivate, innermost (most specific) first.
    pub to_deactivate: Vec<String>,
    /// Route names to activate, outermost (least specific) first.
    pub to_activate: Vec<String>,
    /// Route names common to both chains (neither activated nor deactivated, unless `reload`).
    pub intersection: Vec<String>,
}

/// Splits a dotted route name into its ancestor chain, e.g. `"a.b.c"` -> `["a", "a.b", "a.b.c"]`.
pub fn segment_chain(name: &str) -> Vec<String> {
    let mut chain = Vec::new();
    let mut acc = String::new();
    for part in name.split('.') {
        if !acc.is_empty() {
            acc.push('.');
        }
        acc.push_str(part);
        chain.push(acc.clone());
    }
    chain
}

/// Builds `State` values: merges defaults, stamps ids, and computes activation/deactivation
/// plans between two states.
#[derive(Debug, Clone)]
pub struct StateBuilder {
    clock: SharedIdClock,
}

impl StateBuilder {
    pub fn new(clock: SharedIdClock) -> Self {
        Self { clock }
    }

    /// Constructs a fully-formed `State`, stamping fresh `Meta` unless `force_id` is given.
    pub fn make_state(
        &self,
        name: impl Into<String>,
        params: Params,
        path: impl Into<String>,
        options: NavigationOptions,
        redirected: Option<String>,
        force_id: Option<u64>,
    ) -> State {
        let name = name.into();
        let path = path.into();
        let id = force_id.unwrap_or_else(|| self.clock.next_id());
        State {
            name: name.clone(),
            params: params.clone(),
            path,
            meta: Some(Meta {
                id,
                params,
                options,
                redirected,
            }),
        }
    }

    /// Stamps `state` as the result of a guard/middleware redirect mid-pipeline: ensures it
    /// carries `Meta` (minting an id if it arrived without one, e.g. a guard-constructed
    /// `State::new(...)`) and records `original_name` as the route that was originally requested.
    pub fn mark_redirected(&self, state: &mut State, original_name: &str) {
        match &mut state.meta {
            Some(meta) => meta.redirected = Some(original_name.to_string()),
            None => {
                state.meta = Some(Meta {
                    id: self.clock.next_id(),
                    params: state.params.clone(),
                    options: NavigationOptions::default(),
                    redirected: Some(original_name.to_string()),
                });
            }
        }
    }

    /// Merges `defaults` under `params` (params win on collision) and returns the result.
    pub fn merge_defaults(params: &Params, defaults: &HashMap<String, Value>) -> Params {
        let mut merged: Params = defaults.clone();
        for (k, v) in params {
            merged.insert(k.clone(), v.clone());
        }
        merged
    }

    /// Computes the activation/deactivation plan transitioning from `from` (if any) to `to`.
    ///
    /// Per the design's chosen guard-ordering policy: only the symmetric difference of the two
    /// states' segment chains is guarded; shared ancestor segments are left alone unless `reload`
    /// is set, in which case they are included in both `to_deactivate` and `to_activate`.
    pub fn build_navigation_plan(
        &self,
        to: &State,
        from: Option<&State>,
        reload: bool,
    ) -> NavigationPlan {
        let to_chain = segment_chain(&to.name);

        let Some(from) = from else {
            return NavigationPlan {
                to_deactivate: Vec::new(),
                to_activate: to_chain,
                intersection: Vec::new(),
            };
        };

        let from_chain = segment_chain(&from.name);

        if reload {
            return NavigationPlan {
                to_deactivate: from_chain.into_iter().rev().collect(),
                to_activate: to_chain,
                intersection: Vec::new(),
            };
        }

        let common_len = from_chain
            .iter()
            .zip(to_chain.iter())
            .take_while(|(a, b)| a == b)
            .count();

        let intersection = to_chain[..common_len].to_vec();
        let to_deactivate: Vec<String> = from_chain[common_len..].iter().rev().cloned().collect();
        let to_activate: Vec<String> = to_chain[common_len..].to_vec();

        NavigationPlan {
            to_deactivate,
            to_activate,
            intersection,
        }
    }

    /// Structural equality for same-state detection: same name, and equal params once keys in
    /// `ignore_keys` (typically a route's declared query-param set) are stripped from both
    /// sides. Honors the "different keys of the same length" edge case — two maps can have an
    /// equal key *count* while differing in which keys they hold, and must still compare unequal.
    pub fn are_states_equal(a: &State, b: &State, ignore_keys: &std::collections::HashSet<String>) -> bool {
        if a.name != b.name {
            return false;
        }

        let strip = |params: &Params| -> Params {
            params
                .iter()
                .filter(|(k, _)| !ignore_keys.contains(k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        };

        strip(&a.params) == strip(&b.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::AtomicIdClock;
    use std::sync::Arc;

    fn builder() -> StateBuilder {
        StateBuilder::new(Arc::new(AtomicIdClock::new()))
    }

    #[test]
    fn segment_chain_builds_ancestor_list() {
        assert_eq!(
            segment_chain("a.b.c"),
            vec!["a".to_string(), "a.b".to_string(), "a.b.c".to_string()]
        );
    }

    #[test]
    fn make_state_stamps_monotonic_ids() {
        let b = builder();
        let s1 = b.make_state("home", Params::new(), "/", NavigationOptions::default(), None, None);
        let s2 = b.make_state("about", Params::new(), "/about", NavigationOptions::default(), None, None);
        assert!(s1.meta_id().unwrap() < s2.meta_id().unwrap());
    }

    #[test]
    fn navigation_plan_from_none_activates_full_chain() {
        let b = builder();
        let to = State::new("a.b.c", Params::new(), "/a/b/c");
        let plan = b.build_navigation_plan(&to, None, false);
        assert_eq!(plan.to_activate, segment_chain("a.b.c"));
        assert!(plan.to_deactivate.is_empty());
    }

    #[test]
    fn navigation_plan_only_diffs_symmetric_difference() {
        let b = builder();
        let from = State::new("a.b.x", Params::new(), "/a/b/x");
        let to = State::new("a.b.y", Params::new(), "/a/b/y");
        let plan = b.build_navigation_plan(&to, Some(&from), false);
        assert_eq!(plan.intersection, vec!["a".to_string(), "a.b".to_string()]);
        assert_eq!(plan.to_deactivate, vec!["a.b.x".to_string()]);
        assert_eq!(plan.to_activate, vec!["a.b.y".to_string()]);
    }

    #[test]
    fn reload_deactivates_and_reactivates_shared_chain() {
        let b = builder();
        let from = State::new("a.b", Params::new(), "/a/b");
        let to = State::new("a.b", Params::new(), "/a/b");
        let plan = b.build_navigation_plan(&to, Some(&from), true);
        assert_eq!(plan.to_deactivate, vec!["a.b".to_string(), "a".to_string()]);
        assert_eq!(plan.to_activate, segment_chain("a.b"));
    }

    #[test]
    fn are_states_equal_ignores_declared_query_keys_but_not_others() {
        let mut a = State::new("home", Params::new(), "/");
        let mut b = State::new("home", Params::new(), "/?tab=info");
        a.params.insert("tab".into(), Value::String("a".into()));
        b.params.insert("tab".into(), Value::String("b".into()));
        let ignore: std::collections::HashSet<String> = ["tab".to_string()].into_iter().collect();
        assert!(StateBuilder::are_states_equal(&a, &b, &ignore));

        a.params.insert("id".into(), Value::String("1".into()));
        b.params.insert("id".into(), Value::String("2".into()));
        assert!(!StateBuilder::are_states_equal(&a, &b, &ignore));
    }

    #[test]
    fn are_states_equal_detects_same_key_count_different_keys() {
        let mut a = State::new("home", Params::new(), "/");
        let mut b = State::new("home", Params::new(), "/");
        a.params.insert("id".into(), Value::String("1".into()));
        b.params.insert("slug".into(), Value::String("1".into()));
        assert!(!StateBuilder::are_states_equal(&a, &b, &std::collections::HashSet::new()));
    }
}
