//! Condition sets and the router that picks a branch.
//!
//! A condition node references a condition set by id. At run time the router
//! evaluates the set's conditions in declaration order against the node's
//! merged input; the first satisfied condition wins and its `linkedNodes`
//! are the only downstream nodes scheduled from that branch.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::predicate::Predicate;

/// One branch of a condition set: a predicate plus the node ids to schedule
/// when it is satisfied.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub id: String,
    pub name: String,
    pub predicate: Predicate,
    #[serde(default)]
    pub linked_nodes: Vec<String>,
}

/// An ordered list of branches evaluated first-match-wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionSet {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// The branch chosen for one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteMatch {
    pub condition_id: String,
    pub condition_name: String,
    pub linked_nodes: Vec<String>,
}

/// Stateless evaluation over condition sets.
pub struct ConditionRouter;

impl ConditionRouter {
    /// First satisfied condition in declaration order, or None.
    pub fn evaluate_first(set: &ConditionSet, input: &serde_json::Value) -> Option<RouteMatch> {
        set.conditions
            .iter()
            .find(|c| c.predicate.matches(input))
            .map(|c| RouteMatch {
                condition_id: c.id.clone(),
                condition_name: c.name.clone(),
                linked_nodes: c.linked_nodes.clone(),
            })
    }

    /// Every satisfied condition, in declaration order. For diagnostics.
    pub fn evaluate_all(set: &ConditionSet, input: &serde_json::Value) -> Vec<RouteMatch> {
        set.conditions
            .iter()
            .filter(|c| c.predicate.matches(input))
            .map(|c| RouteMatch {
                condition_id: c.id.clone(),
                condition_name: c.name.clone(),
                linked_nodes: c.linked_nodes.clone(),
            })
            .collect()
    }
}

/// Where the scheduler looks up condition sets by reference id.
pub trait ConditionStore: Send + Sync {
    fn get(&self, id: &str) -> Option<ConditionSet>;
    fn insert(&self, set: ConditionSet);
    fn remove(&self, id: &str) -> bool;
    fn list(&self) -> Vec<ConditionSet>;
}

/// In-memory store. The persistence boundary lives behind the trait.
#[derive(Default)]
pub struct MemoryConditionStore {
    sets: RwLock<HashMap<String, ConditionSet>>,
}

impl MemoryConditionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConditionStore for MemoryConditionStore {
    fn get(&self, id: &str) -> Option<ConditionSet> {
        self.sets
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    fn insert(&self, set: ConditionSet) {
        self.sets
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(set.id.clone(), set);
    }

    fn remove(&self, id: &str) -> bool {
        self.sets
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
            .is_some()
    }

    fn list(&self) -> Vec<ConditionSet> {
        let mut sets: Vec<ConditionSet> = self
            .sets
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        sets.sort_by(|a, b| a.id.cmp(&b.id));
        sets
    }
}
