//! Shared per-run state.
//!
//! One `ExecutionContext` is created per automation run and cloned into every
//! spawned branch. `claim` is the once-only guard: when branches converge on
//! the same node concurrently, exactly one claim succeeds.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use weft_core::types::OutputMap;

#[derive(Debug, Default)]
struct State {
    claimed: HashSet<String>,
    executed: HashMap<String, OutputMap>,
    errors: HashMap<String, String>,
}

/// Cheap to clone; all clones share the same run state.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    state: Arc<Mutex<State>>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim a node for execution. Returns false if some other
    /// branch already claimed it.
    pub fn claim(&self, node_id: &str) -> bool {
        self.lock().claimed.insert(node_id.to_string())
    }

    pub fn record_outputs(&self, node_id: &str, outputs: OutputMap) {
        self.lock().executed.insert(node_id.to_string(), outputs);
    }

    pub fn record_error(&self, node_id: &str, error: impl Into<String>) {
        self.lock().errors.insert(node_id.to_string(), error.into());
    }

    pub fn has_executed(&self, node_id: &str) -> bool {
        self.lock().executed.contains_key(node_id)
    }

    /// Outputs recorded for one node, if it completed.
    pub fn outputs(&self, node_id: &str) -> Option<OutputMap> {
        self.lock().executed.get(node_id).cloned()
    }

    /// Snapshot of all recorded outputs, keyed by node id.
    pub fn all_outputs(&self) -> HashMap<String, OutputMap> {
        self.lock().executed.clone()
    }

    /// Snapshot of all recorded node errors, keyed by node id.
    pub fn errors(&self) -> HashMap<String, String> {
        self.lock().errors.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
