//! Pluggable admission policy for convergent nodes.

use crate::context::ExecutionContext;

/// Decides whether a node arriving via a link may run now. The scheduler
/// consults the policy once per arrival, after the atomic claim check.
pub trait SchedulingPolicy: Send + Sync {
    /// True if the arrival should execute the node.
    fn admit(&self, ctx: &ExecutionContext, node_id: &str) -> bool;
}

/// The first branch to arrive runs the node with the inputs it carried;
/// later arrivals are dropped. There is no barrier waiting for all
/// incoming links.
#[derive(Default)]
pub struct FirstArrival;

impl SchedulingPolicy for FirstArrival {
    fn admit(&self, ctx: &ExecutionContext, node_id: &str) -> bool {
        ctx.claim(node_id)
    }
}
