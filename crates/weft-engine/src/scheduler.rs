//! The graph scheduler: breadth-wise traversal of an automation graph from
//! its trigger nodes, fanning out along links as nodes complete.
//!
//! Branches run concurrently on spawned tasks. Convergent nodes are admitted
//! by the scheduling policy (first arrival wins by default), so a diamond
//! graph executes its join node exactly once. A failing node fails its own
//! branch and the run's final status, but sibling branches keep running.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use weft_core::error::{Result, WeftError};
use weft_core::event::EventBus;
use weft_core::types::{
    Automation, AutomationStatus, Link, Node, NodeEvent, NodeKind, OutputMap, ToolContext,
};
use weft_tools::ToolRegistry;

use crate::condition::{ConditionRouter, ConditionStore};
use crate::context::ExecutionContext;
use crate::policy::{FirstArrival, SchedulingPolicy};

/// Executes automations against a tool registry and a condition store,
/// publishing node lifecycle events as it goes.
pub struct GraphScheduler {
    registry: Arc<ToolRegistry>,
    conditions: Arc<dyn ConditionStore>,
    events: Arc<EventBus>,
    policy: Arc<dyn SchedulingPolicy>,
    working_dir: PathBuf,
}

/// Immutable view of one run, shared by every branch task.
struct Run {
    automation_id: String,
    nodes: HashMap<String, Node>,
    links: Vec<Link>,
    registry: Arc<ToolRegistry>,
    conditions: Arc<dyn ConditionStore>,
    events: Arc<EventBus>,
    policy: Arc<dyn SchedulingPolicy>,
    working_dir: PathBuf,
}

impl GraphScheduler {
    pub fn new(
        registry: Arc<ToolRegistry>,
        conditions: Arc<dyn ConditionStore>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            registry,
            conditions,
            events,
            policy: Arc::new(FirstArrival),
            working_dir: PathBuf::from("."),
        }
    }

    pub fn with_policy(mut self, policy: impl SchedulingPolicy + 'static) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    /// Run an automation from its triggers.
    ///
    /// Fails only when the graph has no trigger node. Node failures are
    /// recorded in the returned context and reflected in the automation's
    /// final status instead of aborting sibling branches.
    pub async fn execute(
        &self,
        automation: &mut Automation,
        initial: OutputMap,
    ) -> Result<ExecutionContext> {
        let trigger_ids = automation.trigger_ids();
        if trigger_ids.is_empty() {
            return Err(WeftError::NoTrigger(automation.id.clone()));
        }

        info!(
            automation = %automation.id,
            name = %automation.name,
            triggers = trigger_ids.len(),
            "Starting automation run"
        );
        automation.status = AutomationStatus::Running;

        let run = Arc::new(Run {
            automation_id: automation.id.clone(),
            nodes: automation
                .nodes
                .iter()
                .map(|n| (n.id.clone(), n.clone()))
                .collect(),
            links: automation.links.clone(),
            registry: self.registry.clone(),
            conditions: self.conditions.clone(),
            events: self.events.clone(),
            policy: self.policy.clone(),
            working_dir: self.working_dir.clone(),
        });

        let ctx = ExecutionContext::new();
        let mut handles = Vec::with_capacity(trigger_ids.len());
        for trigger_id in trigger_ids {
            handles.push(tokio::spawn(run_node(
                run.clone(),
                ctx.clone(),
                trigger_id,
                initial.clone(),
            )));
        }

        let mut failed = false;
        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!(automation = %automation.id, error = %e, "Branch failed");
                    failed = true;
                }
                Err(e) => {
                    warn!(automation = %automation.id, error = %e, "Branch task panicked");
                    failed = true;
                }
            }
        }

        for (node_id, outputs) in ctx.all_outputs() {
            if let Some(node) = automation.node_mut(&node_id) {
                node.outputs = Some(outputs);
            }
        }

        automation.status = if failed || !ctx.errors().is_empty() {
            AutomationStatus::Error
        } else {
            AutomationStatus::Completed
        };
        info!(
            automation = %automation.id,
            status = ?automation.status,
            "Automation run finished"
        );

        Ok(ctx)
    }
}

/// Execute one node and fan out to its successors. Boxed because branches
/// recurse through arbitrary graph depth.
fn run_node(
    run: Arc<Run>,
    ctx: ExecutionContext,
    node_id: String,
    inherited: OutputMap,
) -> BoxFuture<'static, Result<()>> {
    Box::pin(async move {
        if !run.policy.admit(&ctx, &node_id) {
            debug!(node = %node_id, "Node already claimed, skipping arrival");
            return Ok(());
        }

        let Some(node) = run.nodes.get(&node_id).cloned() else {
            // A dangling link target is a structural error; capture it
            // against the missing id so the execution log keeps it.
            let e = WeftError::NodeNotFound {
                automation: run.automation_id.clone(),
                node: node_id.clone(),
            };
            ctx.record_error(&node_id, e.to_string());
            run.events
                .publish(NodeEvent::failed(&node_id, &run.automation_id, e.to_string()));
            return Err(e);
        };

        // Stored config first, inherited values on top.
        let mut input = node.config.clone();
        for (key, value) in inherited {
            input.insert(key, value);
        }

        run.events
            .publish(NodeEvent::running(&node.id, &run.automation_id));

        if node.kind == NodeKind::Condition {
            return run_condition(run, ctx, &node, input).await;
        }

        let tool_ctx = ToolContext::new(&run.automation_id, &node.id, &run.working_dir);
        let result = match node.kind {
            NodeKind::Trigger | NodeKind::Tool => {
                run.registry
                    .invoke(&node.reference_id, serde_json::Value::Object(input), tool_ctx)
                    .await
            }
            NodeKind::Agent => {
                if run.registry.get(&node.reference_id).is_some() {
                    run.registry
                        .invoke(&node.reference_id, serde_json::Value::Object(input), tool_ctx)
                        .await
                } else {
                    // Unregistered agents degrade to a descriptor output.
                    let mut outputs = OutputMap::new();
                    outputs.insert("agentId".into(), serde_json::json!(node.reference_id));
                    outputs.insert("status".into(), serde_json::json!("skipped"));
                    outputs.insert("input".into(), serde_json::Value::Object(input));
                    Ok(outputs)
                }
            }
            NodeKind::Condition => unreachable!("handled above"),
        };

        match result {
            Ok(outputs) => {
                ctx.record_outputs(&node.id, outputs.clone());
                run.events
                    .publish(NodeEvent::completed(&node.id, &run.automation_id, outputs.clone()));
                fan_out(run, ctx, &node.id, &outputs).await
            }
            Err(e) => {
                ctx.record_error(&node.id, e.to_string());
                run.events
                    .publish(NodeEvent::failed(&node.id, &run.automation_id, e.to_string()));
                Err(e)
            }
        }
    })
}

/// Evaluate a condition node and schedule only the chosen branch's linked
/// nodes. Condition nodes never follow generic links.
async fn run_condition(
    run: Arc<Run>,
    ctx: ExecutionContext,
    node: &Node,
    input: OutputMap,
) -> Result<()> {
    let input_value = serde_json::Value::Object(input);

    let outcome = run
        .conditions
        .get(&node.reference_id)
        .ok_or_else(|| WeftError::ConditionSetNotFound(node.reference_id.clone()))
        .and_then(|set| {
            ConditionRouter::evaluate_first(&set, &input_value).ok_or_else(|| {
                WeftError::NoConditionSatisfied {
                    node: node.id.clone(),
                }
            })
        });

    let chosen = match outcome {
        Ok(chosen) => chosen,
        Err(e) => {
            ctx.record_error(&node.id, e.to_string());
            run.events
                .publish(NodeEvent::failed(&node.id, &run.automation_id, e.to_string()));
            return Err(e);
        }
    };

    debug!(
        node = %node.id,
        condition = %chosen.condition_id,
        targets = chosen.linked_nodes.len(),
        "Condition branch chosen"
    );

    let mut outputs = OutputMap::new();
    outputs.insert("conditionId".into(), serde_json::json!(chosen.condition_id));
    outputs.insert("conditionName".into(), serde_json::json!(chosen.condition_name));
    outputs.insert("satisfied".into(), serde_json::json!(true));
    outputs.insert("input".into(), input_value.clone());
    ctx.record_outputs(&node.id, outputs.clone());
    run.events
        .publish(NodeEvent::completed(&node.id, &run.automation_id, outputs));

    // The condition's own input flows unchanged into every linked node.
    let downstream = match input_value {
        serde_json::Value::Object(map) => map,
        _ => OutputMap::new(),
    };

    let mut handles = Vec::with_capacity(chosen.linked_nodes.len());
    for target in chosen.linked_nodes {
        handles.push(tokio::spawn(run_node(
            run.clone(),
            ctx.clone(),
            target,
            downstream.clone(),
        )));
    }
    await_branches(handles).await
}

/// Schedule every link out of a completed node.
async fn fan_out(
    run: Arc<Run>,
    ctx: ExecutionContext,
    node_id: &str,
    outputs: &OutputMap,
) -> Result<()> {
    let mut handles = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for link in run.links.iter().filter(|l| l.from_node == node_id) {
        if !seen.insert(link.to_node.clone()) {
            continue;
        }
        let mapped = map_outputs(link, outputs);
        handles.push(tokio::spawn(run_node(
            run.clone(),
            ctx.clone(),
            link.to_node.clone(),
            mapped,
        )));
    }
    await_branches(handles).await
}

async fn await_branches(
    handles: Vec<tokio::task::JoinHandle<Result<()>>>,
) -> Result<()> {
    let mut first_error = None;
    for handle in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                first_error.get_or_insert(e);
            }
            Err(e) => {
                first_error
                    .get_or_insert(WeftError::Execution(format!("branch task failed: {}", e)));
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Apply a link's mapping rule: a named output key copies that single value
/// into the target input key; an unkeyed link forwards the whole map.
fn map_outputs(link: &Link, outputs: &OutputMap) -> OutputMap {
    if let Some(from_key) = &link.from_output {
        if let Some(value) = outputs.get(from_key) {
            let to_key = link.to_input.as_deref().unwrap_or(from_key);
            let mut mapped = OutputMap::new();
            mapped.insert(to_key.to_string(), value.clone());
            return mapped;
        }
        debug!(
            from = %link.from_node,
            key = %from_key,
            "Link names a missing output key, forwarding everything"
        );
    }
    outputs.clone()
}
