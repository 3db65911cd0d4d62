//! End-to-end scheduler runs over small automation graphs, using the
//! built-in tool registry and an in-memory condition store.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use weft_core::error::{Result, WeftError};
use weft_core::event::EventBus;
use weft_core::traits::Tool;
use weft_core::types::{
    Automation, AutomationStatus, Link, Node, NodeKind, NodeStatus, OutputMap, ToolContext,
};
use weft_engine::{ConditionSet, ConditionStore, GraphScheduler, MemoryConditionStore};
use weft_tools::ToolRegistry;

/// Echoes its input back, tagged with its own name.
struct Echo(&'static str);

impl Tool for Echo {
    fn name(&self) -> &str {
        self.0
    }

    fn description(&self) -> &str {
        "echoes input"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }

    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<serde_json::Value>> {
        let name = self.0;
        Box::pin(async move {
            Ok(serde_json::json!({"echoedBy": name, "input": input}))
        })
    }
}

/// Always fails.
struct Fail;

impl Tool for Fail {
    fn name(&self) -> &str {
        "fail"
    }

    fn description(&self) -> &str {
        "always fails"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }

    fn execute(
        &self,
        _input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async { Err(WeftError::Execution("deliberate failure".into())) })
    }
}

/// Sleeps briefly, then echoes. For racing convergent branches.
struct Slow;

impl Tool for Slow {
    fn name(&self) -> &str {
        "slow"
    }

    fn description(&self) -> &str {
        "sleeps then echoes"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }

    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(25)).await;
            Ok(serde_json::json!({"input": input}))
        })
    }
}

fn scheduler_with(registry: ToolRegistry, store: Arc<MemoryConditionStore>) -> (GraphScheduler, Arc<EventBus>) {
    let events = Arc::new(EventBus::default());
    let scheduler = GraphScheduler::new(Arc::new(registry), store, events.clone());
    (scheduler, events)
}

fn registry_with_test_tools() -> ToolRegistry {
    let mut registry = ToolRegistry::with_builtins();
    registry.register(Echo("echoA"));
    registry.register(Echo("echoB"));
    registry.register(Echo("echoC"));
    registry.register(Fail);
    registry.register(Slow);
    registry
}

#[tokio::test]
async fn no_trigger_is_an_error() {
    let (scheduler, _) = scheduler_with(registry_with_test_tools(), Arc::new(MemoryConditionStore::new()));
    let mut automation = Automation::new("a1", "empty");
    automation.nodes.push(Node::new("x1", NodeKind::Tool, "echoA"));

    let err = scheduler.execute(&mut automation, OutputMap::new()).await.unwrap_err();
    assert!(matches!(err, WeftError::NoTrigger(id) if id == "a1"));
    // Nothing ran and the status never left idle.
    assert_eq!(automation.status, AutomationStatus::Idle);
}

#[tokio::test]
async fn linear_chain_runs_and_writes_back_outputs() {
    let (scheduler, events) = scheduler_with(registry_with_test_tools(), Arc::new(MemoryConditionStore::new()));
    let mut receiver = events.subscribe();

    let mut automation = Automation::new("a1", "linear");
    automation.nodes.push(Node::new("t1", NodeKind::Trigger, "manual_trigger"));
    automation.nodes.push(Node::new("x1", NodeKind::Tool, "echoA"));
    automation.links.push(Link::new("t1", "x1"));

    let mut initial = OutputMap::new();
    initial.insert("orderId".into(), serde_json::json!("o-42"));

    let ctx = scheduler.execute(&mut automation, initial).await.unwrap();

    assert_eq!(automation.status, AutomationStatus::Completed);
    assert!(ctx.has_executed("t1"));
    assert!(ctx.has_executed("x1"));
    assert!(ctx.errors().is_empty());

    let trigger_outputs = automation.node("t1").unwrap().outputs.as_ref().unwrap();
    assert_eq!(trigger_outputs["status"], "executed");
    assert_eq!(trigger_outputs["input"]["orderId"], "o-42");

    let tool_outputs = automation.node("x1").unwrap().outputs.as_ref().unwrap();
    assert_eq!(tool_outputs["echoedBy"], "echoA");

    // running/completed for both nodes, in per-node order.
    let mut statuses = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        statuses.push((event.node_id, event.status));
    }
    assert_eq!(statuses.len(), 4);
    assert_eq!(statuses[0], ("t1".to_string(), NodeStatus::Running));
    assert!(statuses.contains(&("x1".to_string(), NodeStatus::Completed)));
}

#[tokio::test]
async fn keyed_link_passes_one_value_and_unkeyed_passes_all() {
    let (scheduler, _) = scheduler_with(registry_with_test_tools(), Arc::new(MemoryConditionStore::new()));

    let mut automation = Automation::new("a1", "mapping");
    automation.nodes.push(Node::new("t1", NodeKind::Trigger, "manual_trigger"));
    automation.nodes.push(Node::new("x1", NodeKind::Tool, "echoA"));
    automation.nodes.push(Node::new("x2", NodeKind::Tool, "echoB"));
    automation.links.push(Link::keyed("t1", "status", "x1", "triggerStatus"));
    automation.links.push(Link::new("t1", "x2"));

    let ctx = scheduler.execute(&mut automation, OutputMap::new()).await.unwrap();
    assert_eq!(automation.status, AutomationStatus::Completed);

    // Keyed: exactly one renamed value arrived.
    let keyed = ctx.outputs("x1").unwrap();
    assert_eq!(keyed["input"]["triggerStatus"], "executed");
    assert!(keyed["input"].get("executedAt").is_none());

    // Unkeyed: the whole trigger output map arrived.
    let merged = ctx.outputs("x2").unwrap();
    assert_eq!(merged["input"]["status"], "executed");
    assert!(merged["input"].get("executedAt").is_some());
}

#[tokio::test]
async fn diamond_join_runs_exactly_once() {
    let (scheduler, events) = scheduler_with(registry_with_test_tools(), Arc::new(MemoryConditionStore::new()));
    let mut receiver = events.subscribe();

    // t1 fans out to a fast and a slow branch that converge on x3.
    let mut automation = Automation::new("a1", "diamond");
    automation.nodes.push(Node::new("t1", NodeKind::Trigger, "manual_trigger"));
    automation.nodes.push(Node::new("x1", NodeKind::Tool, "echoA"));
    automation.nodes.push(Node::new("x2", NodeKind::Tool, "slow"));
    automation.nodes.push(Node::new("x3", NodeKind::Tool, "echoC"));
    automation.links.push(Link::new("t1", "x1"));
    automation.links.push(Link::new("t1", "x2"));
    automation.links.push(Link::new("x1", "x3"));
    automation.links.push(Link::new("x2", "x3"));

    let ctx = scheduler.execute(&mut automation, OutputMap::new()).await.unwrap();
    assert_eq!(automation.status, AutomationStatus::Completed);
    assert!(ctx.has_executed("x3"));

    let mut x3_running = 0;
    while let Ok(event) = receiver.try_recv() {
        if event.node_id == "x3" && event.status == NodeStatus::Running {
            x3_running += 1;
        }
    }
    assert_eq!(x3_running, 1);
}

#[tokio::test]
async fn condition_routes_only_the_matching_branch() {
    let store = Arc::new(MemoryConditionStore::new());
    let set: ConditionSet = serde_json::from_value(serde_json::json!({
        "id": "cs-orders",
        "name": "order routing",
        "conditions": [
            {
                "id": "c-vip",
                "name": "vip order",
                "predicate": "customerType == \"vip\" AND orderValue > 1000",
                "linkedNodes": ["agentA", "agentB"]
            },
            {
                "id": "c-rest",
                "name": "everything else",
                "predicate": "orderValue >= 0",
                "linkedNodes": ["agentC"]
            }
        ]
    }))
    .unwrap();
    store.insert(set);

    let mut registry = registry_with_test_tools();
    registry.register_agent("agentA", "Agent A");
    registry.register_agent("agentB", "Agent B");
    registry.register_agent("agentC", "Agent C");
    let (scheduler, _) = scheduler_with(registry, store);

    let mut automation = Automation::new("a1", "routing");
    automation.nodes.push(Node::new("t1", NodeKind::Trigger, "manual_trigger"));
    automation.nodes.push(Node::new("c1", NodeKind::Condition, "cs-orders"));
    automation.nodes.push(Node::new("agentA", NodeKind::Agent, "agentA"));
    automation.nodes.push(Node::new("agentB", NodeKind::Agent, "agentB"));
    automation.nodes.push(Node::new("agentC", NodeKind::Agent, "agentC"));
    automation.links.push(Link::keyed("t1", "input", "c1", "order"));

    let mut config = OutputMap::new();
    config.insert("customerType".into(), serde_json::json!("vip"));
    config.insert("orderValue".into(), serde_json::json!(1500));
    automation.node_mut("c1").unwrap().config = config;

    let ctx = scheduler.execute(&mut automation, OutputMap::new()).await.unwrap();
    assert_eq!(automation.status, AutomationStatus::Completed);

    let condition_outputs = ctx.outputs("c1").unwrap();
    assert_eq!(condition_outputs["conditionId"], "c-vip");
    assert_eq!(condition_outputs["satisfied"], true);

    assert!(ctx.has_executed("agentA"));
    assert!(ctx.has_executed("agentB"));
    // The losing branch is never scheduled.
    assert!(!ctx.has_executed("agentC"));
}

#[tokio::test]
async fn unsatisfied_condition_fails_the_node() {
    let store = Arc::new(MemoryConditionStore::new());
    let set: ConditionSet = serde_json::from_value(serde_json::json!({
        "id": "cs-strict",
        "name": "strict",
        "conditions": [{
            "id": "c1",
            "name": "never",
            "predicate": "amount > 1000000",
            "linkedNodes": ["x1"]
        }]
    }))
    .unwrap();
    store.insert(set);

    let (scheduler, _) = scheduler_with(registry_with_test_tools(), store);

    let mut automation = Automation::new("a1", "strict");
    automation.nodes.push(Node::new("t1", NodeKind::Trigger, "manual_trigger"));
    automation.nodes.push(Node::new("c1", NodeKind::Condition, "cs-strict"));
    automation.nodes.push(Node::new("x1", NodeKind::Tool, "echoA"));
    automation.links.push(Link::new("t1", "c1"));

    let ctx = scheduler.execute(&mut automation, OutputMap::new()).await.unwrap();
    assert_eq!(automation.status, AutomationStatus::Error);
    assert!(ctx.errors().contains_key("c1"));
    assert!(!ctx.has_executed("x1"));
}

#[tokio::test]
async fn failing_node_fails_the_run_but_not_siblings() {
    let (scheduler, events) = scheduler_with(registry_with_test_tools(), Arc::new(MemoryConditionStore::new()));
    let mut receiver = events.subscribe();

    let mut automation = Automation::new("a1", "partial failure");
    automation.nodes.push(Node::new("t1", NodeKind::Trigger, "manual_trigger"));
    automation.nodes.push(Node::new("bad", NodeKind::Tool, "fail"));
    automation.nodes.push(Node::new("good", NodeKind::Tool, "echoA"));
    automation.nodes.push(Node::new("after_bad", NodeKind::Tool, "echoB"));
    automation.links.push(Link::new("t1", "bad"));
    automation.links.push(Link::new("t1", "good"));
    automation.links.push(Link::new("bad", "after_bad"));

    let ctx = scheduler.execute(&mut automation, OutputMap::new()).await.unwrap();

    assert_eq!(automation.status, AutomationStatus::Error);
    assert!(ctx.errors()["bad"].contains("deliberate failure"));
    // Sibling branch still completed.
    assert!(ctx.has_executed("good"));
    // Downstream of the failure never ran.
    assert!(!ctx.has_executed("after_bad"));

    let mut saw_failed_event = false;
    while let Ok(event) = receiver.try_recv() {
        if event.node_id == "bad" && event.status == NodeStatus::Failed {
            assert!(event.error.as_deref().unwrap_or("").contains("deliberate failure"));
            saw_failed_event = true;
        }
    }
    assert!(saw_failed_event);
}

#[tokio::test]
async fn dangling_link_target_is_captured_in_the_log() {
    let (scheduler, events) = scheduler_with(registry_with_test_tools(), Arc::new(MemoryConditionStore::new()));
    let mut receiver = events.subscribe();

    // The link points at a node id that was never added to the graph.
    let mut automation = Automation::new("a1", "dangling link");
    automation.nodes.push(Node::new("t1", NodeKind::Trigger, "manual_trigger"));
    automation.links.push(Link::new("t1", "ghost"));

    let ctx = scheduler.execute(&mut automation, OutputMap::new()).await.unwrap();

    assert_eq!(automation.status, AutomationStatus::Error);
    assert!(ctx.errors()["ghost"].contains("ghost"));

    let mut saw_failed_event = false;
    while let Ok(event) = receiver.try_recv() {
        if event.node_id == "ghost" && event.status == NodeStatus::Failed {
            assert!(event.error.as_deref().unwrap_or("").contains("not found"));
            saw_failed_event = true;
        }
    }
    assert!(saw_failed_event);
}

#[tokio::test]
async fn missing_condition_set_is_reported() {
    let (scheduler, _) = scheduler_with(registry_with_test_tools(), Arc::new(MemoryConditionStore::new()));

    let mut automation = Automation::new("a1", "dangling");
    automation.nodes.push(Node::new("t1", NodeKind::Trigger, "manual_trigger"));
    automation.nodes.push(Node::new("c1", NodeKind::Condition, "cs-missing"));
    automation.links.push(Link::new("t1", "c1"));

    let ctx = scheduler.execute(&mut automation, OutputMap::new()).await.unwrap();
    assert_eq!(automation.status, AutomationStatus::Error);
    assert!(ctx.errors()["c1"].contains("cs-missing"));
}
