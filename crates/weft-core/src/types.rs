use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Node outputs and node inputs are free-form JSON objects.
pub type OutputMap = serde_json::Map<String, serde_json::Value>;

/// What kind of work a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Trigger,
    Tool,
    Agent,
    Condition,
}

/// Lifecycle status of an automation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutomationStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Error,
}

/// A unit of work in an automation graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique within the owning automation.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Points at a tool name, an agent id, or a condition-set id.
    pub reference_id: String,
    /// Stored configuration, merged under the inherited input at run time.
    #[serde(default)]
    pub config: OutputMap,
    /// Last outputs produced by the scheduler, written back after a run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<OutputMap>,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind, reference_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            reference_id: reference_id.into(),
            config: OutputMap::new(),
            outputs: None,
        }
    }

    pub fn with_config(mut self, config: OutputMap) -> Self {
        self.config = config;
        self
    }
}

/// A directed wire from one node's output to another node's input.
/// Missing keys mean "pass everything".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    #[serde(rename = "fromNodeId")]
    pub from_node: String,
    #[serde(rename = "fromOutputKey", default, skip_serializing_if = "Option::is_none")]
    pub from_output: Option<String>,
    #[serde(rename = "toNodeId")]
    pub to_node: String,
    #[serde(rename = "toInputKey", default, skip_serializing_if = "Option::is_none")]
    pub to_input: Option<String>,
}

impl Link {
    /// An untyped link that forwards the entire outputs map.
    pub fn new(from_node: impl Into<String>, to_node: impl Into<String>) -> Self {
        Self {
            from_node: from_node.into(),
            from_output: None,
            to_node: to_node.into(),
            to_input: None,
        }
    }

    /// A link that copies one named output into one named input.
    pub fn keyed(
        from_node: impl Into<String>,
        from_output: impl Into<String>,
        to_node: impl Into<String>,
        to_input: impl Into<String>,
    ) -> Self {
        Self {
            from_node: from_node.into(),
            from_output: Some(from_output.into()),
            to_node: to_node.into(),
            to_input: Some(to_input.into()),
        }
    }
}

/// A named graph of nodes and links representing one workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Automation {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub status: AutomationStatus,
}

impl Automation {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            nodes: Vec::new(),
            links: Vec::new(),
            status: AutomationStatus::Idle,
        }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// Ids of all trigger nodes, in declaration order.
    pub fn trigger_ids(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Trigger)
            .map(|n| n.id.clone())
            .collect()
    }
}

/// Per-node lifecycle status carried by events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Running,
    Completed,
    Failed,
}

/// An immutable node lifecycle notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeEvent {
    pub node_id: String,
    pub automation_id: String,
    pub status: NodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<OutputMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl NodeEvent {
    pub fn running(node_id: impl Into<String>, automation_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            automation_id: automation_id.into(),
            status: NodeStatus::Running,
            outputs: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn completed(
        node_id: impl Into<String>,
        automation_id: impl Into<String>,
        outputs: OutputMap,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            automation_id: automation_id.into(),
            status: NodeStatus::Completed,
            outputs: Some(outputs),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(
        node_id: impl Into<String>,
        automation_id: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            automation_id: automation_id.into(),
            status: NodeStatus::Failed,
            outputs: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }

    /// Render this event as a single Server-Sent-Events frame.
    pub fn to_sse_frame(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        format!("data: {}\n\n", json)
    }
}

/// The descriptor half of a tool capability; the invocable half is the
/// `Tool` trait.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Context passed to tools during execution.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub automation_id: String,
    pub node_id: String,
    pub working_dir: PathBuf,
}

impl ToolContext {
    pub fn new(
        automation_id: impl Into<String>,
        node_id: impl Into<String>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            automation_id: automation_id.into(),
            node_id: node_id.into(),
            working_dir: working_dir.into(),
        }
    }
}

/// HTTP method accepted by a webhook trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl std::str::FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            other => Err(format!("unsupported HTTP method: {}", other)),
        }
    }
}

/// Field type in a webhook's typed-input mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Array,
    Object,
}

impl std::str::FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "string" => Ok(Self::String),
            "number" => Ok(Self::Number),
            "array" => Ok(Self::Array),
            "object" => Ok(Self::Object),
            other => Err(format!("unsupported field type: {}", other)),
        }
    }
}

/// The contract a webhook trigger node hands to the HTTP boundary layer:
/// a generated URL, a bearer token, a method, and a typed-input mapping.
/// The boundary layer must reject calls whose token does not match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookTrigger {
    pub url: String,
    pub token: String,
    pub method: HttpMethod,
    pub inputs: BTreeMap<String, FieldType>,
}

impl WebhookTrigger {
    pub fn new(method: HttpMethod, inputs: BTreeMap<String, FieldType>) -> Self {
        Self {
            url: format!("/webhooks/{}", Uuid::new_v4()),
            token: Uuid::new_v4().to_string(),
            method,
            inputs,
        }
    }

    pub fn verify_token(&self, presented: &str) -> bool {
        self.token == presented
    }
}
