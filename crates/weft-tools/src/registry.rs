use std::collections::HashMap;
use std::sync::Arc;

use weft_core::error::{Result, WeftError};
use weft_core::traits::Tool;
use weft_core::types::{OutputMap, ToolContext, ToolDefinition};

use crate::builtin;

/// Registry of invocable capabilities. A node's reference id resolves here,
/// whether it names a built-in tool, a provider-bridged tool, or an agent
/// stub; the scheduler never branches on origin.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool under its own name.
    pub fn register(&mut self, tool: impl Tool) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    /// Register an agent id as a placeholder capability. Invoking it returns
    /// a descriptor instead of running an LLM call.
    pub fn register_agent(&mut self, id: impl Into<String>, name: impl Into<String>) {
        let stub = builtin::agent::AgentStub::new(id, name);
        self.tools.insert(stub.name().to_string(), Arc::new(stub));
    }

    /// Unregister a tool by name.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// List all registered tool names.
    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Descriptors for every registered capability.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    /// Remove every registered tool. For tests.
    pub fn clear(&mut self) {
        self.tools.clear();
    }

    /// Invoke a capability by reference id.
    ///
    /// Fails with `ToolNotFound` when nothing is registered under the id and
    /// `Capability` (wrapping the original message) when the handler rejects.
    pub async fn invoke(
        &self,
        reference_id: &str,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> Result<OutputMap> {
        let tool = self
            .get(reference_id)
            .ok_or_else(|| WeftError::ToolNotFound(reference_id.to_string()))?;

        let timeout = std::time::Duration::from_secs(tool.timeout_secs());
        let value = match tokio::time::timeout(timeout, tool.execute(input, ctx)).await {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                return Err(WeftError::Capability {
                    tool: reference_id.to_string(),
                    message: e.to_string(),
                })
            }
            Err(_) => {
                return Err(WeftError::ToolTimeout {
                    tool: reference_id.to_string(),
                    timeout_secs: tool.timeout_secs(),
                })
            }
        };

        // Tools return JSON objects; anything else is wrapped under "result"
        // so downstream links always see a mapping.
        Ok(match value {
            serde_json::Value::Object(map) => map,
            other => {
                let mut map = OutputMap::new();
                map.insert("result".to_string(), other);
                map
            }
        })
    }

    /// Create a registry with all built-in tools registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(builtin::triggers::ManualTrigger);
        registry.register(builtin::triggers::WebhookTriggerTool);
        registry.register(builtin::triggers::ScheduleTrigger);
        registry.register(builtin::shell::ShellTool::new());
        registry
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
