use chrono::Utc;
use futures::future::BoxFuture;

use weft_core::error::Result;
use weft_core::traits::Tool;
use weft_core::types::ToolContext;

/// Placeholder capability for agent references. LLM-backed invocation is not
/// implemented; the stub returns a descriptor so graphs containing agent
/// nodes still execute end to end.
pub struct AgentStub {
    agent_id: String,
    agent_name: String,
}

impl AgentStub {
    pub fn new(agent_id: impl Into<String>, agent_name: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_name: agent_name.into(),
        }
    }
}

impl Tool for AgentStub {
    fn name(&self) -> &str {
        &self.agent_id
    }

    fn description(&self) -> &str {
        "Agent invocation placeholder."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "additionalProperties": true})
    }

    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            Ok(serde_json::json!({
                "agentId": self.agent_id,
                "agentName": self.agent_name,
                "status": "skipped",
                "note": "agent invocation is not implemented",
                "receivedAt": Utc::now().to_rfc3339(),
                "input": input,
            }))
        })
    }
}
