use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use weft_core::error::{Result, WeftError};
use weft_core::traits::Tool;
use weft_core::types::{ToolContext, ToolDefinition};
use weft_tools::ToolRegistry;

use crate::ProcessToolHost;

/// A registry tool that forwards to a provider-hosted tool.
/// Name format: ext__{provider}__{tool}
pub struct ProviderTool {
    display_name: String,
    tool_name: String,
    description: String,
    schema: serde_json::Value,
    host: Arc<ProcessToolHost>,
}

impl Tool for ProviderTool {
    fn name(&self) -> &str {
        &self.display_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> serde_json::Value {
        self.schema.clone()
    }

    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<serde_json::Value>> {
        let tool = self.tool_name.clone();
        let host = self.host.clone();

        Box::pin(async move {
            let result = host.invoke(&tool, input).await?;
            if result.success {
                Ok(result.output.unwrap_or(serde_json::Value::Null))
            } else {
                Err(WeftError::Capability {
                    tool,
                    message: result
                        .error
                        .unwrap_or_else(|| "provider tool failed".to_string()),
                })
            }
        })
    }

    fn timeout_secs(&self) -> u64 {
        120
    }
}

/// Register every discovered provider capability into the tool registry.
pub fn register_provider_tools(
    registry: &mut ToolRegistry,
    host: &Arc<ProcessToolHost>,
    provider_name: &str,
    definitions: &[ToolDefinition],
) {
    for def in definitions {
        let display_name = format!("ext__{}__{}", provider_name, def.name);
        let bridged = ProviderTool {
            display_name: display_name.clone(),
            tool_name: def.name.clone(),
            description: def.description.clone(),
            schema: def.input_schema.clone(),
            host: host.clone(),
        };
        registry.register(bridged);
        debug!(name = %display_name, "Registered provider tool");
    }
}
