use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::ToolContext;

/// A named, schema-described capability. Built-in tools, provider-backed
/// tools, and agent stubs all implement this; callers never see the origin.
pub trait Tool: Send + Sync + 'static {
    /// Tool name (the reference id nodes point at).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON Schema for tool input.
    fn input_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given input and context. The returned value
    /// is the node's outputs object.
    fn execute(
        &self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> BoxFuture<'_, Result<serde_json::Value>>;

    /// Timeout in seconds for this tool.
    fn timeout_secs(&self) -> u64 {
        60
    }
}
