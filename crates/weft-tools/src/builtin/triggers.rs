use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::Utc;
use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::debug;

use weft_core::error::{Result, WeftError};
use weft_core::traits::Tool;
use weft_core::types::{FieldType, HttpMethod, ToolContext, WebhookTrigger};

/// Starts a run on explicit user request. Produces a small execution receipt
/// so downstream nodes have something to wire against.
pub struct ManualTrigger;

impl Tool for ManualTrigger {
    fn name(&self) -> &str {
        "manual_trigger"
    }

    fn description(&self) -> &str {
        "Start an automation manually. Outputs an execution receipt with the provided input."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "additionalProperties": true
        })
    }

    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            Ok(serde_json::json!({
                "status": "executed",
                "executedAt": Utc::now().to_rfc3339(),
                "input": input,
            }))
        })
    }
}

#[derive(Deserialize)]
struct WebhookInput {
    #[serde(default = "default_method")]
    method: String,
    #[serde(default)]
    inputs: BTreeMap<String, String>,
}

fn default_method() -> String {
    "POST".to_string()
}

/// Arms a webhook: generates the URL/token contract the HTTP boundary layer
/// serves. The boundary layer checks the bearer token before invoking us.
pub struct WebhookTriggerTool;

impl Tool for WebhookTriggerTool {
    fn name(&self) -> &str {
        "webhook_trigger"
    }

    fn description(&self) -> &str {
        "Arm a webhook endpoint. Outputs the generated URL, bearer token, method, and typed input mapping."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "method": {
                    "type": "string",
                    "description": "HTTP method the webhook accepts (default POST)"
                },
                "inputs": {
                    "type": "object",
                    "description": "Field name to type (string, number, array, object)"
                }
            }
        })
    }

    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let params: WebhookInput = serde_json::from_value(input)
                .map_err(|e| WeftError::ToolValidation(e.to_string()))?;

            let method = HttpMethod::from_str(&params.method)
                .map_err(WeftError::ToolValidation)?;

            let mut inputs = BTreeMap::new();
            for (field, type_name) in &params.inputs {
                let field_type = FieldType::from_str(type_name).map_err(|e| {
                    WeftError::ToolValidation(format!("field '{}': {}", field, e))
                })?;
                inputs.insert(field.clone(), field_type);
            }

            let hook = WebhookTrigger::new(method, inputs);
            debug!(url = %hook.url, "Webhook armed");

            let mut outputs = serde_json::to_value(&hook)?;
            if let Some(map) = outputs.as_object_mut() {
                map.insert("status".into(), serde_json::json!("armed"));
            }
            Ok(outputs)
        })
    }
}

#[derive(Deserialize)]
struct ScheduleInput {
    expression: String,
}

/// Validates a cron expression and reports the next fire time. Actual
/// scheduling lives with the boundary layer; the node just arms the contract.
pub struct ScheduleTrigger;

impl Tool for ScheduleTrigger {
    fn name(&self) -> &str {
        "schedule_trigger"
    }

    fn description(&self) -> &str {
        "Arm a cron schedule. Validates the expression and outputs the next fire time."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "Cron expression (seconds-resolution, 6 or 7 fields)"
                }
            },
            "required": ["expression"]
        })
    }

    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let params: ScheduleInput = serde_json::from_value(input)
                .map_err(|e| WeftError::ToolValidation(e.to_string()))?;

            let schedule = cron::Schedule::from_str(&params.expression).map_err(|e| {
                WeftError::ToolValidation(format!(
                    "invalid cron expression '{}': {}",
                    params.expression, e
                ))
            })?;

            let next = schedule.upcoming(Utc).next().map(|t| t.to_rfc3339());

            Ok(serde_json::json!({
                "status": "executed",
                "executedAt": Utc::now().to_rfc3339(),
                "expression": params.expression,
                "nextFireAt": next,
            }))
        })
    }
}
