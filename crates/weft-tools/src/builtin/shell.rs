use std::time::Duration;

use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::debug;

use weft_core::config::SandboxConfig;
use weft_core::error::{Result, WeftError};
use weft_core::traits::Tool;
use weft_core::types::ToolContext;

use crate::sandbox::{CommandSandbox, RunOptions};

/// Runs a restricted shell command through the CommandSandbox. Policy
/// rejections come back as ordinary structured output, never as errors.
pub struct ShellTool {
    sandbox: CommandSandbox,
    config: SandboxConfig,
}

#[derive(Deserialize)]
struct ShellInput {
    command: String,
    #[serde(default)]
    timeout: Option<u64>,
}

impl ShellTool {
    pub fn new() -> Self {
        Self::with_config(SandboxConfig::default())
    }

    pub fn with_config(config: SandboxConfig) -> Self {
        Self {
            sandbox: CommandSandbox::new(),
            config,
        }
    }
}

impl Default for ShellTool {
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Run a whitelisted shell command inside the restricted sandbox. Returns stdout, stderr, and the exit code."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The command to run"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in seconds (defaults to the sandbox config)"
                }
            },
            "required": ["command"]
        })
    }

    fn execute(
        &self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let params: ShellInput = serde_json::from_value(input)
                .map_err(|e| WeftError::ToolValidation(e.to_string()))?;

            let mut opts = RunOptions::from_config(&self.config);
            opts.working_dir = ctx.working_dir.clone();
            if let Some(secs) = params.timeout {
                opts.timeout = Duration::from_secs(secs);
            }

            debug!(command = %params.command, "Running sandboxed shell command");
            let result = self.sandbox.run(&params.command, &opts).await;

            Ok(serde_json::json!({
                "stdout": result.stdout,
                "stderr": result.stderr,
                "exitCode": result.exit_code,
                "success": result.success,
            }))
        })
    }

    fn timeout_secs(&self) -> u64 {
        // The sandbox enforces its own wall clock; leave headroom above it.
        self.config.timeout_secs + 5
    }
}
