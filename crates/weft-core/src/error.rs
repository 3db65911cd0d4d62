use thiserror::Error;

#[derive(Debug, Error)]
pub enum WeftError {
    // Structural errors
    #[error("Automation '{0}' has no trigger nodes")]
    NoTrigger(String),

    #[error("Node '{node}' not found in automation '{automation}'")]
    NodeNotFound { automation: String, node: String },

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Condition set not found: {0}")]
    ConditionSetNotFound(String),

    // Routing errors
    #[error("No condition satisfied for node '{node}'")]
    NoConditionSatisfied { node: String },

    #[error("Predicate error: {0}")]
    Predicate(String),

    // Capability errors
    #[error("Tool execution failed: {tool}: {message}")]
    Capability { tool: String, message: String },

    #[error("Tool timeout after {timeout_secs}s: {tool}")]
    ToolTimeout { tool: String, timeout_secs: u64 },

    #[error("Tool input validation failed: {0}")]
    ToolValidation(String),

    // Provider errors: SandboxLoad covers spawn/handshake, Provider is an
    // error the provider itself reported, Transport is a broken session.
    #[error("Sandbox load failed: {0}")]
    SandboxLoad(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Transport error: {0}")]
    Transport(String),

    // Execution errors (aborted branch tasks)
    #[error("Execution error: {0}")]
    Execution(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WeftError>;
