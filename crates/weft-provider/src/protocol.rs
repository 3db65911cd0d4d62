//! Wire format spoken to external tool providers: newline-delimited
//! JSON-RPC 2.0 over the child's standard streams, one request one response,
//! matched by request id.

use serde::Deserialize;
use serde_json::Value;

use weft_core::error::{Result, WeftError};

/// Protocol revision declared during the handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_INITIALIZED: &str = "notifications/initialized";
pub const METHOD_LIST_TOOLS: &str = "tools/list";
pub const METHOD_CALL_TOOL: &str = "tools/call";

/// Encode a request as a single line (no trailing newline).
pub fn request(id: u64, method: &str, params: Value) -> String {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    })
    .to_string()
}

/// Encode a notification (no id, no response expected).
pub fn notification(method: &str, params: Value) -> String {
    serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
    })
    .to_string()
}

/// Handshake parameters: client name/version, no extended capabilities.
pub fn initialize_params() -> Value {
    serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "clientInfo": {
            "name": "weft",
            "version": env!("CARGO_PKG_VERSION"),
        },
        "capabilities": {},
    })
}

/// A provider-reported JSON-RPC error.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

/// One parsed incoming line.
#[derive(Debug)]
pub enum Frame {
    Response {
        id: u64,
        result: std::result::Result<Value, RpcError>,
    },
    Notification {
        method: String,
    },
}

/// Parse one line from the provider. Malformed input is a transport failure,
/// distinct from a provider-reported error.
pub fn parse_frame(line: &str) -> Result<Frame> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| WeftError::Transport(format!("malformed provider frame: {}", e)))?;

    if let Some(id) = value.get("id").and_then(Value::as_u64) {
        if let Some(error) = value.get("error") {
            let rpc: RpcError = serde_json::from_value(error.clone()).map_err(|e| {
                WeftError::Transport(format!("malformed provider error object: {}", e))
            })?;
            return Ok(Frame::Response {
                id,
                result: Err(rpc),
            });
        }
        let result = value.get("result").cloned().unwrap_or(Value::Null);
        return Ok(Frame::Response {
            id,
            result: Ok(result),
        });
    }

    if let Some(method) = value.get("method").and_then(Value::as_str) {
        return Ok(Frame::Notification {
            method: method.to_string(),
        });
    }

    Err(WeftError::Transport(
        "provider frame has neither id nor method".to_string(),
    ))
}

/// One entry of a provider's tool catalogue.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

#[derive(Debug, Deserialize)]
pub struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
}

#[derive(Debug, Deserialize)]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<ContentItem>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

#[derive(Debug, Deserialize)]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: String,
}

impl CallToolResult {
    /// Concatenated text content.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter(|c| c.kind == "text")
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_encoding() {
        let line = request(3, METHOD_LIST_TOOLS, serde_json::json!({}));
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["id"], 3);
        assert_eq!(value["method"], "tools/list");
        assert!(!line.contains('\n'));
    }

    #[test]
    fn parse_success_response() {
        let frame = parse_frame(r#"{"jsonrpc":"2.0","id":1,"result":{"ok":true}}"#).unwrap();
        match frame {
            Frame::Response { id, result } => {
                assert_eq!(id, 1);
                assert_eq!(result.unwrap()["ok"], true);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn parse_error_response() {
        let frame =
            parse_frame(r#"{"jsonrpc":"2.0","id":2,"error":{"code":-32601,"message":"nope"}}"#)
                .unwrap();
        match frame {
            Frame::Response { id, result } => {
                assert_eq!(id, 2);
                let rpc = result.unwrap_err();
                assert_eq!(rpc.code, -32601);
                assert_eq!(rpc.message, "nope");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn parse_notification() {
        let frame =
            parse_frame(r#"{"jsonrpc":"2.0","method":"notifications/tools/list_changed"}"#)
                .unwrap();
        assert!(matches!(frame, Frame::Notification { method } if method.ends_with("list_changed")));
    }

    #[test]
    fn malformed_line_is_transport_error() {
        let err = parse_frame("not json at all").unwrap_err();
        assert!(matches!(err, WeftError::Transport(_)));
    }

    #[test]
    fn call_result_text_joins_content() {
        let result: CallToolResult = serde_json::from_str(
            r#"{"content":[{"type":"text","text":"a"},{"type":"text","text":"b"}],"isError":false}"#,
        )
        .unwrap();
        assert_eq!(result.text(), "a\nb");
        assert!(!result.is_error);
    }
}
