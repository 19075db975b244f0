//! MCP (JSON-RPC 2.0) message handling shared by both transports.
//!
//! Only the tool surface is implemented: `initialize`, `ping`, `tools/list`
//! and `tools/call` for the single `audio_playback` tool.

use audio_playback_types::{ToolCall, ToolResponse};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::dispatcher::ToolDispatcher;

pub const JSONRPC_VERSION: &str = "2.0";
pub const TOOL_NAME: &str = "audio_playback";
pub const SERVER_NAME: &str = "audio-playback-server";
/// Newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: [&str; 3] = ["2025-06-18", "2025-03-26", "2024-11-05"];

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;

const TOOL_DESCRIPTION: &str = "Control playback of local audio files for automated testing. \
Audio is played via a virtual audio output device that is routed into the Android emulator's \
microphone. Use this to simulate a human speaking into the mic by playing prerecorded files.";

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

/// Routes JSON-RPC messages to the tool dispatcher.
#[derive(Clone)]
pub struct McpServer {
    dispatcher: ToolDispatcher,
}

impl McpServer {
    pub fn new(dispatcher: ToolDispatcher) -> Self {
        Self { dispatcher }
    }

    /// Handle one raw message. `None` means nothing should be sent back.
    pub async fn handle_text(&self, raw: &str) -> Option<JsonRpcResponse> {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => self.handle_value(value).await,
            Err(e) => {
                tracing::warn!(error = %e, "unparsable json-rpc message");
                Some(JsonRpcResponse::error(
                    Value::Null,
                    PARSE_ERROR,
                    format!("Parse error: {e}"),
                ))
            }
        }
    }

    pub async fn handle_value(&self, value: Value) -> Option<JsonRpcResponse> {
        let id = value.get("id").cloned().unwrap_or(Value::Null);
        if !value.is_object() {
            return Some(JsonRpcResponse::error(
                Value::Null,
                INVALID_REQUEST,
                "Invalid Request: expected a single JSON-RPC object",
            ));
        }
        match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => Some(JsonRpcResponse::error(
                id,
                INVALID_REQUEST,
                format!("Invalid Request: {e}"),
            )),
        }
    }

    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.jsonrpc.as_deref().is_some_and(|v| v != JSONRPC_VERSION) {
            tracing::debug!(version = ?request.jsonrpc, "unexpected jsonrpc version");
        }
        let Some(id) = request.id else {
            tracing::debug!(method = %request.method, "notification");
            return None;
        };

        let params = request.params.unwrap_or(Value::Null);
        let result = match request.method.as_str() {
            "initialize" => Ok(initialize_result(&params)),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": [tool_definition()] })),
            "tools/call" => self.call_tool(params).await,
            other => {
                tracing::debug!(method = %other, "unknown method");
                Err((METHOD_NOT_FOUND, format!("Method not found: {other}")))
            }
        };

        Some(match result {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err((code, message)) => JsonRpcResponse::error(id, code, message),
        })
    }

    async fn call_tool(&self, params: Value) -> Result<Value, (i64, String)> {
        let params: CallToolParams = serde_json::from_value(params)
            .map_err(|e| (INVALID_PARAMS, format!("Invalid params: {e}")))?;
        if params.name != TOOL_NAME {
            return Err((INVALID_PARAMS, format!("Unknown tool: {}", params.name)));
        }
        let arguments = params.arguments.unwrap_or_else(|| json!({}));
        let call: ToolCall = serde_json::from_value(arguments)
            .map_err(|e| (INVALID_PARAMS, format!("Invalid arguments for {TOOL_NAME}: {e}")))?;

        let response = self.dispatcher.dispatch(call).await;
        Ok(tool_result(&response))
    }
}

fn initialize_result(params: &Value) -> Value {
    let requested = params.get("protocolVersion").and_then(Value::as_str);
    let version = requested
        .filter(|v| SUPPORTED_PROTOCOL_VERSIONS.contains(v))
        .unwrap_or(SUPPORTED_PROTOCOL_VERSIONS[0]);
    json!({
        "protocolVersion": version,
        "capabilities": { "tools": { "listChanged": false } },
        "serverInfo": { "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") },
        "instructions": "Use the audio_playback tool to play, stop, inspect, and list prerecorded audio files.",
    })
}

fn tool_result(response: &ToolResponse) -> Value {
    let structured = serde_json::to_value(response).unwrap_or(Value::Null);
    json!({
        "content": [{ "type": "text", "text": structured.to_string() }],
        "structuredContent": structured,
        "isError": !response.success,
    })
}

/// Tool metadata advertised by `tools/list`.
pub fn tool_definition() -> Value {
    json!({
        "name": TOOL_NAME,
        "description": TOOL_DESCRIPTION,
        "inputSchema": {
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["play", "stop", "status", "list_files"],
                    "description": "Operation to perform."
                },
                "filename": {
                    "type": "string",
                    "description": "File relative to AUDIO_ROOT_DIR; the default format is appended when no extension is given. Required for play."
                },
                "loop": {
                    "type": "boolean",
                    "default": false,
                    "description": "Loop until stopped."
                },
                "start_offset_ms": {
                    "type": "integer",
                    "minimum": 0,
                    "default": 0,
                    "description": "Start position in milliseconds."
                },
                "list_limit": {
                    "type": "integer",
                    "minimum": 0,
                    "default": 200,
                    "description": "Maximum number of files returned by list_files."
                }
            },
            "required": ["action"]
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::clock::manual::ManualClock;
    use crate::paths::PathResolver;
    use crate::player::PlayerCommand;
    use crate::supervisor::PlaybackSupervisor;
    use crate::test_support;

    fn server(root: &std::path::Path) -> McpServer {
        let supervisor = PlaybackSupervisor::new(
            PathResolver::new(root, "wav", 8).unwrap(),
            PlayerCommand::new("/definitely/not/ffplay", "virtual-mic"),
            Arc::new(ManualClock::new(0)),
            Duration::from_millis(100),
        );
        McpServer::new(ToolDispatcher::new(Arc::new(supervisor)))
    }

    #[tokio::test]
    async fn initialize_negotiates_protocol_version() {
        let (_dir, root) = test_support::audio_root(&[]);
        let srv = server(&root);

        let resp = srv
            .handle_text(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05"}}"#)
            .await
            .unwrap();
        let result = resp.result.unwrap();
        assert_eq!(result["protocolVersion"], "2024-11-05");
        assert_eq!(result["serverInfo"]["name"], SERVER_NAME);
        assert!(result["capabilities"]["tools"].is_object());

        let resp = srv
            .handle_text(r#"{"jsonrpc":"2.0","id":2,"method":"initialize","params":{"protocolVersion":"1999-01-01"}}"#)
            .await
            .unwrap();
        assert_eq!(resp.result.unwrap()["protocolVersion"], SUPPORTED_PROTOCOL_VERSIONS[0]);
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let (_dir, root) = test_support::audio_root(&[]);
        let srv = server(&root);
        assert!(
            srv.handle_text(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn malformed_and_unknown_messages_map_to_protocol_errors() {
        let (_dir, root) = test_support::audio_root(&[]);
        let srv = server(&root);

        let resp = srv.handle_text("{not json").await.unwrap();
        assert_eq!(resp.error.unwrap().code, PARSE_ERROR);
        assert_eq!(resp.id, Value::Null);

        let resp = srv.handle_text("[1,2]").await.unwrap();
        assert_eq!(resp.error.unwrap().code, INVALID_REQUEST);

        let resp = srv
            .handle_text(r#"{"jsonrpc":"2.0","id":"x","method":"resources/list"}"#)
            .await
            .unwrap();
        assert_eq!(resp.id, json!("x"));
        assert_eq!(resp.error.unwrap().code, METHOD_NOT_FOUND);

        let resp = srv
            .handle_text(r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"other"}}"#)
            .await
            .unwrap();
        assert_eq!(resp.error.unwrap().code, INVALID_PARAMS);

        let resp = srv
            .handle_text(r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"audio_playback","arguments":{"action":"play","loop":"yes"}}}"#)
            .await
            .unwrap();
        assert_eq!(resp.error.unwrap().code, INVALID_PARAMS);
    }

    #[tokio::test]
    async fn tools_list_advertises_audio_playback() {
        let (_dir, root) = test_support::audio_root(&[]);
        let srv = server(&root);
        let resp = srv
            .handle_text(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#)
            .await
            .unwrap();
        let tools = resp.result.unwrap()["tools"].clone();
        assert_eq!(tools.as_array().unwrap().len(), 1);
        assert_eq!(tools[0]["name"], TOOL_NAME);
        assert_eq!(tools[0]["inputSchema"]["required"], json!(["action"]));
    }

    #[tokio::test]
    async fn tool_failures_are_results_not_protocol_errors() {
        let (_dir, root) = test_support::audio_root(&["song.wav"]);
        let srv = server(&root);
        let resp = srv
            .handle_text(r#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":"audio_playback","arguments":{"action":"play","filename":"../secret.wav"}}}"#)
            .await
            .unwrap();
        assert!(resp.error.is_none());
        let result = resp.result.unwrap();
        assert_eq!(result["isError"], true);
        let envelope = &result["structuredContent"];
        assert_eq!(envelope["success"], false);
        assert_eq!(envelope["state"]["status"], "Idle");
        let text = result["content"][0]["text"].as_str().unwrap();
        let decoded: ToolResponse = serde_json::from_str(text).unwrap();
        assert!(!decoded.success);
    }

    #[tokio::test]
    async fn list_files_call_includes_listing() {
        let (_dir, root) = test_support::audio_root(&["a.wav", "b.wav"]);
        let srv = server(&root);
        let resp = srv
            .handle_text(r#"{"jsonrpc":"2.0","id":8,"method":"tools/call","params":{"name":"audio_playback","arguments":{"action":"list_files","list_limit":1}}}"#)
            .await
            .unwrap();
        let result = resp.result.unwrap();
        assert_eq!(result["isError"], false);
        assert_eq!(result["structuredContent"]["files"]["count"], 2);
        assert_eq!(result["structuredContent"]["files"]["files"][0]["filename"], "a.wav");
    }
}
