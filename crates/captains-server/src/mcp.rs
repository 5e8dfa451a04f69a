//! Model Context Protocol request routing.
//!
//! Transport-independent: each transport hands raw JSON messages to
//! [`McpServer::handle_message`] and writes back whatever response comes
//! out. Notifications produce no response.

use serde_json::{json, Value};

use crate::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION};
use crate::tools::ToolHandler;

/// MCP revision this server speaks.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Name reported in `initialize`.
pub const SERVER_NAME: &str = "captains-log";

/// Routes JSON-RPC messages to MCP methods.
#[derive(Clone, Debug)]
pub struct McpServer {
    tools: ToolHandler,
}

impl McpServer {
    pub fn new(tools: ToolHandler) -> Self {
        Self { tools }
    }

    /// Parses and handles one raw JSON-RPC message.
    ///
    /// Returns `None` for notifications.
    pub async fn handle_message(&self, raw: &str) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(error = %e, "unparsable JSON-RPC message");
                return Some(JsonRpcResponse::error(
                    None,
                    JsonRpcError::parse_error(format!("invalid JSON: {e}")),
                ));
            }
        };

        // Keep the id, if there is one, so even malformed requests can be
        // answered against it.
        let id = value.get("id").cloned().filter(|id| !id.is_null());

        match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => Some(JsonRpcResponse::error(
                id,
                JsonRpcError::invalid_request(format!("malformed request: {e}")),
            )),
        }
    }

    /// Handles one parsed request or notification.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.jsonrpc != JSONRPC_VERSION {
            return Some(JsonRpcResponse::error(
                request.id,
                JsonRpcError::invalid_request("jsonrpc must be '2.0'"),
            ));
        }

        if request.is_notification() {
            tracing::debug!(method = %request.method, "notification received");
            return None;
        }

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.id),
            "ping" => JsonRpcResponse::success(request.id, json!({})),
            "tools/list" => self.handle_tools_list(request.id),
            "tools/call" => self.handle_tools_call(request.id, request.params).await,
            other => JsonRpcResponse::error(request.id, JsonRpcError::method_not_found(other)),
        };
        Some(response)
    }

    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION")
                },
                "capabilities": {
                    "tools": {}
                }
            }),
        )
    }

    fn handle_tools_list(&self, id: Option<Value>) -> JsonRpcResponse {
        JsonRpcResponse::success(id, json!({ "tools": self.tools.list_tools() }))
    }

    async fn handle_tools_call(&self, id: Option<Value>, params: Value) -> JsonRpcResponse {
        let Some(params) = params.as_object() else {
            return JsonRpcResponse::error(id, JsonRpcError::invalid_params("params must be an object"));
        };

        let Some(tool_name) = params.get("name").and_then(Value::as_str) else {
            return JsonRpcResponse::error(id, JsonRpcError::invalid_params("missing 'name' field"));
        };

        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

        match self.tools.execute(tool_name, arguments).await {
            Ok(result) => JsonRpcResponse::success(id, tool_result(result)),
            Err(e) => {
                tracing::warn!(tool = tool_name, kind = e.kind(), error = %e, "tool call failed");
                JsonRpcResponse::error(id, e.to_rpc_error())
            }
        }
    }
}

/// Wraps a tool's JSON value in an MCP `CallToolResult`.
///
/// Strings are passed through as text; everything else is rendered as
/// JSON.
fn tool_result(result: Value) -> Value {
    let text = match &result {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    json!({
        "content": [
            {
                "type": "text",
                "text": text
            }
        ],
        "structuredContent": {
            "result": result
        },
        "isError": false
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use captains_db::{open_database, DbRuntimeSettings, MEMORY_PATH};
    use captains_log::Journal;

    fn server() -> McpServer {
        let pool = open_database(MEMORY_PATH, DbRuntimeSettings::default())
            .expect("database should open");
        McpServer::new(ToolHandler::new(Journal::new(pool)))
    }

    #[tokio::test]
    async fn initialize_reports_server_info() {
        let response = server()
            .handle_message(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#)
            .await
            .expect("requests get responses");
        let result = response.result.expect("success");
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], SERVER_NAME);
        assert!(result["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let response = server()
            .handle_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn garbage_is_a_parse_error() {
        let response = server().handle_message("{not json").await.expect("response");
        assert_eq!(response.error.expect("error").code, JsonRpcError::PARSE_ERROR);
        assert!(response.id.is_none());
    }

    #[tokio::test]
    async fn missing_method_is_an_invalid_request() {
        let response = server()
            .handle_message(r#"{"jsonrpc":"2.0","id":7}"#)
            .await
            .expect("response");
        assert_eq!(response.error.expect("error").code, JsonRpcError::INVALID_REQUEST);
        assert_eq!(response.id, Some(json!(7)));
    }

    #[tokio::test]
    async fn wrong_version_is_rejected() {
        let response = server()
            .handle_message(r#"{"jsonrpc":"1.0","id":1,"method":"ping"}"#)
            .await
            .expect("response");
        assert_eq!(response.error.expect("error").code, JsonRpcError::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn unknown_method_is_reported() {
        let response = server()
            .handle_message(r#"{"jsonrpc":"2.0","id":"x","method":"resources/list"}"#)
            .await
            .expect("response");
        assert_eq!(response.error.expect("error").code, JsonRpcError::METHOD_NOT_FOUND);
        assert_eq!(response.id, Some(json!("x")));
    }

    #[tokio::test]
    async fn tools_call_wraps_result_as_text_content() {
        let response = server()
            .handle_message(
                r#"{"jsonrpc":"2.0","id":2,"method":"tools/call",
                    "params":{"name":"add","arguments":{"a":5,"b":3}}}"#,
            )
            .await
            .expect("response");
        let result = response.result.expect("success");
        assert_eq!(result["content"][0]["type"], "text");
        assert_eq!(result["content"][0]["text"], "8.0");
        assert_eq!(result["structuredContent"]["result"], json!(8.0));
    }

    #[tokio::test]
    async fn tools_call_without_name_is_invalid_params() {
        let response = server()
            .handle_message(r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{}}"#)
            .await
            .expect("response");
        assert_eq!(response.error.expect("error").code, JsonRpcError::INVALID_PARAMS);
    }
}
