//! MCP protocol implementation for JSON-RPC 2.0 communication.
//!
//! This module provides the core MCP server implementation including:
//! - JSON-RPC 2.0 request/response handling
//! - Tool definitions and schemas
//! - Stdio-based server communication

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};

use super::{handle_tool_call, SharedState};

#[cfg(test)]
#[path = "mcp_tests.rs"]
mod mcp_tests;

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    /// Request identifier (None for notifications).
    pub id: Option<Value>,
    /// The method name to invoke.
    pub method: String,
    /// Optional parameters for the method.
    #[serde(default)]
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0").
    pub jsonrpc: String,
    /// Request identifier (null if notification, always present in JSON-RPC 2.0).
    pub id: Value,
    /// The result on success (mutually exclusive with error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The error on failure (mutually exclusive with result).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    /// Error code (negative for predefined errors).
    pub code: i32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// MCP server information returned during initialization.
#[derive(Debug, Serialize)]
pub struct ServerInfo {
    /// The server name identifier.
    pub name: String,
    /// The server version string.
    pub version: String,
}

/// MCP server capabilities advertised to clients.
#[derive(Debug, Serialize)]
pub struct Capabilities {
    /// Tool-related capabilities.
    pub tools: ToolCapabilities,
}

/// Tool-specific capabilities.
#[derive(Debug, Serialize)]
pub struct ToolCapabilities {
    /// Whether the tool list can change dynamically.
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

/// Result of the MCP initialize handshake.
#[derive(Debug, Serialize)]
pub struct InitializeResult {
    /// The MCP protocol version supported.
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// Server capabilities.
    pub capabilities: Capabilities,
    /// Server identification information.
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

/// MCP tool definition with JSON Schema.
#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    /// Unique tool name (used in tool calls).
    pub name: String,
    /// Human-readable description of the tool.
    pub description: String,
    /// JSON Schema for the tool's input parameters.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Parameters for a tools/call request.
#[derive(Debug, Deserialize)]
pub struct ToolCallParams {
    /// The name of the tool to invoke.
    pub name: String,
    /// Optional arguments for the tool.
    #[serde(default)]
    pub arguments: Option<Value>,
}

/// Content item within a tool result.
#[derive(Debug, Serialize)]
pub struct ToolResultContent {
    /// The content type (e.g., "text").
    #[serde(rename = "type")]
    pub content_type: String,
    /// The text content of the result.
    pub text: String,
}

/// Result of a tool invocation.
#[derive(Debug, Serialize)]
pub struct ToolCallResult {
    /// The result content items.
    pub content: Vec<ToolResultContent>,
    /// Whether the result represents an error.
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// MCP Server running over stdio.
///
/// Host events and renderer queries arrive as tool calls, one JSON-RPC
/// message per line.
pub struct McpServer {
    /// Shared application state.
    state: SharedState,
}

impl McpServer {
    /// Create a new MCP server
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Run the server using async stdio
    pub async fn run(&self) -> std::io::Result<()> {
        info!("Research navigator server starting...");
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    /// Serve line-delimited JSON-RPC from `reader` until EOF.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;

            // EOF reached
            if bytes_read == 0 {
                info!("EOF received, shutting down");
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            // Only send response if not a notification (per JSON-RPC 2.0 spec)
            if let Some(response) = self.handle_message(trimmed).await {
                let response_json = serde_json::to_string(&response)?;
                debug!(response = %response_json, "Sending response");

                writer.write_all(response_json.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }

        Ok(())
    }

    /// Handle one raw message line.
    pub async fn handle_message(&self, message: &str) -> Option<JsonRpcResponse> {
        debug!(request = %message, "Received request");

        match serde_json::from_str::<JsonRpcRequest>(message) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => {
                error!(error = %e, "Failed to parse request");
                Some(JsonRpcResponse::error(
                    None,
                    -32700,
                    format!("Parse error: {}", e),
                ))
            }
        }
    }

    /// Handle a single JSON-RPC request
    /// Returns None for notifications (requests without id) per JSON-RPC 2.0 spec
    async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        // Check if this is a notification (no id = no response required)
        let is_notification = request.id.is_none();

        match request.method.as_str() {
            "initialize" => Some(self.handle_initialize(request.id)),
            "initialized" | "notifications/initialized" => {
                debug!("Received initialized notification");
                None
            }
            "notifications/cancelled" => {
                debug!("Received cancelled notification");
                None
            }
            "tools/list" => Some(self.handle_tools_list(request.id)),
            "tools/call" => Some(self.handle_tool_call(request.id, request.params).await),
            "ping" => Some(JsonRpcResponse::success(
                request.id,
                Value::Object(Default::default()),
            )),
            method => {
                // For unknown methods, only respond if it's a request (has id)
                if is_notification {
                    debug!(method = %method, "Unknown notification, ignoring");
                    None
                } else {
                    error!(method = %method, "Unknown method");
                    Some(JsonRpcResponse::error(
                        request.id,
                        -32601,
                        format!("Method not found: {}", method),
                    ))
                }
            }
        }
    }

    /// Handle initialize request
    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        info!("Handling initialize request");

        let result = InitializeResult {
            protocol_version: "2024-11-05".to_string(),
            capabilities: Capabilities {
                tools: ToolCapabilities {
                    list_changed: false,
                },
            },
            server_info: ServerInfo {
                name: "research-navigator".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        match serde_json::to_value(result) {
            Ok(val) => JsonRpcResponse::success(id, val),
            Err(e) => {
                error!(error = %e, "Failed to serialize initialize result");
                JsonRpcResponse::error(id, -32603, format!("Internal error: {}", e))
            }
        }
    }

    /// Handle tools/list request
    fn handle_tools_list(&self, id: Option<Value>) -> JsonRpcResponse {
        info!("Handling tools/list request");

        JsonRpcResponse::success(
            id,
            serde_json::json!({
                "tools": tool_definitions()
            }),
        )
    }

    /// Handle tools/call request
    async fn handle_tool_call(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: ToolCallParams = match params {
            Some(p) => match serde_json::from_value(p) {
                Ok(p) => p,
                Err(e) => {
                    return JsonRpcResponse::error(id, -32602, format!("Invalid params: {}", e));
                }
            },
            None => {
                return JsonRpcResponse::error(id, -32602, "Missing params");
            }
        };

        info!(tool = %params.name, "Handling tool call");

        let (content, is_error) =
            match handle_tool_call(&self.state, &params.name, params.arguments).await {
                Ok(result) => {
                    let text = serde_json::to_string_pretty(&result).unwrap_or_else(|e| {
                        error!(error = %e, "Failed to serialize tool result");
                        format!("{{\"error\": \"Serialization failed: {}\"}}", e)
                    });
                    (
                        ToolResultContent {
                            content_type: "text".to_string(),
                            text,
                        },
                        None,
                    )
                }
                Err(e) => (
                    ToolResultContent {
                        content_type: "text".to_string(),
                        text: format!("Error: {}", e),
                    },
                    Some(true),
                ),
            };

        let tool_result = ToolCallResult {
            content: vec![content],
            is_error,
        };

        match serde_json::to_value(tool_result) {
            Ok(val) => JsonRpcResponse::success(id, val),
            Err(e) => {
                error!(error = %e, "Failed to serialize tool call result");
                JsonRpcResponse::error(id.clone(), -32603, format!("Internal error: {}", e))
            }
        }
    }
}

/// Every tool the server exposes.
pub fn tool_definitions() -> Vec<Tool> {
    vec![
        // Host events
        get_item_selected_tool(),
        get_tab_opened_tool(),
        get_tab_closed_tool(),
        get_tab_selected_tool(),
        // Navigation
        get_tree_tool(),
        get_current_tool(),
        get_navigation_tool("history_back", "Step back to the previously active node."),
        get_navigation_tool("history_forward", "Step forward after going back."),
        get_navigation_tool(
            "history_parent",
            "Move to the parent of the active node, if it has one.",
        ),
        get_select_tool(),
        // Discovery
        get_search_tool(),
        get_recommend_tool(),
        get_stats_tool(),
        get_closed_tabs_tool(),
        // Note links
        get_associate_note_tool(),
        get_dissociate_note_tool(),
        get_note_links_tool(),
        get_note_stats_tool(),
        // Maintenance
        get_annotate_tool(),
        get_export_tool(),
        get_import_tool(),
        get_clear_tool(),
    ]
}

fn item_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "id": { "type": "integer", "description": "Library item id" },
            "key": { "type": "string", "description": "Library item key" },
            "title": { "type": "string" },
            "item_type": { "type": "string", "description": "Item type, e.g. journalArticle, note, attachment" },
            "creators": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "first_name": { "type": "string" },
                        "last_name": { "type": "string" }
                    }
                }
            },
            "year": { "type": "string" },
            "doi": { "type": "string" },
            "tags": { "type": "array", "items": { "type": "string" } },
            "collections": { "type": "array", "items": { "type": "integer" } },
            "related_item_keys": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["id"]
    })
}

fn timestamp_schema() -> Value {
    serde_json::json!({
        "type": "string",
        "format": "date-time",
        "description": "Event time (RFC 3339). Defaults to now."
    })
}

/// Get the item selected tool definition
fn get_item_selected_tool() -> Tool {
    Tool {
        name: "history_item_selected".to_string(),
        description: "Record that an item was selected in the library. Quick successive selections build a chain; notes and attachments are ignored.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "item": item_schema(),
                "timestamp": timestamp_schema()
            },
            "required": ["item"],
            "additionalProperties": false
        }),
    }
}

/// Get the tab opened tool definition
fn get_tab_opened_tool() -> Tool {
    Tool {
        name: "history_tab_opened".to_string(),
        description: "Record that a reader tab was opened on an item.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "tab_id": { "type": "string", "description": "Host tab id" },
                "item": item_schema(),
                "timestamp": timestamp_schema()
            },
            "required": ["tab_id", "item"],
            "additionalProperties": false
        }),
    }
}

/// Get the tab closed tool definition
fn get_tab_closed_tool() -> Tool {
    Tool {
        name: "history_tab_closed".to_string(),
        description: "Record that a reader tab was closed.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "tab_id": { "type": "string", "description": "Host tab id" },
                "timestamp": timestamp_schema()
            },
            "required": ["tab_id"],
            "additionalProperties": false
        }),
    }
}

/// Get the tab selected tool definition
fn get_tab_selected_tool() -> Tool {
    Tool {
        name: "history_tab_selected".to_string(),
        description: "Record that a reader tab was brought to front. Unknown tabs are treated as newly opened on the given item.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "tab_id": { "type": "string", "description": "Host tab id" },
                "item": item_schema(),
                "timestamp": timestamp_schema()
            },
            "required": ["tab_id"],
            "additionalProperties": false
        }),
    }
}

/// Get the tree data tool definition
fn get_tree_tool() -> Tool {
    Tool {
        name: "history_tree".to_string(),
        description: "Get the history as sessions (newest first) with nested nodes, optionally filtered.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Keep trees containing a node matching this text" },
                "relation": {
                    "type": "string",
                    "enum": ["manual", "citation", "author", "tag", "collection", "related", "temporal", "tab"],
                    "description": "Keep trees containing a node with this relation"
                },
                "min_importance": {
                    "type": "integer",
                    "minimum": 0,
                    "maximum": 5,
                    "description": "Keep trees containing a node rated at least this high"
                }
            },
            "additionalProperties": false
        }),
    }
}

/// Get the current node tool definition
fn get_current_tool() -> Tool {
    Tool {
        name: "history_current".to_string(),
        description: "Get the active node and the back/forward/parent availability.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        }),
    }
}

/// Build a parameterless navigation tool definition
fn get_navigation_tool(name: &str, description: &str) -> Tool {
    Tool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        }),
    }
}

/// Get the select node tool definition
fn get_select_tool() -> Tool {
    Tool {
        name: "history_select".to_string(),
        description: "Make a node active and push it onto the navigation history.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "node_id": { "type": "string", "description": "Node id" }
            },
            "required": ["node_id"],
            "additionalProperties": false
        }),
    }
}

/// Get the search tool definition
fn get_search_tool() -> Tool {
    Tool {
        name: "history_search".to_string(),
        description: "Search visited items by title, creators, tags and notes.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "limit": { "type": "integer", "minimum": 1, "description": "Maximum results (default: 20)" }
            },
            "required": ["query"],
            "additionalProperties": false
        }),
    }
}

/// Get the recommend tool definition
fn get_recommend_tool() -> Tool {
    Tool {
        name: "history_recommend".to_string(),
        description: "Suggest previously visited items related to a node through co-authors or shared tags.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "node_id": { "type": "string", "description": "Node id (default: active node)" },
                "limit": { "type": "integer", "minimum": 1, "description": "Maximum results (default: 5)" }
            },
            "additionalProperties": false
        }),
    }
}

/// Get the statistics tool definition
fn get_stats_tool() -> Tool {
    Tool {
        name: "history_stats".to_string(),
        description: "Get history statistics: totals, most visited items, daily activity and tags.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "top": { "type": "integer", "minimum": 1, "description": "Number of top items (default: 10)" }
            },
            "additionalProperties": false
        }),
    }
}

/// Get the closed tabs tool definition
fn get_closed_tabs_tool() -> Tool {
    Tool {
        name: "history_closed_tabs".to_string(),
        description: "List recently closed tabs, most recent first.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "limit": { "type": "integer", "minimum": 1, "description": "Maximum results (default: 10)" }
            },
            "additionalProperties": false
        }),
    }
}

/// Get the annotate tool definition
fn get_annotate_tool() -> Tool {
    Tool {
        name: "history_annotate".to_string(),
        description: "Set the note and/or importance rating (0-5) of a node.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "node_id": { "type": "string", "description": "Node id" },
                "note": { "type": "string" },
                "importance": { "type": "integer", "minimum": 0, "maximum": 5 }
            },
            "required": ["node_id"],
            "additionalProperties": false
        }),
    }
}

/// Get the associate-note tool definition
fn get_associate_note_tool() -> Tool {
    Tool {
        name: "history_associate_note".to_string(),
        description: "Link a library note to a history node (the active node by default). \
            Linking the same pair again changes the link kind."
            .to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "note_id": { "type": "integer", "description": "Host note item id" },
                "node_id": { "type": "string", "description": "Node id; defaults to the active node" },
                "kind": {
                    "type": "string",
                    "enum": ["created_during", "inspired_by", "summarizes", "questions", "manual"],
                    "default": "created_during"
                },
                "timestamp": { "type": "string", "format": "date-time" }
            },
            "required": ["note_id"],
            "additionalProperties": false
        }),
    }
}

/// Get the dissociate-note tool definition
fn get_dissociate_note_tool() -> Tool {
    Tool {
        name: "history_dissociate_note".to_string(),
        description: "Remove the link between a library note and a history node.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "note_id": { "type": "integer" },
                "node_id": { "type": "string" }
            },
            "required": ["note_id", "node_id"],
            "additionalProperties": false
        }),
    }
}

/// Get the note-links tool definition
fn get_note_links_tool() -> Tool {
    Tool {
        name: "history_note_links".to_string(),
        description: "List the notes linked to a node, or the nodes linked to a note.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "node_id": { "type": "string" },
                "note_id": { "type": "integer" }
            },
            "additionalProperties": false
        }),
    }
}

/// Get the note-stats tool definition
fn get_note_stats_tool() -> Tool {
    Tool {
        name: "history_note_stats".to_string(),
        description: "Count note links per kind and list the most recent ones.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "recent": { "type": "integer", "minimum": 0, "default": 10 }
            },
            "additionalProperties": false
        }),
    }
}

/// Get the export tool definition
fn get_export_tool() -> Tool {
    Tool {
        name: "history_export".to_string(),
        description: "Export the whole history as a JSON document.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        }),
    }
}

/// Get the import tool definition
fn get_import_tool() -> Tool {
    Tool {
        name: "history_import".to_string(),
        description: "Merge a previously exported history document. Nodes already present are skipped.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "document": {
                    "description": "Export document, as an object or a JSON string"
                }
            },
            "required": ["document"],
            "additionalProperties": false
        }),
    }
}

/// Get the clear tool definition
fn get_clear_tool() -> Tool {
    Tool {
        name: "history_clear".to_string(),
        description: "Delete all history, in memory and in storage.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        }),
    }
}
