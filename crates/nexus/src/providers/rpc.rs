//! JSON-RPC 2.0 messages exchanged with compute providers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::content::{ContentBlock, ToolResult};
use crate::models::tool::Tool;

pub const JSONRPC_VERSION: &str = "2.0";
pub const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl<'a> JsonRpcRequest<'a> {
    pub fn new(id: u64, method: &'a str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JsonRpcNotification<'a> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
}

impl<'a> JsonRpcNotification<'a> {
    pub fn new(method: &'a str) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub name: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: &'static str,
    pub capabilities: Value,
    pub client_info: ClientInfo,
}

impl Default for InitializeParams {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            capabilities: Value::Object(Default::default()),
            client_info: ClientInfo {
                name: "nexus",
                version: env!("CARGO_PKG_VERSION"),
            },
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct ListToolsParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<Tool>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CallToolParams<'a> {
    pub name: &'a str,
    pub arguments: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<Value>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub structured_content: Option<Value>,
}

impl From<CallToolResult> for ToolResult {
    fn from(result: CallToolResult) -> Self {
        let mut content: Vec<ContentBlock> = result.content.into_iter().map(content_block).collect();
        if content.is_empty() {
            if let Some(structured) = result.structured_content {
                content.push(ContentBlock::Structured(structured));
            }
        }
        ToolResult {
            is_error: result.is_error,
            content,
        }
    }
}

fn content_block(block: Value) -> ContentBlock {
    let is_text = block.get("type").and_then(Value::as_str) == Some("text");
    match block.get("text").and_then(Value::as_str) {
        Some(text) if is_text => ContentBlock::Text(text.to_string()),
        _ => ContentBlock::Structured(block),
    }
}
