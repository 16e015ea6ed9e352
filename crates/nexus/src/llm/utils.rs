use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use crate::errors::{AgentError, AgentResult};
use crate::models::message::Message;
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolCall};

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
    #[serde(default)]
    index: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: Option<String>,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// One decoded event of a streamed reply
#[derive(Debug, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
pub struct StreamChoice {
    #[serde(default)]
    pub delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Value>,
}

/// Convert the internal transcript to chat-completion messages
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|message| match message.role {
            Role::Assistant if message.has_tool_calls() => {
                let tool_calls: Vec<Value> = message
                    .tool_calls
                    .iter()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": call.arguments,
                            }
                        })
                    })
                    .collect();
                let content = if message.text.is_empty() {
                    Value::Null
                } else {
                    json!(message.text)
                };
                json!({
                    "role": message.role,
                    "content": content,
                    "tool_calls": tool_calls,
                })
            }
            Role::Tool => json!({
                "role": message.role,
                "content": message.text,
                "tool_call_id": message.tool_call_id,
            }),
            _ => json!({
                "role": message.role,
                "content": message.text,
            }),
        })
        .collect()
}

/// Convert catalog entries to chat-completion function tools
pub fn tools_to_openai_spec(tools: &[Tool]) -> AgentResult<Vec<Value>> {
    let mut tool_names = std::collections::HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(AgentError::Internal(format!(
                "Duplicate tool name: {}",
                tool.name
            )));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.input_schema,
            }
        }));
    }

    Ok(result)
}

/// Convert a non-streaming chat-completion response to an assistant message
pub fn openai_response_to_message(response: Value) -> AgentResult<Message> {
    if let Some(error) = response.get("error").filter(|e| !e.is_null()) {
        return Err(AgentError::Protocol(format!("model endpoint error: {}", error)));
    }

    let parsed: ChatCompletionResponse = serde_json::from_value(response)?;
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or(AgentError::EmptyResponse)?;

    debug!(
        finish_reason = choice.finish_reason.as_deref().unwrap_or("unknown"),
        index = choice.index.unwrap_or_default(),
        "Decoded model response"
    );

    let mut message = Message::assistant().with_text(choice.message.content.unwrap_or_default());
    for call in choice.message.tool_calls.unwrap_or_default() {
        let id = call
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("call_{}", Uuid::new_v4().simple()));
        let arguments = match call.function.arguments {
            Value::String(raw) => raw,
            Value::Null => String::new(),
            other => other.to_string(),
        };
        message = message.with_tool_call(ToolCall::new(id, call.function.name, arguments));
    }

    Ok(message)
}

/// Collect the text deltas carried by one stream event
pub fn stream_chunk_fragments(chunk: StreamChunk) -> Vec<String> {
    chunk
        .choices
        .into_iter()
        .filter_map(|choice| {
            if choice.delta.tool_calls.is_some() {
                debug!("Ignoring tool-call delta in streamed reply");
            }
            choice.delta.content
        })
        .filter(|content| !content.is_empty())
        .collect()
}
