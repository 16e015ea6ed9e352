use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::errors::AgentResult;
use crate::models::message::Message;
use crate::models::tool::Tool;

/// Whether, and which, tool the model may call on this request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ToolChoice {
    /// The model decides
    #[default]
    Auto,
    /// The model must answer in text
    None,
    /// The model must call the named tool
    Tool(String),
}

impl ToolChoice {
    /// The value sent as `tool_choice`
    pub fn to_wire(&self) -> Value {
        match self {
            ToolChoice::Auto => json!("auto"),
            ToolChoice::None => json!("none"),
            ToolChoice::Tool(name) => json!({
                "type": "function",
                "function": {"name": name}
            }),
        }
    }
}

/// Incremental text of a streamed reply. Finite and not restartable.
pub type FragmentStream = BoxStream<'static, AgentResult<String>>;

/// A chat-completion endpoint that can plan and call tools
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Request one complete assistant message
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[Tool],
        tool_choice: ToolChoice,
        cancel: &CancellationToken,
    ) -> AgentResult<Message>;

    /// Request a reply delivered as a sequence of text fragments
    async fn stream(
        &self,
        messages: &[Message],
        tools: &[Tool],
        cancel: &CancellationToken,
    ) -> AgentResult<FragmentStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_choice_wire_format() {
        assert_eq!(ToolChoice::Auto.to_wire(), json!("auto"));
        assert_eq!(ToolChoice::None.to_wire(), json!("none"));
        assert_eq!(
            ToolChoice::Tool("fs.list_directory".to_string()).to_wire(),
            json!({"type": "function", "function": {"name": "fs.list_directory"}})
        );
        assert_eq!(ToolChoice::default(), ToolChoice::Auto);
    }
}
