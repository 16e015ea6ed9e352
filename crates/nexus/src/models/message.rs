use super::role::Role;
use super::tool::ToolCall;
use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A message to or from the model
pub struct Message {
    pub role: Role,
    pub created: i64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Set on tool-result messages: the id of the request being answered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn new(role: Role) -> Self {
        Message {
            role,
            created: Utc::now().timestamp(),
            text: String::new(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Create a new system message with the current timestamp
    pub fn system() -> Self {
        Self::new(Role::System)
    }

    /// Create a new user message with the current timestamp
    pub fn user() -> Self {
        Self::new(Role::User)
    }

    /// Create a new assistant message with the current timestamp
    pub fn assistant() -> Self {
        Self::new(Role::Assistant)
    }

    /// Create a tool-result message answering the request `id`
    pub fn tool_result<I: Into<String>, S: Into<String>>(id: I, text: S) -> Self {
        let mut message = Self::new(Role::Tool);
        message.tool_call_id = Some(id.into());
        message.text = text.into();
        message
    }

    /// Append text to the message
    pub fn with_text<S: AsRef<str>>(mut self, text: S) -> Self {
        self.text.push_str(text.as_ref());
        self
    }

    /// Add a tool request to the message
    pub fn with_tool_call(mut self, tool_call: ToolCall) -> Self {
        self.tool_calls.push(tool_call);
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Text with surrounding whitespace removed, if any remains
    pub fn non_empty_text(&self) -> Option<&str> {
        let trimmed = self.text.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }
}
