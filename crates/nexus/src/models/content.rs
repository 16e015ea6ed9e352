use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One block of a tool result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum ContentBlock {
    Text(String),
    /// Anything that is not plain text, kept exactly as the provider sent it
    Structured(Value),
}

impl ContentBlock {
    pub fn text<S: Into<String>>(text: S) -> Self {
        ContentBlock::Text(text.into())
    }

    pub fn structured(value: Value) -> Self {
        ContentBlock::Structured(value)
    }

    /// Get the text if this is a Text block
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text(text) => Some(text),
            ContentBlock::Structured(_) => None,
        }
    }
}

/// The outcome of invoking a tool on a provider. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub is_error: bool,
    pub content: Vec<ContentBlock>,
}

impl ToolResult {
    pub fn success(content: Vec<ContentBlock>) -> Self {
        Self {
            is_error: false,
            content,
        }
    }

    pub fn error<S: Into<String>>(message: S) -> Self {
        Self {
            is_error: true,
            content: vec![ContentBlock::text(message)],
        }
    }
}
