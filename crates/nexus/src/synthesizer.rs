use crate::errors::{AgentError, AgentResult};
use crate::models::content::{ContentBlock, ToolResult};

pub const UNSPECIFIED_ERROR: &str = "Tool returned an unspecified error.";

/// Render a tool result as the text inserted back into the conversation.
///
/// Error results are reported through their first block when it is text. Successful results
/// concatenate every block in order: text verbatim, structured blocks as compact JSON.
pub fn synthesize(result: &ToolResult) -> AgentResult<String> {
    if result.is_error {
        return Ok(match result.content.first().and_then(ContentBlock::as_text) {
            Some(text) => format!("Tool returned an error: {}", text),
            None => UNSPECIFIED_ERROR.to_string(),
        });
    }

    let mut rendered = String::new();
    for block in &result.content {
        match block {
            ContentBlock::Text(text) => rendered.push_str(text),
            ContentBlock::Structured(value) => {
                let json = serde_json::to_string(value).map_err(|e| {
                    AgentError::Internal(format!("failed to encode structured content: {}", e))
                })?;
                rendered.push_str(&json);
            }
        }
    }
    Ok(rendered)
}
