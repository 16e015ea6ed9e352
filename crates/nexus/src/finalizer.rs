use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{AgentError, AgentResult};
use crate::llm::base::{ModelClient, ToolChoice};
use crate::models::message::Message;
use crate::models::role::Role;
use crate::models::tool::Tool;
use crate::prompt_template::load_prompt_file;

/// How the final answer is derived from a finished transcript
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizerStrategy {
    /// Use the last assistant message with text
    #[default]
    LastAssistant,
    /// Ask the model for one more, tool-free, summarizing reply
    Summarize,
}

impl FinalizerStrategy {
    pub fn build(self, model: Arc<dyn ModelClient>) -> Arc<dyn Finalizer> {
        match self {
            FinalizerStrategy::LastAssistant => Arc::new(TranscriptFinalizer),
            FinalizerStrategy::Summarize => Arc::new(SummarizingFinalizer::new(model)),
        }
    }
}

/// Extracts or elicits the single answer of a completed task.
///
/// Implementations return non-empty text whenever the transcript holds an assistant message
/// with text, and fail with `NoFinalAnswer` otherwise.
#[async_trait]
pub trait Finalizer: Send + Sync {
    async fn finalize(
        &self,
        transcript: &[Message],
        tools: &[Tool],
        cancel: &CancellationToken,
    ) -> AgentResult<String>;
}

/// Scan from the end of a transcript for the last assistant message with text
pub fn last_assistant_text(transcript: &[Message]) -> AgentResult<String> {
    transcript
        .iter()
        .rev()
        .filter(|message| message.role == Role::Assistant)
        .find_map(Message::non_empty_text)
        .map(str::to_string)
        .ok_or(AgentError::NoFinalAnswer)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TranscriptFinalizer;

#[async_trait]
impl Finalizer for TranscriptFinalizer {
    async fn finalize(
        &self,
        transcript: &[Message],
        _tools: &[Tool],
        _cancel: &CancellationToken,
    ) -> AgentResult<String> {
        last_assistant_text(transcript)
    }
}

pub struct SummarizingFinalizer {
    model: Arc<dyn ModelClient>,
}

impl SummarizingFinalizer {
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Finalizer for SummarizingFinalizer {
    async fn finalize(
        &self,
        transcript: &[Message],
        tools: &[Tool],
        cancel: &CancellationToken,
    ) -> AgentResult<String> {
        // Without any assistant text there is nothing the summary could be grounded on
        let fallback = last_assistant_text(transcript)?;

        let instruction = load_prompt_file("summarize.md", &json!({ "tools": tools }))
            .map_err(|e| AgentError::Internal(e.to_string()))?;
        let mut messages = transcript.to_vec();
        messages.push(Message::user().with_text(instruction));

        match self
            .model
            .complete(&messages, tools, ToolChoice::None, cancel)
            .await
        {
            Ok(reply) => match reply.non_empty_text() {
                Some(text) => Ok(text.to_string()),
                None => {
                    debug!("Summary was empty, using the last assistant message");
                    Ok(fallback)
                }
            },
            Err(AgentError::Cancelled) => Err(AgentError::Cancelled),
            Err(e) => {
                warn!(error = %e, "Summary request failed, using the last assistant message");
                Ok(fallback)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockModelClient;
    use crate::models::tool::ToolCall;

    fn transcript() -> Vec<Message> {
        vec![
            Message::user().with_text("list files"),
            Message::assistant().with_tool_call(ToolCall::new(
                "call_1",
                "fs.list_directory",
                "{}",
            )),
            Message::tool_result("call_1", "file1.txt"),
            Message::assistant().with_text("  file1.txt is the only file  "),
        ]
    }

    #[tokio::test]
    async fn test_last_assistant_message() -> anyhow::Result<()> {
        let transcript = vec![
            Message::user().with_text("hi"),
            Message::assistant().with_text("X"),
        ];
        let answer = TranscriptFinalizer
            .finalize(&transcript, &[], &CancellationToken::new())
            .await?;
        assert_eq!(answer, "X");
        Ok(())
    }

    #[tokio::test]
    async fn test_skips_trailing_empty_assistant_messages() -> anyhow::Result<()> {
        let mut transcript = transcript();
        transcript.push(Message::assistant());
        let answer = TranscriptFinalizer
            .finalize(&transcript, &[], &CancellationToken::new())
            .await?;
        assert_eq!(answer, "file1.txt is the only file");
        Ok(())
    }

    #[tokio::test]
    async fn test_no_assistant_message() {
        let transcript = vec![
            Message::user().with_text("hi"),
            Message::tool_result("call_1", "ignored"),
        ];
        let result = TranscriptFinalizer
            .finalize(&transcript, &[], &CancellationToken::new())
            .await;
        assert_eq!(result, Err(AgentError::NoFinalAnswer));
    }

    #[tokio::test]
    async fn test_summarizing_finalizer() -> anyhow::Result<()> {
        let model = Arc::new(MockModelClient::new(vec![
            Message::assistant().with_text("There is one file: file1.txt.")
        ]));
        let finalizer = SummarizingFinalizer::new(model.clone());

        let answer = finalizer
            .finalize(&transcript(), &[], &CancellationToken::new())
            .await?;
        assert_eq!(answer, "There is one file: file1.txt.");

        let requests = model.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].tool_choice, Some(ToolChoice::None));
        let last = requests[0].messages.last().unwrap();
        assert_eq!(last.role, Role::User);
        assert!(last.text.contains("final answer"));
        Ok(())
    }

    #[tokio::test]
    async fn test_summarizing_falls_back() -> anyhow::Result<()> {
        let model = Arc::new(MockModelClient::with_results(vec![
            Ok(Message::assistant().with_text("   ")),
            Err(AgentError::Connectivity("down".to_string())),
        ]));
        let finalizer = SummarizingFinalizer::new(model);
        let cancel = CancellationToken::new();

        assert_eq!(
            finalizer.finalize(&transcript(), &[], &cancel).await?,
            "file1.txt is the only file"
        );
        assert_eq!(
            finalizer.finalize(&transcript(), &[], &cancel).await?,
            "file1.txt is the only file"
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_summarizing_without_answer_or_after_cancel() {
        let model = Arc::new(MockModelClient::new(vec![]));
        let finalizer = SummarizingFinalizer::new(model.clone());

        let result = finalizer
            .finalize(
                &[Message::user().with_text("hi")],
                &[],
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(result, Err(AgentError::NoFinalAnswer));
        assert!(model.requests().is_empty());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = finalizer.finalize(&transcript(), &[], &cancel).await;
        assert_eq!(result, Err(AgentError::Cancelled));
    }
}
