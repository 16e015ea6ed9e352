use async_trait::async_trait;
use futures::stream;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use super::base::{FragmentStream, ModelClient, ToolChoice};
use crate::errors::{AgentError, AgentResult};
use crate::models::message::Message;
use crate::models::tool::Tool;

/// What the mock model was asked for on one call
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<Tool>,
    pub tool_choice: Option<ToolChoice>,
}

/// A mock model client that replays pre-configured replies for testing
#[derive(Clone, Default)]
pub struct MockModelClient {
    responses: Arc<Mutex<Vec<AgentResult<Message>>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockModelClient {
    pub fn new(responses: Vec<Message>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    pub fn with_results(responses: Vec<AgentResult<Message>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            requests: Arc::default(),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_response(&self) -> AgentResult<Message> {
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(Message::assistant().with_text(""))
        } else {
            responses.remove(0)
        }
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[Tool],
        tool_choice: ToolChoice,
        cancel: &CancellationToken,
    ) -> AgentResult<Message> {
        self.requests.lock().unwrap().push(RecordedRequest {
            messages: messages.to_vec(),
            tools: tools.to_vec(),
            tool_choice: Some(tool_choice),
        });
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        self.next_response()
    }

    async fn stream(
        &self,
        messages: &[Message],
        tools: &[Tool],
        cancel: &CancellationToken,
    ) -> AgentResult<FragmentStream> {
        self.requests.lock().unwrap().push(RecordedRequest {
            messages: messages.to_vec(),
            tools: tools.to_vec(),
            tool_choice: None,
        });
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        let message = self.next_response()?;
        let fragments: Vec<AgentResult<String>> = message
            .text
            .split_inclusive(' ')
            .map(|word| Ok(word.to_string()))
            .collect();
        Ok(Box::pin(stream::iter(fragments)))
    }
}
