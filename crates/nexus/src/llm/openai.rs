use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::base::{FragmentStream, ModelClient, ToolChoice};
use super::configs::ModelClientConfig;
use super::stream::{EventStreamParser, StreamEvent};
use super::utils::{messages_to_openai_spec, openai_response_to_message, tools_to_openai_spec};
use crate::cancel::with_deadline;
use crate::errors::{AgentError, AgentResult};
use crate::models::message::Message;
use crate::models::tool::Tool;

/// Model client for OpenAI-compatible chat-completions endpoints
pub struct OpenAiModelClient {
    client: Client,
    config: ModelClientConfig,
}

impl OpenAiModelClient {
    pub fn new(config: ModelClientConfig) -> AgentResult<Self> {
        // Requests are bounded per call so streamed replies are not cut off by a global timeout
        let client = Client::builder().build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ModelClientConfig {
        &self.config
    }

    fn build_payload(
        &self,
        messages: &[Message],
        tools: &[Tool],
        tool_choice: Option<ToolChoice>,
        stream: bool,
    ) -> AgentResult<Value> {
        let mut payload = Map::new();
        payload.insert("model".to_string(), json!(self.config.model));
        payload.insert(
            "messages".to_string(),
            json!(messages_to_openai_spec(messages)),
        );

        if !tools.is_empty() {
            payload.insert("tools".to_string(), json!(tools_to_openai_spec(tools)?));
            if let Some(choice) = tool_choice {
                payload.insert("tool_choice".to_string(), choice.to_wire());
            }
        }
        if let Some(temperature) = self.config.temperature {
            payload.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(tokens) = self.config.max_tokens {
            payload.insert("max_tokens".to_string(), json!(tokens));
        }
        payload.insert("stream".to_string(), json!(stream));

        Ok(Value::Object(payload))
    }

    async fn post(&self, payload: &Value) -> AgentResult<Response> {
        let mut request = self.client.post(&self.config.endpoint).json(payload);
        if let Some(api_key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Err(AgentError::Connectivity(format!(
                "Server error: {}: {}",
                status, body
            )))
        } else {
            Err(AgentError::Protocol(format!(
                "Request failed: {}: {}",
                status, body
            )))
        }
    }
}

#[async_trait]
impl ModelClient for OpenAiModelClient {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[Tool],
        tool_choice: ToolChoice,
        cancel: &CancellationToken,
    ) -> AgentResult<Message> {
        let payload = self.build_payload(messages, tools, Some(tool_choice), false)?;
        debug!(
            model = %self.config.model,
            messages = messages.len(),
            tools = tools.len(),
            "Requesting completion"
        );

        let response = with_deadline(cancel, Some(self.config.timeout), "model request", async {
            let response = self.post(&payload).await?;
            Ok::<_, AgentError>(response.json::<Value>().await?)
        })
        .await?;

        openai_response_to_message(response)
    }

    async fn stream(
        &self,
        messages: &[Message],
        tools: &[Tool],
        cancel: &CancellationToken,
    ) -> AgentResult<FragmentStream> {
        let payload = self.build_payload(messages, tools, None, true)?;
        debug!(model = %self.config.model, "Requesting streamed completion");

        let response = with_deadline(
            cancel,
            Some(self.config.timeout),
            "model request",
            self.post(&payload),
        )
        .await?;

        let read_timeout = self.config.timeout;
        let cancel = cancel.clone();
        let mut body = Box::pin(response.bytes_stream());

        let fragments = async_stream::try_stream! {
            let mut parser = EventStreamParser::new();
            let mut finished = false;

            while !finished {
                let next = with_deadline(&cancel, Some(read_timeout), "stream read", async {
                    Ok::<_, AgentError>(body.next().await)
                })
                .await?;

                let events = match next {
                    Some(chunk) => parser.push(&chunk?),
                    None => {
                        finished = true;
                        parser.finish()
                    }
                };

                for event in events {
                    match event {
                        StreamEvent::Fragment(text) => yield text,
                        StreamEvent::Done => finished = true,
                    }
                }
            }
        };

        Ok(Box::pin(fragments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup_mock_server(template: ResponseTemplate) -> (MockServer, OpenAiModelClient) {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(template)
            .mount(&mock_server)
            .await;

        let config = ModelClientConfig::new(
            format!("{}/v1/chat/completions", mock_server.uri()),
            "llama3.1",
        )
        .with_timeout(Duration::from_secs(5));
        let client = OpenAiModelClient::new(config).unwrap();
        (mock_server, client)
    }

    async fn last_request_body(server: &MockServer) -> Value {
        let requests = server.received_requests().await.unwrap();
        serde_json::from_slice(&requests.last().unwrap().body).unwrap()
    }

    fn fs_tool() -> Tool {
        Tool::new(
            "fs.list_directory",
            "Lists files in a directory.",
            json!({
                "type": "object",
                "properties": {"path": {"type": "string"}},
                "required": ["path"]
            }),
        )
    }

    #[tokio::test]
    async fn test_complete_basic() -> anyhow::Result<()> {
        let response_body = json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "Hello! How can I assist you today?",
                    "tool_calls": null
                },
                "finish_reason": "stop"
            }]
        });
        let (server, client) =
            setup_mock_server(ResponseTemplate::new(200).set_body_json(response_body)).await;

        let messages = vec![
            Message::system().with_text("You are a helpful assistant."),
            Message::user().with_text("Hello?"),
        ];
        let message = client
            .complete(&messages, &[], ToolChoice::Auto, &CancellationToken::new())
            .await?;
        assert_eq!(message.text, "Hello! How can I assist you today?");

        let body = last_request_body(&server).await;
        assert_eq!(body["model"], "llama3.1");
        assert_eq!(body["messages"][0]["role"], "system");
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
        assert_eq!(body["stream"], false);
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_tool_request() -> anyhow::Result<()> {
        let response_body = json!({
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_123",
                        "type": "function",
                        "function": {
                            "name": "fs.list_directory",
                            "arguments": "{\"path\":\".\"}"
                        }
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        });
        let (server, client) =
            setup_mock_server(ResponseTemplate::new(200).set_body_json(response_body)).await;

        let messages = vec![Message::user().with_text("What files are here?")];
        let message = client
            .complete(
                &messages,
                &[fs_tool()],
                ToolChoice::Tool("fs.list_directory".to_string()),
                &CancellationToken::new(),
            )
            .await?;

        assert_eq!(message.tool_calls.len(), 1);
        assert_eq!(message.tool_calls[0].name, "fs.list_directory");
        assert_eq!(message.tool_calls[0].arguments, r#"{"path":"."}"#);

        let body = last_request_body(&server).await;
        assert_eq!(body["tools"][0]["function"]["name"], "fs.list_directory");
        assert_eq!(
            body["tool_choice"],
            json!({"type": "function", "function": {"name": "fs.list_directory"}})
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_authorization_header() -> anyhow::Result<()> {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("Authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "ok"}}]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let config = ModelClientConfig::new(mock_server.uri(), "llama3.1").with_api_key("secret");
        let client = OpenAiModelClient::new(config)?;
        let message = client
            .complete(
                &[Message::user().with_text("hi")],
                &[],
                ToolChoice::Auto,
                &CancellationToken::new(),
            )
            .await?;
        assert_eq!(message.text, "ok");
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_choices() {
        let (_server, client) =
            setup_mock_server(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
                .await;
        let result = client
            .complete(
                &[Message::user().with_text("hi")],
                &[],
                ToolChoice::Auto,
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(result.unwrap_err(), AgentError::EmptyResponse);
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let (_server, client) = setup_mock_server(ResponseTemplate::new(503)).await;
        let result = client
            .complete(&[], &[], ToolChoice::Auto, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(AgentError::Connectivity(_))));

        let (_server, client) = setup_mock_server(ResponseTemplate::new(400)).await;
        let result = client
            .complete(&[], &[], ToolChoice::Auto, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(AgentError::Protocol(_))));

        let (_server, client) =
            setup_mock_server(ResponseTemplate::new(200).set_body_string("not json")).await;
        let result = client
            .complete(&[], &[], ToolChoice::Auto, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(AgentError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"choices": []}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&mock_server)
            .await;

        let config = ModelClientConfig::new(mock_server.uri(), "llama3.1")
            .with_timeout(Duration::from_millis(100));
        let client = OpenAiModelClient::new(config).unwrap();
        let result = client
            .complete(&[], &[], ToolChoice::Auto, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(AgentError::Connectivity(msg)) if msg.contains("timed out")));
    }

    #[tokio::test]
    async fn test_cancelled_request() {
        let (_server, client) = setup_mock_server(
            ResponseTemplate::new(200)
                .set_body_json(json!({"choices": []}))
                .set_delay(Duration::from_secs(2)),
        )
        .await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = client.complete(&[], &[], ToolChoice::Auto, &cancel).await;
        assert_eq!(result.unwrap_err(), AgentError::Cancelled);
    }

    #[tokio::test]
    async fn test_stream_fragments() -> anyhow::Result<()> {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Final \"}}]}\n\n",
            ": comment\n",
            "data: {broken\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"answer\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        let (server, client) = setup_mock_server(
            ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/event-stream"),
        )
        .await;

        let stream = client
            .stream(
                &[Message::user().with_text("hi")],
                &[],
                &CancellationToken::new(),
            )
            .await?;
        let fragments: Vec<String> = stream.try_collect().await?;
        assert_eq!(fragments, vec!["Final ", "answer"]);

        let request = last_request_body(&server).await;
        assert_eq!(request["stream"], true);
        Ok(())
    }

    #[tokio::test]
    async fn test_stream_without_done_marker() -> anyhow::Result<()> {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}";
        let (_server, client) = setup_mock_server(
            ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/event-stream"),
        )
        .await;

        let stream = client.stream(&[], &[], &CancellationToken::new()).await?;
        let fragments: Vec<String> = stream.try_collect().await?;
        assert_eq!(fragments, vec!["partial"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_stream_server_error() {
        let (_server, client) = setup_mock_server(ResponseTemplate::new(500)).await;
        let result = client.stream(&[], &[], &CancellationToken::new()).await;
        assert!(matches!(result, Err(AgentError::Connectivity(_))));
    }
}
