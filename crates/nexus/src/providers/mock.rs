use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::base::ProviderClient;
use crate::errors::{AgentError, AgentResult};
use crate::models::content::{ContentBlock, ToolResult};
use crate::models::tool::Tool;

/// An in-process provider with canned tools and results for testing
#[derive(Default)]
pub struct MockProviderClient {
    tools: Vec<Tool>,
    results: HashMap<String, AgentResult<ToolResult>>,
    discovery_error: Option<AgentError>,
    delay: Option<Duration>,
    discovery_delay: Option<Duration>,
    calls: Mutex<Vec<(String, Value)>>,
    closed: AtomicBool,
}

impl MockProviderClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool that answers every call with the given text
    pub fn with_text_tool(self, name: &str, text: &str) -> Self {
        self.with_tool(
            Tool::new(name, format!("{} tool", name), json!({"type": "object"})),
            Ok(ToolResult::success(vec![ContentBlock::text(text)])),
        )
    }

    pub fn with_tool(mut self, tool: Tool, result: AgentResult<ToolResult>) -> Self {
        self.results.insert(tool.name.clone(), result);
        self.tools.push(tool);
        self
    }

    pub fn failing_discovery(mut self, error: AgentError) -> Self {
        self.discovery_error = Some(error);
        self
    }

    /// Make every tool call take this long before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_discovery_delay(mut self, delay: Duration) -> Self {
        self.discovery_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn pause(delay: Option<Duration>, cancel: &CancellationToken) -> AgentResult<()> {
        if let Some(delay) = delay {
            tokio::select! {
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ProviderClient for MockProviderClient {
    async fn list_tools(&self, cancel: &CancellationToken) -> AgentResult<Vec<Tool>> {
        Self::pause(self.discovery_delay, cancel).await?;
        match &self.discovery_error {
            Some(error) => Err(error.clone()),
            None => Ok(self.tools.clone()),
        }
    }

    async fn call(
        &self,
        name: &str,
        arguments: Value,
        cancel: &CancellationToken,
    ) -> AgentResult<ToolResult> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), arguments));
        Self::pause(self.delay, cancel).await?;
        self.results
            .get(name)
            .cloned()
            .unwrap_or_else(|| Err(AgentError::Protocol(format!("Unknown tool: {}", name))))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
