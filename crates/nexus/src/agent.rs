use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cancel::with_deadline;
use crate::errors::{AgentError, AgentResult};
use crate::finalizer::Finalizer;
use crate::llm::base::{ModelClient, ToolChoice};
use crate::models::content::ToolResult;
use crate::models::message::Message;
use crate::models::tool::{QualifiedToolName, Tool, ToolCall};
use crate::models::update::TaskUpdate;
use crate::prompt_template::load_prompt_file;
use crate::providers::registry::ProviderRegistry;
use crate::synthesizer::synthesize;

pub const DEFAULT_MAX_TURNS: usize = 10;
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    /// Model calls allowed per task, planning included
    pub max_turns: usize,
    /// Bound on a single tool invocation
    pub tool_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }
}

/// Where one execution of the loop currently is. The number is the turn: how many model
/// calls have been made so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Planning,
    Executing(usize),
    ToolDispatch(usize),
    Finalizing,
    Done,
    Failed,
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Drives one query from planning to a final answer
pub struct Agent {
    model: Arc<dyn ModelClient>,
    registry: Arc<ProviderRegistry>,
    finalizer: Arc<dyn Finalizer>,
    config: AgentConfig,
}

/// Per-execution prompts and catalog
struct Phase<'a> {
    tools: &'a [Tool],
    planning_prompt: String,
    execution_prompt: String,
}

impl Agent {
    pub fn new(
        model: Arc<dyn ModelClient>,
        registry: Arc<ProviderRegistry>,
        finalizer: Arc<dyn Finalizer>,
        config: AgentConfig,
    ) -> Self {
        Self {
            model,
            registry,
            finalizer,
            config,
        }
    }

    /// Answer `query` using the given merged catalog, reporting progress on `updates`.
    ///
    /// Terminal outcomes are returned, not sent; the caller owns the terminal event.
    pub async fn execute(
        &self,
        query: &str,
        tools: &[Tool],
        cancel: &CancellationToken,
        updates: &mpsc::Sender<TaskUpdate>,
    ) -> AgentResult<String> {
        let result = self.run(query, tools, cancel, updates).await;
        let state = if result.is_ok() {
            AgentState::Done
        } else {
            AgentState::Failed
        };
        debug!(%state, "Agent loop finished");
        result
    }

    async fn run(
        &self,
        query: &str,
        tools: &[Tool],
        cancel: &CancellationToken,
        updates: &mpsc::Sender<TaskUpdate>,
    ) -> AgentResult<String> {
        let phase = Phase {
            tools,
            planning_prompt: render_prompt("planning.md", tools)?,
            execution_prompt: render_prompt("execution.md", tools)?,
        };
        let mut transcript = vec![Message::user().with_text(query)];
        let mut state = AgentState::Planning;

        loop {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            debug!(%state, "Agent state");

            state = match state {
                AgentState::Planning => {
                    report(updates, cancel, "Planning how to answer the query").await;
                    let reply = self
                        .ask(&phase.planning_prompt, &transcript, phase.tools, cancel)
                        .await?;
                    transcript.push(reply);
                    AgentState::Executing(1)
                }
                AgentState::Executing(turn) => {
                    let wants_tools = transcript
                        .last()
                        .map(Message::has_tool_calls)
                        .unwrap_or(false);
                    if !wants_tools {
                        AgentState::Finalizing
                    } else if turn >= self.config.max_turns {
                        warn!(turn, "Model is still requesting tools at the turn limit");
                        return Err(AgentError::TurnLimit(self.config.max_turns));
                    } else {
                        AgentState::ToolDispatch(turn)
                    }
                }
                AgentState::ToolDispatch(turn) => {
                    let calls = transcript
                        .last()
                        .map(|message| message.tool_calls.clone())
                        .unwrap_or_default();
                    for call in calls {
                        report(updates, cancel, format!("Calling tool {}", call.name)).await;
                        let text = self.dispatch(&call, cancel).await?;
                        transcript.push(Message::tool_result(call.id, text));
                    }

                    report(
                        updates,
                        cancel,
                        format!("Continuing execution (turn {})", turn + 1),
                    )
                    .await;
                    let reply = self
                        .ask(&phase.execution_prompt, &transcript, phase.tools, cancel)
                        .await?;
                    transcript.push(reply);
                    AgentState::Executing(turn + 1)
                }
                AgentState::Finalizing => {
                    report(updates, cancel, "Preparing the final answer").await;
                    return self
                        .finalizer
                        .finalize(&transcript, phase.tools, cancel)
                        .await;
                }
                AgentState::Done | AgentState::Failed => {
                    return Err(AgentError::Internal(format!(
                        "agent loop resumed from terminal state {}",
                        state
                    )));
                }
            };
        }
    }

    async fn ask(
        &self,
        system_prompt: &str,
        transcript: &[Message],
        tools: &[Tool],
        cancel: &CancellationToken,
    ) -> AgentResult<Message> {
        let mut messages = Vec::with_capacity(transcript.len() + 1);
        messages.push(Message::system().with_text(system_prompt));
        messages.extend_from_slice(transcript);

        self.model
            .complete(&messages, tools, ToolChoice::Auto, cancel)
            .await
    }

    /// Run one tool call and render its outcome for the transcript.
    ///
    /// Only cancellation and internal failures escape; everything else becomes error text the
    /// model can react to.
    async fn dispatch(&self, call: &ToolCall, cancel: &CancellationToken) -> AgentResult<String> {
        let outcome = with_deadline(
            cancel,
            Some(self.config.tool_timeout),
            &format!("tool {}", call.name),
            self.invoke(call, cancel),
        )
        .await;

        match outcome {
            Ok(result) => synthesize(&result),
            Err(e) if e.is_fatal_in_tool_call() => Err(e),
            Err(e) => {
                warn!(tool = %call.name, id = %call.id, error = %e, "Tool call failed");
                Ok(format!("Tool returned an error: {}", e))
            }
        }
    }

    async fn invoke(&self, call: &ToolCall, cancel: &CancellationToken) -> AgentResult<ToolResult> {
        let name = QualifiedToolName::parse(&call.name)?;
        let provider = self.registry.get(&name.alias).await.ok_or_else(|| {
            AgentError::Resolution(format!(
                "no provider is registered under alias '{}'",
                name.alias
            ))
        })?;
        let arguments = call.parsed_arguments()?;

        debug!(alias = %name.alias, tool = %name.tool, id = %call.id, "Dispatching tool call");
        provider.call(&name.tool, arguments, cancel).await
    }
}

fn render_prompt(name: &str, tools: &[Tool]) -> AgentResult<String> {
    load_prompt_file(name, &json!({ "tools": tools }))
        .map_err(|e| AgentError::Internal(e.to_string()))
}

/// Send a progress update, giving up if the task is cancelled while the channel is full
async fn report<S: Into<String>>(
    updates: &mpsc::Sender<TaskUpdate>,
    cancel: &CancellationToken,
    text: S,
) {
    // A closed receiver only means nobody is listening for progress
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {}
        _ = updates.send(TaskUpdate::progress(text)) => {}
    }
}
