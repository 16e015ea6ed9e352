use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures surfaced by the agent runtime.
///
/// Failures while serving a tool call are absorbed into the conversation, except those for
/// which [`AgentError::is_fatal_in_tool_call`] holds. Everywhere else every variant ends the task.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum AgentError {
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Could not resolve tool: {0}")]
    Resolution(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Model returned no choices")]
    EmptyResponse,

    #[error("Exceeded the maximum of {0} turns")]
    TurnLimit(usize),

    #[error("No tools available from connected providers")]
    NoToolsAvailable,

    #[error("No final answer found in conversation history")]
    NoFinalAnswer,

    #[error("Task was cancelled")]
    Cancelled,

    #[error("Provider alias already registered: {0}")]
    DuplicateAlias(String),

    #[error("Invalid provider alias '{0}': must match [A-Za-z0-9_-]+")]
    InvalidAlias(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// Whether this error, raised while serving a tool call, must end the task instead of being
    /// reported to the model as the call's result
    pub fn is_fatal_in_tool_call(&self) -> bool {
        matches!(self, AgentError::Cancelled | AgentError::Internal(_))
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AgentError::Protocol(err.to_string())
        } else {
            AgentError::Connectivity(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        AgentError::Protocol(err.to_string())
    }
}

pub type AgentResult<T> = Result<T, AgentError>;
