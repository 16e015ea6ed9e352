use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::errors::AgentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum UpdateKind {
    Progress,
    Result,
    Error,
}

/// One event in the stream of a task. A task emits any number of `progress` events and then
/// exactly one `result` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskUpdate {
    #[serde(rename = "type")]
    pub kind: UpdateKind,
    #[serde(rename = "content")]
    pub text: String,
    #[serde(rename = "error", default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<AgentError>,
}

impl TaskUpdate {
    pub fn progress<S: Into<String>>(text: S) -> Self {
        Self {
            kind: UpdateKind::Progress,
            text: text.into(),
            cause: None,
        }
    }

    pub fn result<S: Into<String>>(text: S) -> Self {
        Self {
            kind: UpdateKind::Result,
            text: text.into(),
            cause: None,
        }
    }

    pub fn error<S: Into<String>>(text: S, cause: AgentError) -> Self {
        Self {
            kind: UpdateKind::Error,
            text: text.into(),
            cause: Some(cause),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.kind != UpdateKind::Progress
    }
}
