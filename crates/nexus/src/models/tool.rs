use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::errors::{AgentError, AgentResult};

/// Separates the provider alias from the provider's own tool name
pub const ALIAS_SEPARATOR: char = '.';

/// A tool that can be used by a model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tool {
    /// The name of the tool
    pub name: String,
    /// A description of what the tool does
    #[serde(default)]
    pub description: String,
    /// JSON Schema of the arguments the tool accepts
    #[serde(rename = "inputSchema", alias = "input_schema", default = "empty_schema")]
    pub input_schema: Value,
}

fn empty_schema() -> Value {
    serde_json::json!({"type": "object", "properties": {}})
}

impl Tool {
    /// Create a new tool with the given name and description
    pub fn new<N, D>(name: N, description: D, input_schema: Value) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        Tool {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// Re-publish a provider's tool under its qualified name
    pub fn qualified(alias: &str, tool: &Tool) -> Self {
        Tool {
            name: QualifiedToolName::new(alias, &tool.name).to_string(),
            description: tool.description.clone(),
            input_schema: tool.input_schema.clone(),
        }
    }
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    /// Qualified name, `<alias>.<tool>`
    pub name: String,
    /// Arguments exactly as the model produced them
    pub arguments: String,
}

impl ToolCall {
    pub fn new<I, N, A>(id: I, name: N, arguments: A) -> Self
    where
        I: Into<String>,
        N: Into<String>,
        A: Into<String>,
    {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Decode the arguments into a JSON object. An empty argument string means no arguments.
    pub fn parsed_arguments(&self) -> AgentResult<Value> {
        if self.arguments.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        serde_json::from_str(&self.arguments).map_err(|e| {
            AgentError::InvalidParameters(format!(
                "Could not interpret arguments for tool call {}: {}",
                self.id, e
            ))
        })
    }
}

/// `<alias>.<raw name>` as published in the merged catalog
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedToolName {
    pub alias: String,
    pub tool: String,
}

impl QualifiedToolName {
    pub fn new<A: Into<String>, T: Into<String>>(alias: A, tool: T) -> Self {
        Self {
            alias: alias.into(),
            tool: tool.into(),
        }
    }

    /// Split at the first separator. Aliases never contain one, raw tool names may.
    pub fn parse(qualified: &str) -> AgentResult<Self> {
        match qualified.split_once(ALIAS_SEPARATOR) {
            Some((alias, tool)) if !alias.is_empty() && !tool.is_empty() => {
                Ok(Self::new(alias, tool))
            }
            _ => Err(AgentError::Resolution(format!(
                "'{}' is not of the form <provider>{}<tool>",
                qualified, ALIAS_SEPARATOR
            ))),
        }
    }
}

impl fmt::Display for QualifiedToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.alias, ALIAS_SEPARATOR, self.tool)
    }
}
