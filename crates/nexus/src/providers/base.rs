use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::errors::AgentResult;
use crate::models::content::ToolResult;
use crate::models::tool::Tool;

/// How to start a compute provider that speaks JSON-RPC over its stdin/stdout
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSpec {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

impl ConnectionSpec {
    pub fn new<S: Into<String>>(command: S) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// One logical connection to a tool-providing process.
///
/// Implementations must accept concurrent calls from several tasks. Catalogs are not cached:
/// every `list_tools` goes to the provider.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// The provider's tools under their raw names
    async fn list_tools(&self, cancel: &CancellationToken) -> AgentResult<Vec<Tool>>;

    /// Invoke a tool by its raw name
    async fn call(
        &self,
        name: &str,
        arguments: Value,
        cancel: &CancellationToken,
    ) -> AgentResult<ToolResult>;

    /// Release the connection. Calling it again has no effect.
    async fn close(&self);
}
