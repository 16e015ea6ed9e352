use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::agent::{Agent, AgentConfig};
use crate::cancel::with_deadline;
use crate::errors::{AgentError, AgentResult};
use crate::finalizer::{Finalizer, FinalizerStrategy};
use crate::llm::base::ModelClient;
use crate::models::tool::Tool;
use crate::models::update::{TaskUpdate, UpdateKind};
use crate::providers::base::{ConnectionSpec, ProviderClient};
use crate::providers::registry::{validate_alias, ProviderRegistry};
use crate::providers::stdio::StdioProviderClient;

pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_UPDATE_BUFFER: usize = 32;
pub const NO_TOOLS_MESSAGE: &str = "No tools available from connected providers.";

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub agent: AgentConfig,
    /// Bound on each provider's catalog fetch, independent of the task
    pub discovery_timeout: Duration,
    pub finalizer: FinalizerStrategy,
    /// Capacity of each task's update channel
    pub update_buffer: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            agent: AgentConfig::default(),
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            finalizer: FinalizerStrategy::default(),
            update_buffer: DEFAULT_UPDATE_BUFFER,
        }
    }
}

/// Owns the provider connections and runs one agent loop per task
#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<ProviderRegistry>,
    model: Arc<dyn ModelClient>,
    finalizer: Arc<dyn Finalizer>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(model: Arc<dyn ModelClient>, config: OrchestratorConfig) -> Self {
        let finalizer = config.finalizer.build(Arc::clone(&model));
        Self {
            registry: Arc::new(ProviderRegistry::new()),
            model,
            finalizer,
            config,
        }
    }

    pub fn with_finalizer(mut self, finalizer: Arc<dyn Finalizer>) -> Self {
        self.finalizer = finalizer;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Start a provider process and register it under `alias`
    pub async fn register_provider(&self, alias: &str, spec: &ConnectionSpec) -> AgentResult<()> {
        validate_alias(alias)?;
        if self.registry.contains(alias).await {
            return Err(AgentError::DuplicateAlias(alias.to_string()));
        }

        let client = Arc::new(StdioProviderClient::connect(alias, spec).await?);
        if let Err(e) = self.registry.insert(alias, client.clone()).await {
            // Lost a race with a concurrent registration of the same alias
            client.close().await;
            return Err(e);
        }
        info!(alias, "Registered provider");
        Ok(())
    }

    /// Register an already connected client
    pub async fn add_provider(
        &self,
        alias: &str,
        client: Arc<dyn ProviderClient>,
    ) -> AgentResult<()> {
        self.registry.insert(alias, client).await?;
        info!(alias, "Registered provider");
        Ok(())
    }

    pub async fn aliases(&self) -> Vec<String> {
        self.registry.aliases().await
    }

    /// Fetch every provider's live catalog and merge it under qualified names.
    ///
    /// Providers that fail or exceed the discovery timeout are logged and left out.
    pub async fn discover_tools(&self, cancel: &CancellationToken) -> AgentResult<Vec<Tool>> {
        let providers = self.registry.snapshot().await;
        let limit = self.config.discovery_timeout;

        let fetches = providers.iter().map(|(alias, client)| async move {
            let what = format!("tool discovery for provider {}", alias);
            with_deadline(cancel, Some(limit), &what, client.list_tools(cancel)).await
        });
        let catalogs = futures::future::join_all(fetches).await;

        let mut tools = Vec::new();
        for ((alias, _), catalog) in providers.iter().zip(catalogs) {
            match catalog {
                Ok(catalog) => {
                    debug!(alias = %alias, count = catalog.len(), "Discovered tools");
                    tools.extend(catalog.iter().map(|tool| Tool::qualified(alias, tool)));
                }
                Err(AgentError::Cancelled) => return Err(AgentError::Cancelled),
                Err(e) => warn!(alias = %alias, error = %e, "Skipping provider after failed discovery"),
            }
        }
        Ok(tools)
    }

    /// Spawn a task for `query` and hand back its update stream
    pub fn execute_task<Q: Into<String>>(&self, query: Q) -> TaskHandle {
        let id = Uuid::new_v4().to_string();
        let query = query.into();
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(self.config.update_buffer.max(1));

        let orchestrator = self.clone();
        let token = cancel.clone();
        let span = info_span!("task", task_id = %id);
        tokio::spawn(
            async move { orchestrator.run_task(&query, &token, tx).await }.instrument(span),
        );

        TaskHandle {
            id,
            updates: ReceiverStream::new(rx),
            cancel: cancel.clone(),
            _guard: cancel.drop_guard(),
        }
    }

    /// Run one task to completion, sending its updates and then exactly one terminal update.
    /// The sender is dropped afterwards, which closes the stream.
    pub async fn run_task(
        &self,
        query: &str,
        cancel: &CancellationToken,
        updates: mpsc::Sender<TaskUpdate>,
    ) {
        info!("Task started");
        let terminal = match self.answer(query, cancel, &updates).await {
            Ok(answer) => {
                info!("Task finished");
                TaskUpdate::result(answer)
            }
            Err(AgentError::NoToolsAvailable) => {
                warn!("Task failed: no tools available");
                TaskUpdate::error(NO_TOOLS_MESSAGE, AgentError::NoToolsAvailable)
            }
            Err(e) => {
                warn!(error = %e, "Task failed");
                TaskUpdate::error(format!("Agent execution failed: {}", e), e)
            }
        };
        let _ = updates.send(terminal).await;
    }

    async fn answer(
        &self,
        query: &str,
        cancel: &CancellationToken,
        updates: &mpsc::Sender<TaskUpdate>,
    ) -> AgentResult<String> {
        let tools = self.discover_tools(cancel).await?;
        if tools.is_empty() {
            return Err(AgentError::NoToolsAvailable);
        }

        let agent = Agent::new(
            Arc::clone(&self.model),
            Arc::clone(&self.registry),
            Arc::clone(&self.finalizer),
            self.config.agent.clone(),
        );
        agent.execute(query, &tools, cancel, updates).await
    }

    /// Close every registered provider
    pub async fn shutdown(&self) {
        info!("Shutting down providers");
        self.registry.close_all().await;
    }
}

/// The caller's side of a running task. Dropping it cancels the task.
pub struct TaskHandle {
    id: String,
    updates: ReceiverStream<TaskUpdate>,
    cancel: CancellationToken,
    _guard: DropGuard,
}

impl TaskHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drain the stream and return the task's outcome
    pub async fn into_result(mut self) -> AgentResult<String> {
        while let Some(update) = self.updates.next().await {
            match update.kind {
                UpdateKind::Progress => continue,
                UpdateKind::Result => return Ok(update.text),
                UpdateKind::Error => {
                    return Err(update
                        .cause
                        .unwrap_or(AgentError::Internal(update.text)))
                }
            }
        }
        Err(AgentError::Internal(
            "task ended without a terminal update".to_string(),
        ))
    }
}

impl Stream for TaskHandle {
    type Item = TaskUpdate;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.updates).poll_next(cx)
    }
}
