use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::base::{ConnectionSpec, ProviderClient};
use super::rpc::{
    CallToolParams, CallToolResult, InitializeParams, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, ListToolsParams, ListToolsResult,
};
use crate::cancel::with_deadline;
use crate::errors::{AgentError, AgentResult};
use crate::models::content::ToolResult;
use crate::models::tool::Tool;

pub const INIT_TIMEOUT: Duration = Duration::from_secs(10);

type Writer = Box<dyn AsyncWrite + Send + Unpin>;
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<AgentResult<Value>>>>>;

/// Provider client speaking newline-delimited JSON-RPC 2.0 over a byte transport,
/// normally the stdin/stdout of a spawned process.
pub struct StdioProviderClient {
    name: String,
    writer: Mutex<Option<Writer>>,
    pending: PendingMap,
    closed: Arc<AtomicBool>,
    next_id: AtomicU64,
    reader: Mutex<Option<JoinHandle<()>>>,
    child: Mutex<Option<Child>>,
}

impl StdioProviderClient {
    /// Spawn the provider process and complete the initialize handshake
    pub async fn connect(name: &str, spec: &ConnectionSpec) -> AgentResult<Self> {
        info!(provider = %name, command = %spec.command, "Starting provider");

        let mut command = Command::new(&spec.command);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }

        let mut child = command.spawn().map_err(|e| {
            error!(provider = %name, error = %e, "Failed to spawn provider process");
            AgentError::Connectivity(format!("failed to start provider {}: {}", name, e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AgentError::Connectivity("provider stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::Connectivity("provider stdout not captured".to_string()))?;
        if let Some(stderr) = child.stderr.take() {
            let label = name.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(provider = %label, "stderr: {}", line);
                }
            });
        }

        let client = Self::from_transport(name, stdout, stdin);
        *client.child.lock().await = Some(child);

        if let Err(e) = client.initialize(&CancellationToken::new()).await {
            client.close().await;
            return Err(e);
        }
        Ok(client)
    }

    /// Build a client over an already-connected transport. No handshake is performed.
    pub fn from_transport<R, W>(name: &str, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let pending: PendingMap = Arc::default();
        let closed = Arc::new(AtomicBool::new(false));
        let reader = spawn_reader(
            name.to_string(),
            reader,
            Arc::clone(&pending),
            Arc::clone(&closed),
        );

        Self {
            name: name.to_string(),
            writer: Mutex::new(Some(Box::new(writer))),
            pending,
            closed,
            next_id: AtomicU64::new(1),
            reader: Mutex::new(Some(reader)),
            child: Mutex::new(None),
        }
    }

    /// Run the `initialize` exchange and announce readiness
    pub async fn initialize(&self, cancel: &CancellationToken) -> AgentResult<Value> {
        let params = serde_json::to_value(InitializeParams::default())?;
        let result = with_deadline(
            cancel,
            Some(INIT_TIMEOUT),
            "provider initialization",
            self.request("initialize", Some(params), cancel),
        )
        .await?;
        self.send(&JsonRpcNotification::new("notifications/initialized"))
            .await?;

        let server = result.get("serverInfo").cloned().unwrap_or(Value::Null);
        debug!(provider = %self.name, server = %server, "Provider initialized");
        Ok(result)
    }

    async fn send<T: Serialize>(&self, message: &T) -> AgentResult<()> {
        let mut line = serde_json::to_string(message)
            .map_err(|e| AgentError::Internal(format!("failed to encode request: {}", e)))?;
        line.push('\n');

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or_else(|| self.disconnected())?;
        let written = async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        }
        .await;
        written.map_err(|e| {
            warn!(provider = %self.name, error = %e, "Failed to write to provider");
            AgentError::Connectivity(format!("failed to write to provider {}: {}", self.name, e))
        })
    }

    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        cancel: &CancellationToken,
    ) -> AgentResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);
        // Clears the entry however this future ends, including being dropped by an outer timeout
        let _entry = PendingEntry {
            id,
            pending: Arc::clone(&self.pending),
        };

        if self.closed.load(Ordering::SeqCst) {
            return Err(self.disconnected());
        }
        self.send(&JsonRpcRequest::new(id, method, params)).await?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AgentError::Cancelled),
            response = rx => response.unwrap_or_else(|_| Err(self.disconnected())),
        }
    }

    fn disconnected(&self) -> AgentError {
        AgentError::Connectivity(format!("provider {} is not connected", self.name))
    }
}

/// Removes one request id from the pending table when dropped
struct PendingEntry {
    id: u64,
    pending: PendingMap,
}

impl Drop for PendingEntry {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.try_lock() {
            pending.remove(&self.id);
            return;
        }
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let pending = Arc::clone(&self.pending);
            let id = self.id;
            runtime.spawn(async move {
                pending.lock().await.remove(&id);
            });
        }
    }
}

fn spawn_reader<R>(
    name: String,
    reader: R,
    pending: PendingMap,
    closed: Arc<AtomicBool>,
) -> JoinHandle<()>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!(provider = %name, error = %e, "Failed to read from provider");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<JsonRpcResponse>(&line) {
                Ok(response) => response,
                Err(e) => {
                    warn!(provider = %name, error = %e, line = %line, "Ignoring undecodable provider output");
                    continue;
                }
            };
            let Some(id) = response.id.as_ref().and_then(Value::as_u64) else {
                debug!(provider = %name, "Ignoring provider message without a request id");
                continue;
            };

            let outcome = match response.error {
                Some(err) => Err(AgentError::Protocol(format!(
                    "{} (code: {})",
                    err.message, err.code
                ))),
                None => Ok(response.result.unwrap_or(Value::Null)),
            };
            match pending.lock().await.remove(&id) {
                Some(tx) => {
                    let _ = tx.send(outcome);
                }
                None => warn!(provider = %name, id, "Received response for unknown request"),
            }
        }

        closed.store(true, Ordering::SeqCst);
        let mut pending = pending.lock().await;
        for (_, tx) in pending.drain() {
            let _ = tx.send(Err(AgentError::Connectivity(format!(
                "provider {} closed the connection",
                name
            ))));
        }
        debug!(provider = %name, "Provider reader exited");
    })
}

#[async_trait]
impl ProviderClient for StdioProviderClient {
    async fn list_tools(&self, cancel: &CancellationToken) -> AgentResult<Vec<Tool>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = serde_json::to_value(ListToolsParams { cursor })?;
            let result = self.request("tools/list", Some(params), cancel).await?;
            let page: ListToolsResult = serde_json::from_value(result).map_err(|e| {
                AgentError::Protocol(format!("invalid tools/list result: {}", e))
            })?;

            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        debug!(provider = %self.name, count = tools.len(), "Listed tools");
        Ok(tools)
    }

    async fn call(
        &self,
        name: &str,
        arguments: Value,
        cancel: &CancellationToken,
    ) -> AgentResult<ToolResult> {
        debug!(provider = %self.name, tool = %name, "Calling tool");
        let params = serde_json::to_value(CallToolParams { name, arguments })?;
        let result = self.request("tools/call", Some(params), cancel).await?;
        let result: CallToolResult = serde_json::from_value(result)
            .map_err(|e| AgentError::Protocol(format!("invalid tools/call result: {}", e)))?;
        Ok(result.into())
    }

    async fn close(&self) {
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        if let Some(reader) = self.reader.lock().await.take() {
            reader.abort();
        }
        if let Some(mut child) = self.child.lock().await.take() {
            info!(provider = %self.name, "Stopping provider");
            let _ = child.kill().await;
        }

        self.closed.store(true, Ordering::SeqCst);
        for (_, tx) in self.pending.lock().await.drain() {
            let _ = tx.send(Err(self.disconnected()));
        }
    }
}
