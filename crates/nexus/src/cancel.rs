use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::errors::{AgentError, AgentResult};

/// Race a fallible operation against a cancellation token and an optional time bound.
///
/// Cancellation wins over completion when both are ready, so a cancelled task never
/// observes a late result. Expiry of the bound is reported as a connectivity failure.
pub async fn with_deadline<T, F>(
    cancel: &CancellationToken,
    limit: Option<Duration>,
    what: &str,
    operation: F,
) -> AgentResult<T>
where
    F: Future<Output = AgentResult<T>>,
{
    let bounded = async {
        match limit {
            Some(limit) => tokio::time::timeout(limit, operation)
                .await
                .map_err(|_| {
                    AgentError::Connectivity(format!(
                        "{} timed out after {:.1}s",
                        what,
                        limit.as_secs_f64()
                    ))
                })?,
            None => operation.await,
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AgentError::Cancelled),
        result = bounded => result,
    }
}
