use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::base::ProviderClient;
use crate::errors::{AgentError, AgentResult};

lazy_static! {
    static ref ALIAS_PATTERN: Regex = Regex::new(r"^[A-Za-z0-9_-]+$").unwrap();
}

/// Check that an alias can prefix tool names without ambiguity
pub fn validate_alias(alias: &str) -> AgentResult<()> {
    if ALIAS_PATTERN.is_match(alias) {
        Ok(())
    } else {
        Err(AgentError::InvalidAlias(alias.to_string()))
    }
}

/// The live provider connections, keyed by alias.
///
/// Entries are only added by explicit registration and only removed by `close_all`.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<BTreeMap<String, Arc<dyn ProviderClient>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, alias: &str, client: Arc<dyn ProviderClient>) -> AgentResult<()> {
        validate_alias(alias)?;
        let mut providers = self.providers.write().await;
        if providers.contains_key(alias) {
            return Err(AgentError::DuplicateAlias(alias.to_string()));
        }
        providers.insert(alias.to_string(), client);
        Ok(())
    }

    pub async fn contains(&self, alias: &str) -> bool {
        self.providers.read().await.contains_key(alias)
    }

    pub async fn get(&self, alias: &str) -> Option<Arc<dyn ProviderClient>> {
        self.providers.read().await.get(alias).cloned()
    }

    pub async fn aliases(&self) -> Vec<String> {
        self.providers.read().await.keys().cloned().collect()
    }

    /// A point-in-time copy in alias order, so callers never hold the lock across provider I/O
    pub async fn snapshot(&self) -> Vec<(String, Arc<dyn ProviderClient>)> {
        self.providers
            .read()
            .await
            .iter()
            .map(|(alias, client)| (alias.clone(), Arc::clone(client)))
            .collect()
    }

    pub async fn close_all(&self) {
        let providers = std::mem::take(&mut *self.providers.write().await);
        for client in providers.into_values() {
            client.close().await;
        }
    }
}
